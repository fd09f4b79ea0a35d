use std::{error::Error, fs::File};

use config::SimulatorConfig;
use traffic::{
    reporter::CsvReportSink, simulation::Simulation, source::RouteSource,
    stations::StationIndex,
};

mod config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let config = SimulatorConfig::from_env()?;

    let stations = StationIndex::from_csv(File::open(&config.stations_path).map_err(|why| {
        format!("unable to open {}: {}", config.stations_path.display(), why)
    })?)?;
    log::info!("{} stations loaded", stations.len());

    // a robot without a route file does not take part
    let mut robots = Vec::with_capacity(config.robot_ids.len());
    let mut sources = Vec::with_capacity(config.robot_ids.len());
    for id in &config.robot_ids {
        let path = config.route_path(*id);
        match File::open(&path) {
            Ok(file) => {
                sources.push(RouteSource::from_csv(path.display().to_string(), file));
                robots.push(*id);
            }
            Err(why) => log::warn!("no route file for robot {} ({}): {}", id, path.display(), why),
        }
    }

    let sink = CsvReportSink::create(&config.report_path).map_err(|why| {
        format!("unable to create {}: {}", config.report_path.display(), why)
    })?;

    let summary = Simulation::new(robots, stations, sources, sink).run().await?;

    println!("dispatch summary: {}", serde_json::to_string_pretty(&summary)?);
    println!("traffic report written to {}", config.report_path.display());
    Ok(())
}
