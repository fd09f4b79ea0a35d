use core::fmt;
use std::{env, error::Error, num::ParseIntError, path::PathBuf};

use model::VehicleId;

pub struct SimulatorConfig {
    pub robot_ids: Vec<VehicleId>,
    pub stations_path: PathBuf,
    pub routes_dir: PathBuf,
    pub report_path: PathBuf,
}

#[derive(Debug)]
pub enum ConfigError {
    RobotIds { value: String, why: ParseIntError },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::RobotIds { value, why } => {
                write!(f, "SIMULATOR_ROBOT_IDS={:?} is not a list of ids: {}", value, why)
            }
        }
    }
}

impl Error for ConfigError {}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            robot_ids: vec![5937, 6043],
            stations_path: PathBuf::from("data/tube.csv"),
            routes_dir: PathBuf::from("data"),
            report_path: PathBuf::from("traffic-report.csv"),
        }
    }
}

impl SimulatorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(value) = env::var("SIMULATOR_ROBOT_IDS") {
            config.robot_ids = parse_robot_ids(&value)
                .map_err(|why| ConfigError::RobotIds { value, why })?;
        }
        if let Ok(value) = env::var("SIMULATOR_STATIONS") {
            config.stations_path = value.into();
        }
        if let Ok(value) = env::var("SIMULATOR_ROUTES_DIR") {
            config.routes_dir = value.into();
        }
        if let Ok(value) = env::var("SIMULATOR_REPORT") {
            config.report_path = value.into();
        }
        Ok(config)
    }

    /// Route file of a single robot, `<routes_dir>/<id>.csv`.
    pub fn route_path(&self, id: VehicleId) -> PathBuf {
        self.routes_dir.join(format!("{}.csv", id))
    }
}

fn parse_robot_ids(value: &str) -> Result<Vec<VehicleId>, ParseIntError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::parse)
        .collect()
}
