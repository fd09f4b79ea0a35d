use core::fmt;
use std::{error::Error, sync::Arc};

use actors::actor::{ActorError, StopReason};
use model::VehicleId;

use crate::{
    dispatcher::{DispatchError, DispatchSummary, Dispatcher},
    observer::{LogObserver, Observer},
    reporter::{ReportSink, Reporter},
    robot::Robot,
    source::RouteSource,
    stations::StationIndex,
};

#[derive(Debug)]
pub enum SimulationError {
    Dispatch(DispatchError),
    Reporter(StopReason),
    Actor(ActorError),
}

impl fmt::Display for SimulationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Dispatch(why) => write!(f, "dispatcher failed: {}", why),
            Self::Reporter(reason) => write!(f, "reporter stopped early ({:?})", reason),
            Self::Actor(why) => write!(f, "{}", why),
        }
    }
}

impl Error for SimulationError {}

impl From<DispatchError> for SimulationError {
    fn from(why: DispatchError) -> Self {
        Self::Dispatch(why)
    }
}

impl From<ActorError> for SimulationError {
    fn from(why: ActorError) -> Self {
        Self::Actor(why)
    }
}

/// One run of the fleet: a robot per vehicle, a reporter, and a dispatcher
/// feeding the robots from the route sources.
pub struct Simulation {
    vehicles: Vec<VehicleId>,
    stations: Arc<StationIndex>,
    sources: Vec<RouteSource>,
    sink: Box<dyn ReportSink>,
    observer: Arc<dyn Observer>,
}

impl Simulation {
    pub fn new<S: ReportSink>(
        vehicles: Vec<VehicleId>,
        stations: StationIndex,
        sources: Vec<RouteSource>,
        sink: S,
    ) -> Self {
        Self {
            vehicles,
            stations: Arc::new(stations),
            sources,
            sink: Box::new(sink),
            observer: Arc::new(LogObserver),
        }
    }

    pub fn with_observer(mut self, observer: Arc<dyn Observer>) -> Self {
        self.observer = observer;
        self
    }

    /// Runs until every robot is shut down and every report is written.
    pub async fn run(self) -> Result<DispatchSummary, SimulationError> {
        let (reporter, reporter_termination) = Reporter::boxed(self.sink).spawn();
        let robots = self
            .vehicles
            .into_iter()
            .map(|id| {
                Robot::new(
                    id,
                    Arc::clone(&self.stations),
                    reporter.clone(),
                    Arc::clone(&self.observer),
                )
                .spawn()
            })
            .collect::<Vec<_>>();
        // the robots hold the only references left
        reporter.close();

        let terminate = Dispatcher::new(robots, self.sources, self.observer).start();

        let terminate = terminate.wait();
        let reporter_done = reporter_termination.acknowledged();
        tokio::pin!(terminate, reporter_done);

        let (summary, reporter) = tokio::select! {
            biased;
            summary = &mut terminate => (summary?, reporter_done.await?),
            reporter = &mut reporter_done => {
                // a reporter that failed early is fatal, otherwise it just
                // finished before the terminate event came in
                let reporter = reporter?;
                if reporter != StopReason::Closed {
                    return Err(SimulationError::Reporter(reporter));
                }
                (terminate.await?, reporter)
            }
        };
        if reporter != StopReason::Closed {
            return Err(SimulationError::Reporter(reporter));
        }
        Ok(summary)
    }
}
