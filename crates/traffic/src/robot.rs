use std::sync::Arc;

use actors::{
    actor::{Actor, ActorError, StopReason, SupervisionStrategy},
    actor_ref::{ActorRef, Termination},
};
use async_trait::async_trait;
use model::{location::RoutePoint, report::TrafficReport, VehicleId};

use crate::{
    condition,
    observer::{Event, Observer},
    reporter::Reporter,
    stations::{StationIndex, PROXIMITY_KM},
};

/// Route points a robot buffers before the dispatcher has to wait.
pub const MAILBOX_CAPACITY: usize = 10;

/// Where a robot is and where it was before. Starts out empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VehicleState {
    pub current: Option<RoutePoint>,
    pub last: Option<RoutePoint>,
}

/// Moves one vehicle from point to point and reports the traffic whenever it
/// passes a station.
pub struct Robot {
    id: VehicleId,
    state: VehicleState,
    stations: Arc<StationIndex>,
    reporter: ActorRef<Reporter>,
    observer: Arc<dyn Observer>,
}

/// What the dispatcher keeps of a running robot.
pub struct RobotHandle {
    pub id: VehicleId,
    pub actor: ActorRef<Robot>,
    pub termination: Termination,
}

impl Robot {
    pub fn new(
        id: VehicleId,
        stations: Arc<StationIndex>,
        reporter: ActorRef<Reporter>,
        observer: Arc<dyn Observer>,
    ) -> Self {
        Self {
            id,
            state: VehicleState::default(),
            stations,
            reporter,
            observer,
        }
    }

    pub fn spawn(self) -> RobotHandle {
        let id = self.id;
        let (actor, termination) = actors::run(self, MAILBOX_CAPACITY);
        RobotHandle {
            id,
            actor,
            termination,
        }
    }

    pub fn state(&self) -> &VehicleState {
        &self.state
    }

    /// Moves to `next` and returns the traffic report for it, if any. A point
    /// equal to the last one is ignored entirely.
    pub fn advance(&mut self, next: RoutePoint) -> Option<TrafficReport> {
        if let Some(last) = &self.state.last {
            if last.point == next.point {
                self.observer.notify(Event::Stationary {
                    vehicle_id: self.id,
                    point: next.point,
                });
                return None;
            }
        }

        let current = self.state.current.insert(next).clone();
        let report = self.traffic_report(&current);
        self.state.last = Some(current);
        report
    }

    fn traffic_report(&self, current: &RoutePoint) -> Option<TrafficReport> {
        let nearby = self.stations.nearby(&current.point, PROXIMITY_KM);
        if nearby.is_empty() {
            return None;
        }
        for (station, distance_km) in nearby {
            self.observer.notify(Event::StationNearby {
                vehicle_id: self.id,
                station: station.to_string(),
                distance_km,
            });
        }

        let (speed, distance) = match &self.state.last {
            Some(last) => {
                let distance = condition::distance(&last.point, &current.point);
                let elapsed = (current.unix() - last.unix()) as f64;
                (condition::speed(distance, elapsed), distance)
            }
            None => (0.0, 0.0),
        };

        Some(TrafficReport::new(
            self.id,
            current.time,
            speed,
            condition::classify(speed, distance),
        ))
    }
}

#[async_trait]
impl Actor for Robot {
    type Message = RoutePoint;
    type Error = ActorError;

    async fn handle(&mut self, point: RoutePoint) -> Result<(), ActorError> {
        if let Some(report) = self.advance(point) {
            self.reporter.tell(report.clone()).await?;
            self.observer.notify(Event::ReportEmitted(report));
        }
        Ok(())
    }

    async fn stopped(&mut self, reason: StopReason) {
        log::debug!("Robot {}: stopped ({:?})", self.id, reason);
    }

    fn on_error(&mut self, error: ActorError) -> SupervisionStrategy {
        log::error!("Robot {}: reporter unavailable: {}", self.id, error);
        SupervisionStrategy::Stop
    }
}
