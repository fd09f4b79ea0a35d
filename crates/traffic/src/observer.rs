use core::fmt;

use actors::actor::StopReason;
use chrono::NaiveDateTime;
use model::{location::Point, report::TrafficReport, VehicleId};

use crate::source::RecordError;

#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    Malformed(RecordError),
    UnknownVehicle(VehicleId),
    /// The vehicle's worker was already stopped, e.g. after its cutoff.
    WorkerStopped(VehicleId),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Malformed(why) => write!(f, "{}", why),
            Self::UnknownVehicle(id) => write!(f, "robot {} not found", id),
            Self::WorkerStopped(id) => write!(f, "robot {} is not running", id),
        }
    }
}

/// Something worth knowing happened in the pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    RecordSkipped {
        source: String,
        reason: SkipReason,
    },
    PointDelivered {
        vehicle_id: VehicleId,
        point: Point,
        time: NaiveDateTime,
    },
    CutoffReached {
        vehicle_id: VehicleId,
        time: NaiveDateTime,
    },
    SourceFinished {
        source: String,
    },
    Stationary {
        vehicle_id: VehicleId,
        point: Point,
    },
    StationNearby {
        vehicle_id: VehicleId,
        station: String,
        distance_km: f64,
    },
    ReportEmitted(TrafficReport),
    ShutdownStarted {
        vehicle_id: VehicleId,
    },
    ShutdownAcknowledged {
        vehicle_id: VehicleId,
        reason: StopReason,
    },
    Terminated,
}

/// Hook for diagnostics. Called from many tasks at once.
pub trait Observer: Send + Sync + 'static {
    fn notify(&self, event: Event);
}

/// Writes every event to the `log` facade.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogObserver;

impl Observer for LogObserver {
    fn notify(&self, event: Event) {
        match event {
            Event::RecordSkipped { source, reason } => {
                log::warn!("Dispatcher: skipping line in {}: {}", source, reason)
            }
            Event::PointDelivered {
                vehicle_id,
                point,
                time,
            } => log::debug!(
                "Dispatcher: sent robot {} to {}/{} @ {}",
                vehicle_id,
                point.latitude,
                point.longitude,
                time
            ),
            Event::CutoffReached { vehicle_id, time } => {
                log::info!("Dispatcher: robot {} reached {}, terminating", vehicle_id, time)
            }
            Event::SourceFinished { source } => {
                log::info!("Dispatcher: end of source {}", source)
            }
            Event::Stationary { vehicle_id, point } => log::debug!(
                "Robot {}: still at {}/{}, not moving",
                vehicle_id,
                point.latitude,
                point.longitude
            ),
            Event::StationNearby {
                vehicle_id,
                station,
                distance_km,
            } => log::debug!(
                "Robot {}: {} is {:.3}km away",
                vehicle_id,
                station,
                distance_km
            ),
            Event::ReportEmitted(report) => log::info!(
                "Robot {}: {} traffic at {}, {:.2}km/h",
                report.vehicle_id,
                report.condition,
                report.time,
                report.speed
            ),
            Event::ShutdownStarted { vehicle_id } => {
                log::info!("Dispatcher: shutting down robot {}", vehicle_id)
            }
            Event::ShutdownAcknowledged { vehicle_id, reason } => {
                log::info!("Dispatcher: robot {} stopped ({:?})", vehicle_id, reason)
            }
            Event::Terminated => log::info!("Dispatcher: terminated"),
        }
    }
}
