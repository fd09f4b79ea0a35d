use core::fmt;

use chrono::NaiveDateTime;
use serde::{Serialize, Serializer};

use crate::VehicleId;

/// Traffic around a station, derived from a vehicle's speed and the distance
/// it covered since its previous point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TrafficCondition {
    Heavy,
    Moderate,
    Light,
}

impl TrafficCondition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Heavy => "HEAVY",
            Self::Moderate => "MODERATE",
            Self::Light => "LIGHT",
        }
    }
}

impl fmt::Display for TrafficCondition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One proximity event. Serializes to the report row layout
/// `vehicle_id,timestamp,speed,condition`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrafficReport {
    pub vehicle_id: VehicleId,
    #[serde(serialize_with = "utility::serde::date_time::serialize")]
    pub time: NaiveDateTime,
    #[serde(serialize_with = "two_decimals")]
    pub speed: f64,
    pub condition: TrafficCondition,
}

impl TrafficReport {
    pub fn new(
        vehicle_id: VehicleId,
        time: NaiveDateTime,
        speed: f64,
        condition: TrafficCondition,
    ) -> Self {
        Self {
            vehicle_id,
            time,
            speed,
            condition,
        }
    }
}

fn two_decimals<S>(value: &f64, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&format!("{:.2}", value))
}
