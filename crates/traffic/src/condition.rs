//! Speed and traffic classification for a vehicle passing a station.

use model::{location::Point, report::TrafficCondition};

pub fn distance(from: &Point, to: &Point) -> f64 {
    from.distance_to(to)
}

/// Speed in km/h for `distance_km` covered in `elapsed_seconds`. Zero when
/// either input is exactly zero.
pub fn speed(distance_km: f64, elapsed_seconds: f64) -> f64 {
    if distance_km == 0.0 || elapsed_seconds == 0.0 {
        return 0.0;
    }
    distance_km / (elapsed_seconds / 3600.0)
}

/// Rules are checked in order, the first match wins.
pub fn classify(speed_kmh: f64, distance_km: f64) -> TrafficCondition {
    if (distance_km < 2.0 && speed_kmh < 24.14) || (distance_km > 4.0 && speed_kmh < 40.23) {
        TrafficCondition::Heavy
    } else if distance_km < 1.0 && speed_kmh < 32.19 {
        TrafficCondition::Moderate
    } else {
        TrafficCondition::Light
    }
}
