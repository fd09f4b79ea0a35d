use chrono::NaiveDateTime;
use utility::geo;

/// A coordinate in degrees. Two points are equal only if both fields are
/// bit-for-bit equal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub latitude: f64,
    pub longitude: f64,
}

impl Point {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Great-circle distance to `other` in kilometres.
    pub fn distance_to(&self, other: &Point) -> f64 {
        geo::haversine_distance(
            self.latitude,
            self.longitude,
            other.latitude,
            other.longitude,
        )
    }
}

/// A vehicle was at `point` at `time`.
#[derive(Debug, Clone, PartialEq)]
pub struct RoutePoint {
    pub time: NaiveDateTime,
    pub point: Point,
}

impl RoutePoint {
    pub fn new(time: NaiveDateTime, point: Point) -> Self {
        Self { time, point }
    }

    /// Seconds since the unix epoch, reading the timestamp as UTC.
    pub fn unix(&self) -> i64 {
        self.time.and_utc().timestamp()
    }
}
