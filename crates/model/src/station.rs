use serde::Deserialize;

use crate::location::Point;

/// A named reference location. Rows in a station file are laid out as
/// `name,latitude,longitude`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Station {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Station {
    pub fn new<S: Into<String>>(name: S, latitude: f64, longitude: f64) -> Self {
        Self {
            name: name.into(),
            latitude,
            longitude,
        }
    }

    pub fn point(&self) -> Point {
        Point::new(self.latitude, self.longitude)
    }
}
