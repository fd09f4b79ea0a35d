use core::fmt;
use std::{error::Error, io};

use indexmap::IndexMap;
use model::{location::Point, station::Station};

/// A vehicle closer than this to a station (in km) is near it.
pub const PROXIMITY_KM: f64 = 0.35;

/// Station name to coordinate, in load order. Never changes once built, so
/// workers share it behind an `Arc`.
#[derive(Debug, Clone, Default)]
pub struct StationIndex {
    stations: IndexMap<String, Point>,
}

#[derive(Debug)]
pub enum StationError {
    Io(csv::Error),
}

impl fmt::Display for StationError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Io(why) => write!(f, "unable to read stations: {}", why),
        }
    }
}

impl Error for StationError {}

impl StationIndex {
    pub fn new<I: IntoIterator<Item = Station>>(stations: I) -> Self {
        stations.into_iter().collect()
    }

    /// Reads headerless `name,latitude,longitude` rows. Malformed rows are
    /// skipped; only a failing reader is an error.
    pub fn from_csv<R: io::Read>(reader: R) -> Result<Self, StationError> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut index = Self::default();
        let mut skipped = 0;
        for row in reader.records() {
            let row = match row {
                Ok(row) => row,
                Err(why) if why.is_io_error() => return Err(StationError::Io(why)),
                Err(why) => {
                    log::warn!("skipping station row: {}", why);
                    skipped += 1;
                    continue;
                }
            };
            if row.len() != 3 {
                log::warn!("skipping station row with {} fields: {:?}", row.len(), row);
                skipped += 1;
                continue;
            }
            match row.deserialize::<Station>(None) {
                Ok(station) => {
                    log::info!(
                        "loaded station: {} ({}, {})",
                        station.name,
                        station.latitude,
                        station.longitude
                    );
                    index.insert(station);
                }
                Err(why) => {
                    log::warn!("skipping station row: {}", why);
                    skipped += 1;
                }
            }
        }
        if skipped > 0 {
            log::warn!("{} station rows skipped", skipped);
        }
        Ok(index)
    }

    fn insert(&mut self, station: Station) {
        let point = station.point();
        self.stations.insert(station.name, point);
    }

    pub fn get(&self, name: &str) -> Option<&Point> {
        self.stations.get(name)
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    /// Every station strictly closer than `radius_km` to `point`, with its
    /// distance in km.
    pub fn nearby(&self, point: &Point, radius_km: f64) -> IndexMap<&str, f64> {
        self.stations
            .iter()
            .map(|(name, station)| (name.as_str(), point.distance_to(station)))
            .filter(|(_, distance)| *distance < radius_km)
            .collect()
    }
}

impl FromIterator<Station> for StationIndex {
    fn from_iter<I: IntoIterator<Item = Station>>(iter: I) -> Self {
        let mut index = Self::default();
        for station in iter {
            index.insert(station);
        }
        index
    }
}
