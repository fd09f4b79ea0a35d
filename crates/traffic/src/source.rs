use core::fmt;
use std::{
    error::Error,
    io,
    num::{ParseFloatError, ParseIntError},
};

use futures::stream::{self, BoxStream, StreamExt};
use model::{
    location::{Point, RoutePoint},
    VehicleId,
};
use tokio::{sync::mpsc, task};
use utility::serde::date_time;

/// Records a file reader may parse before the source consumes them.
const READ_AHEAD: usize = 64;

/// An unparsed row of a route file: `vehicle_id,latitude,longitude,timestamp`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRecord {
    pub vehicle_id: String,
    pub latitude: String,
    pub longitude: String,
    pub timestamp: String,
}

/// Why a single record was rejected. Never fatal.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordError {
    FieldCount(usize),
    Unreadable(String),
    VehicleId(ParseIntError),
    Latitude(ParseFloatError),
    Longitude(ParseFloatError),
    Timestamp(chrono::ParseError),
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::FieldCount(count) => write!(f, "expected 4 fields, found {}", count),
            Self::Unreadable(why) => write!(f, "unreadable record: {}", why),
            Self::VehicleId(why) => write!(f, "invalid vehicle id: {}", why),
            Self::Latitude(why) => write!(f, "invalid latitude: {}", why),
            Self::Longitude(why) => write!(f, "invalid longitude: {}", why),
            Self::Timestamp(why) => write!(f, "invalid timestamp: {}", why),
        }
    }
}

impl Error for RecordError {}

#[derive(Debug)]
pub enum SourceError {
    /// The record is skipped, reading goes on.
    Record(RecordError),
    /// The source can not be read any further.
    Io(io::Error),
}

impl From<RecordError> for SourceError {
    fn from(why: RecordError) -> Self {
        Self::Record(why)
    }
}

impl From<csv::Error> for SourceError {
    fn from(why: csv::Error) -> Self {
        if !why.is_io_error() {
            return Self::Record(RecordError::Unreadable(why.to_string()));
        }
        match why.into_kind() {
            csv::ErrorKind::Io(why) => Self::Io(why),
            other => Self::Io(io::Error::new(io::ErrorKind::Other, format!("{:?}", other))),
        }
    }
}

impl RouteRecord {
    pub fn new<S: Into<String>>(vehicle_id: S, latitude: S, longitude: S, timestamp: S) -> Self {
        Self {
            vehicle_id: vehicle_id.into(),
            latitude: latitude.into(),
            longitude: longitude.into(),
            timestamp: timestamp.into(),
        }
    }

    /// Validates every field, reporting the first one that does not parse.
    pub fn parse(&self) -> Result<(VehicleId, RoutePoint), RecordError> {
        let vehicle_id = self
            .vehicle_id
            .trim()
            .parse::<VehicleId>()
            .map_err(RecordError::VehicleId)?;
        let latitude = self
            .latitude
            .trim()
            .parse::<f64>()
            .map_err(RecordError::Latitude)?;
        let longitude = self
            .longitude
            .trim()
            .parse::<f64>()
            .map_err(RecordError::Longitude)?;
        let time = date_time::parse(self.timestamp.trim()).map_err(RecordError::Timestamp)?;
        Ok((vehicle_id, RoutePoint::new(time, Point::new(latitude, longitude))))
    }
}

impl TryFrom<csv::StringRecord> for RouteRecord {
    type Error = RecordError;

    fn try_from(record: csv::StringRecord) -> Result<Self, Self::Error> {
        match record.iter().collect::<Vec<_>>().as_slice() {
            [vehicle_id, latitude, longitude, timestamp] => {
                Ok(Self::new(*vehicle_id, *latitude, *longitude, *timestamp))
            }
            fields => Err(RecordError::FieldCount(fields.len())),
        }
    }
}

/// A named, finite, lazily read sequence of route records.
pub struct RouteSource {
    name: String,
    records: BoxStream<'static, Result<RouteRecord, SourceError>>,
}

impl RouteSource {
    pub fn new<S: Into<String>>(
        name: S,
        records: BoxStream<'static, Result<RouteRecord, SourceError>>,
    ) -> Self {
        Self {
            name: name.into(),
            records,
        }
    }

    pub fn from_records<S, I>(name: S, records: I) -> Self
    where
        S: Into<String>,
        I: IntoIterator<Item = RouteRecord>,
        I::IntoIter: Send + 'static,
    {
        Self::new(name, stream::iter(records.into_iter().map(Ok)).boxed())
    }

    /// Headerless CSV, one record per line. Lines with the wrong number of
    /// fields come out as `SourceError::Record`. The reader runs on the
    /// blocking pool once the stream is first polled, at most
    /// `READ_AHEAD` records ahead of the consumer.
    pub fn from_csv<S, R>(name: S, reader: R) -> Self
    where
        S: Into<String>,
        R: io::Read + Send + 'static,
    {
        let records = stream::once(async move {
            let (tx, rx) = mpsc::channel(READ_AHEAD);
            task::spawn_blocking(move || read_csv(reader, tx));
            stream::unfold(rx, |mut rx| async move {
                rx.recv().await.map(|record| (record, rx))
            })
        })
        .flatten();
        Self::new(name, records.boxed())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub async fn next(&mut self) -> Option<Result<RouteRecord, SourceError>> {
        self.records.next().await
    }
}

/// Stops early once the receiving source is dropped.
fn read_csv<R: io::Read>(reader: R, tx: mpsc::Sender<Result<RouteRecord, SourceError>>) {
    let rows = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(reader)
        .into_records();
    for row in rows {
        let record = row
            .map_err(SourceError::from)
            .and_then(|row| Ok(RouteRecord::try_from(row)?));
        if tx.blocking_send(record).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod test {
    use chrono::Timelike;

    use super::*;

    async fn collect(mut source: RouteSource) -> Vec<Result<RouteRecord, SourceError>> {
        let mut items = vec![];
        while let Some(item) = source.next().await {
            items.push(item);
        }
        items
    }

    #[test]
    fn parses_valid_record() {
        let (vehicle_id, point) =
            RouteRecord::new("5937", "51.476105", "-0.100224", "2011-03-22 07:55:26")
                .parse()
                .unwrap();
        assert_eq!(vehicle_id, 5937);
        assert_eq!(point.point, Point::new(51.476105, -0.100224));
        assert_eq!((point.time.hour(), point.time.minute()), (7, 55));
    }

    #[test]
    fn reports_the_offending_field() {
        let record = |id, lat, lon, ts| RouteRecord::new(id, lat, lon, ts).parse();
        assert!(matches!(
            record("robot", "51.4", "-0.1", "2011-03-22 07:55:26"),
            Err(RecordError::VehicleId(_))
        ));
        assert!(matches!(
            record("5937", "north", "-0.1", "2011-03-22 07:55:26"),
            Err(RecordError::Latitude(_))
        ));
        assert!(matches!(
            record("5937", "51.4", "", "2011-03-22 07:55:26"),
            Err(RecordError::Longitude(_))
        ));
        assert!(matches!(
            record("5937", "51.4", "-0.1", "22.03.2011 07:55"),
            Err(RecordError::Timestamp(_))
        ));
    }

    #[tokio::test]
    async fn csv_source_yields_records_in_order() {
        let data = "\
\"5937\",\"51.476105\",\"-0.100224\",\"2011-03-22 07:55:26\"
5937,51.475967,-0.100368,2011-03-22 07:55:40
";
        let items = collect(RouteSource::from_csv("5937.csv", data.as_bytes())).await;
        let records = items.into_iter().map(Result::unwrap).collect::<Vec<_>>();
        assert_eq!(
            records,
            vec![
                RouteRecord::new("5937", "51.476105", "-0.100224", "2011-03-22 07:55:26"),
                RouteRecord::new("5937", "51.475967", "-0.100368", "2011-03-22 07:55:40"),
            ]
        );
    }

    #[tokio::test]
    async fn csv_source_flags_wrong_field_counts() {
        let data = "5937,51.4,-0.1\n5937,51.4,-0.1,2011-03-22 07:55:40\n";
        let items = collect(RouteSource::from_csv("5937.csv", data.as_bytes())).await;
        assert_eq!(items.len(), 2);
        assert!(matches!(
            items[0],
            Err(SourceError::Record(RecordError::FieldCount(3)))
        ));
        assert!(items[1].is_ok());
    }

    #[tokio::test]
    async fn failing_reader_is_an_io_error() {
        struct Broken;

        impl io::Read for Broken {
            fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::Other, "disk on fire"))
            }
        }

        let mut source = RouteSource::from_csv("broken.csv", Broken);
        assert_eq!(source.name(), "broken.csv");
        assert!(matches!(source.next().await, Some(Err(SourceError::Io(_)))));
    }

    #[tokio::test]
    async fn csv_reading_does_not_block_the_runtime() {
        struct Gated {
            gate: std::sync::mpsc::Receiver<()>,
            data: &'static [u8],
        }

        impl io::Read for Gated {
            fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
                let _ = self.gate.recv();
                self.data.read(buf)
            }
        }

        let (open, gate) = std::sync::mpsc::channel();
        let reader = Gated {
            gate,
            data: b"5937,51.4,-0.1,2011-03-22 07:55:40\n",
        };
        let mut source = RouteSource::from_csv("5937.csv", reader);
        let next = tokio::spawn(async move { source.next().await });

        // the single runtime thread is still free while the reader waits
        tokio::task::yield_now().await;
        open.send(()).unwrap();
        drop(open);

        let record = next.await.unwrap().unwrap().unwrap();
        assert_eq!(record.vehicle_id, "5937");
    }
}
