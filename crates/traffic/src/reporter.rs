use core::fmt;
use std::{error::Error, fs::File, io, path::Path};

use actors::{
    actor::{Actor, StopReason},
    actor_ref::{ActorRef, Termination},
};
use async_trait::async_trait;
use model::report::TrafficReport;

pub const MAILBOX_CAPACITY: usize = 32;

#[derive(Debug)]
pub enum ReportError {
    Io(io::Error),
    Csv(csv::Error),
}

impl fmt::Display for ReportError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Io(why) => write!(f, "unable to write traffic report: {}", why),
            Self::Csv(why) => write!(f, "unable to write traffic report: {}", why),
        }
    }
}

impl Error for ReportError {}

impl From<io::Error> for ReportError {
    fn from(why: io::Error) -> Self {
        Self::Io(why)
    }
}

impl From<csv::Error> for ReportError {
    fn from(why: csv::Error) -> Self {
        Self::Csv(why)
    }
}

/// Destination for traffic reports.
pub trait ReportSink: Send + 'static {
    fn write(&mut self, report: &TrafficReport) -> Result<(), ReportError>;

    fn flush(&mut self) -> Result<(), ReportError>;
}

/// Headerless CSV rows `vehicle_id,timestamp,speed,condition`.
pub struct CsvReportSink<W: io::Write> {
    writer: csv::Writer<W>,
}

impl CsvReportSink<File> {
    /// Creates the file, truncating an existing one.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, ReportError> {
        Ok(Self::new(File::create(path)?))
    }
}

impl<W: io::Write> CsvReportSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(writer),
        }
    }

    pub fn into_inner(self) -> Result<W, ReportError> {
        self.writer
            .into_inner()
            .map_err(|why| ReportError::Io(why.into_error()))
    }
}

impl<W: io::Write + Send + 'static> ReportSink for CsvReportSink<W> {
    fn write(&mut self, report: &TrafficReport) -> Result<(), ReportError> {
        Ok(self.writer.serialize(report)?)
    }

    fn flush(&mut self) -> Result<(), ReportError> {
        Ok(self.writer.flush()?)
    }
}

/// Persists reports from every robot in the order they arrive, flushing
/// after each one.
pub struct Reporter {
    sink: Box<dyn ReportSink>,
    written: usize,
}

impl Reporter {
    pub fn new<S: ReportSink>(sink: S) -> Self {
        Self::boxed(Box::new(sink))
    }

    pub fn boxed(sink: Box<dyn ReportSink>) -> Self {
        Self { sink, written: 0 }
    }

    /// The reporter stops once the returned reference and all its clones are
    /// gone and everything queued has been written.
    pub fn spawn(self) -> (ActorRef<Reporter>, Termination) {
        actors::run(self, MAILBOX_CAPACITY)
    }
}

#[async_trait]
impl Actor for Reporter {
    type Message = TrafficReport;
    type Error = ReportError;

    async fn handle(&mut self, report: TrafficReport) -> Result<(), ReportError> {
        self.sink.write(&report)?;
        self.sink.flush()?;
        self.written += 1;
        Ok(())
    }

    async fn stopped(&mut self, reason: StopReason) {
        log::info!(
            "Reporter: {} traffic reports written ({:?})",
            self.written,
            reason
        );
    }
}
