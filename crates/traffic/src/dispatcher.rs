use core::fmt;
use std::{collections::BTreeMap, error::Error, io, sync::Arc};

use actors::{
    actor::ActorError,
    actor_ref::{ActorRef, Termination},
};
use chrono::{NaiveDateTime, Timelike};
use model::VehicleId;
use serde::Serialize;
use tokio::{
    sync::{mpsc, oneshot},
    task::{JoinError, JoinSet},
};

use crate::{
    observer::{Event, Observer, SkipReason},
    robot::{Robot, RobotHandle},
    source::{RouteSource, SourceError},
};

/// Hour and minute at which a robot is taken off the road.
pub const CUTOFF: (u32, u32) = (8, 10);

type RoutingTable = BTreeMap<VehicleId, ActorRef<Robot>>;

/// Counters collected while reading the sources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub records_read: usize,
    pub delivered: usize,
    pub skipped_malformed: usize,
    pub skipped_unknown_vehicle: usize,
    pub skipped_stopped_robot: usize,
    pub cutoffs: usize,
}

impl DispatchSummary {
    fn absorb(&mut self, other: &DispatchSummary) {
        self.records_read += other.records_read;
        self.delivered += other.delivered;
        self.skipped_malformed += other.skipped_malformed;
        self.skipped_unknown_vehicle += other.skipped_unknown_vehicle;
        self.skipped_stopped_robot += other.skipped_stopped_robot;
        self.cutoffs += other.cutoffs;
    }
}

#[derive(Debug)]
pub enum DispatchError {
    Source { name: String, why: io::Error },
    SourcePanicked(JoinError),
    InstructionChannelClosed,
    RoutesStillShared,
    Acknowledgement { vehicle_id: VehicleId, why: ActorError },
    TerminateLost,
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Source { name, why } => write!(f, "unable to read source {}: {}", name, why),
            Self::SourcePanicked(why) => write!(f, "source task failed: {}", why),
            Self::InstructionChannelClosed => write!(f, "instruction channel closed"),
            Self::RoutesStillShared => {
                write!(f, "routing table still in use while shutting down")
            }
            Self::Acknowledgement { vehicle_id, why } => {
                write!(f, "robot {} did not acknowledge shutdown: {}", vehicle_id, why)
            }
            Self::TerminateLost => write!(f, "dispatcher went away without terminating"),
        }
    }
}

impl Error for DispatchError {}

#[derive(Debug)]
enum Instruction {
    Shutdown(DispatchSummary),
    Abort(DispatchSummary, DispatchError),
}

/// Feeds route points from every source to the robots and shuts them down
/// once all sources are done.
pub struct Dispatcher {
    routes: Arc<RoutingTable>,
    terminations: BTreeMap<VehicleId, Termination>,
    sources: Vec<RouteSource>,
    observer: Arc<dyn Observer>,
}

/// Resolves exactly once, after every robot acknowledged its shutdown.
pub struct Terminate(oneshot::Receiver<Result<DispatchSummary, DispatchError>>);

impl Terminate {
    pub async fn wait(self) -> Result<DispatchSummary, DispatchError> {
        self.0.await.map_err(|_| DispatchError::TerminateLost)?
    }
}

impl Dispatcher {
    pub fn new<I>(robots: I, sources: Vec<RouteSource>, observer: Arc<dyn Observer>) -> Self
    where
        I: IntoIterator<Item = RobotHandle>,
    {
        let mut routes = RoutingTable::new();
        let mut terminations = BTreeMap::new();
        for robot in robots {
            routes.insert(robot.id, robot.actor);
            terminations.insert(robot.id, robot.termination);
        }
        Self {
            routes: Arc::new(routes),
            terminations,
            sources,
            observer,
        }
    }

    /// Starts reading the sources and the control loop.
    pub fn start(self) -> Terminate {
        let (instruction_tx, instruction_rx) = mpsc::channel(1);
        let (terminate_tx, terminate_rx) = oneshot::channel();
        let Dispatcher {
            routes,
            terminations,
            sources,
            observer,
        } = self;

        tokio::spawn(process(
            sources,
            Arc::clone(&routes),
            Arc::clone(&observer),
            instruction_tx,
        ));
        tokio::spawn(async move {
            let result = run(routes, terminations, instruction_rx, observer).await;
            if let Err(why) = &result {
                log::error!("Dispatcher: {}", why);
            }
            if terminate_tx.send(result).is_err() {
                log::warn!("Dispatcher: terminated without anyone waiting");
            }
        });

        Terminate(terminate_rx)
    }
}

/// The control loop. Waits for the sources to be done, then stops the robots
/// one after another.
async fn run(
    routes: Arc<RoutingTable>,
    terminations: BTreeMap<VehicleId, Termination>,
    mut instructions: mpsc::Receiver<Instruction>,
    observer: Arc<dyn Observer>,
) -> Result<DispatchSummary, DispatchError> {
    if let Some(instruction) = instructions.recv().await {
        // every source task is finished by now, so this is the last reference
        let routes = Arc::try_unwrap(routes).map_err(|_| DispatchError::RoutesStillShared)?;
        return match instruction {
            Instruction::Shutdown(summary) => {
                log::info!("Dispatcher: received SHUTDOWN");
                shutdown(routes, terminations, observer.as_ref()).await?;
                observer.notify(Event::Terminated);
                Ok(summary)
            }
            Instruction::Abort(summary, why) => {
                log::error!("Dispatcher: aborting after {:?}", summary);
                for robot in routes.values() {
                    robot.kill();
                }
                shutdown(routes, terminations, observer.as_ref()).await?;
                observer.notify(Event::Terminated);
                Err(why)
            }
        };
    }
    Err(DispatchError::InstructionChannelClosed)
}

async fn shutdown(
    mut routes: RoutingTable,
    terminations: BTreeMap<VehicleId, Termination>,
    observer: &dyn Observer,
) -> Result<(), DispatchError> {
    for (vehicle_id, termination) in terminations {
        observer.notify(Event::ShutdownStarted { vehicle_id });
        if let Some(robot) = routes.remove(&vehicle_id) {
            robot.close();
        }
        let reason = termination
            .acknowledged()
            .await
            .map_err(|why| DispatchError::Acknowledgement { vehicle_id, why })?;
        observer.notify(Event::ShutdownAcknowledged { vehicle_id, reason });
    }
    Ok(())
}

/// Reads every source on its own task and tells the control loop when all of
/// them are done.
async fn process(
    sources: Vec<RouteSource>,
    routes: Arc<RoutingTable>,
    observer: Arc<dyn Observer>,
    instructions: mpsc::Sender<Instruction>,
) {
    let mut tasks = JoinSet::new();
    for source in sources {
        let routes = Arc::clone(&routes);
        let observer = Arc::clone(&observer);
        tasks.spawn(async move {
            let mut summary = DispatchSummary::default();
            let result = feed(source, &routes, observer.as_ref(), &mut summary).await;
            (summary, result)
        });
    }
    drop(routes);

    let mut summary = DispatchSummary::default();
    let mut failure = None;
    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((source_summary, result)) => {
                summary.absorb(&source_summary);
                if let Err(why) = result {
                    tasks.abort_all();
                    failure.get_or_insert(why);
                }
            }
            Err(why) if why.is_cancelled() => {}
            Err(why) => {
                tasks.abort_all();
                failure.get_or_insert(DispatchError::SourcePanicked(why));
            }
        }
    }

    log::info!("Dispatcher: finished loading sources");
    let instruction = match failure {
        None => Instruction::Shutdown(summary),
        Some(why) => Instruction::Abort(summary, why),
    };
    if let Err(why) = instructions.send(instruction).await {
        log::error!("Dispatcher: control loop is gone: {:?}", why.0);
    }
}

fn is_cutoff(time: &NaiveDateTime) -> bool {
    (time.hour(), time.minute()) == CUTOFF
}

async fn feed(
    mut source: RouteSource,
    routes: &RoutingTable,
    observer: &dyn Observer,
    summary: &mut DispatchSummary,
) -> Result<(), DispatchError> {
    let skip = |reason: SkipReason, source: &RouteSource| {
        observer.notify(Event::RecordSkipped {
            source: source.name().to_string(),
            reason,
        })
    };

    while let Some(item) = source.next().await {
        summary.records_read += 1;
        let record = match item {
            Ok(record) => record,
            Err(SourceError::Record(why)) => {
                summary.skipped_malformed += 1;
                skip(SkipReason::Malformed(why), &source);
                continue;
            }
            Err(SourceError::Io(why)) => {
                return Err(DispatchError::Source {
                    name: source.name().to_string(),
                    why,
                });
            }
        };

        let (vehicle_id, route_point) = match record.parse() {
            Ok(parsed) => parsed,
            Err(why) => {
                summary.skipped_malformed += 1;
                skip(SkipReason::Malformed(why), &source);
                continue;
            }
        };

        let Some(robot) = routes.get(&vehicle_id) else {
            summary.skipped_unknown_vehicle += 1;
            skip(SkipReason::UnknownVehicle(vehicle_id), &source);
            continue;
        };

        if is_cutoff(&route_point.time) {
            summary.cutoffs += 1;
            observer.notify(Event::CutoffReached {
                vehicle_id,
                time: route_point.time,
            });
            robot.kill();
            break;
        }

        let (point, time) = (route_point.point, route_point.time);
        match robot.tell(route_point).await {
            Ok(()) => {
                summary.delivered += 1;
                observer.notify(Event::PointDelivered {
                    vehicle_id,
                    point,
                    time,
                });
            }
            Err(_) => {
                summary.skipped_stopped_robot += 1;
                skip(SkipReason::WorkerStopped(vehicle_id), &source);
            }
        }
    }

    observer.notify(Event::SourceFinished {
        source: source.name().to_string(),
    });
    Ok(())
}

#[cfg(test)]
mod test {
    use actors::actor::StopReason;
    use model::{report::TrafficReport, station::Station};
    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        reporter::{ReportError, ReportSink, Reporter},
        source::RouteRecord,
        stations::StationIndex,
    };

    struct ChannelObserver(mpsc::UnboundedSender<Event>);

    impl Observer for ChannelObserver {
        fn notify(&self, event: Event) {
            let _ = self.0.send(event);
        }
    }

    struct ChannelSink(mpsc::UnboundedSender<TrafficReport>);

    impl ReportSink for ChannelSink {
        fn write(&mut self, report: &TrafficReport) -> Result<(), ReportError> {
            self.0.send(report.clone()).unwrap();
            Ok(())
        }

        fn flush(&mut self) -> Result<(), ReportError> {
            Ok(())
        }
    }

    struct Fixture {
        robots: Vec<RobotHandle>,
        observer: Arc<dyn Observer>,
        events: mpsc::UnboundedReceiver<Event>,
        reports: mpsc::UnboundedReceiver<TrafficReport>,
    }

    fn fixture(ids: &[VehicleId]) -> Fixture {
        let (event_tx, events) = mpsc::unbounded_channel();
        let (report_tx, reports) = mpsc::unbounded_channel();
        let observer: Arc<dyn Observer> = Arc::new(ChannelObserver(event_tx));
        let stations = Arc::new(StationIndex::new([Station::new(
            "Oxford Circus",
            51.515,
            -0.1415,
        )]));
        let (reporter, _) = Reporter::new(ChannelSink(report_tx)).spawn();
        let robots = ids
            .iter()
            .map(|id| {
                Robot::new(
                    *id,
                    Arc::clone(&stations),
                    reporter.clone(),
                    Arc::clone(&observer),
                )
                .spawn()
            })
            .collect();
        Fixture {
            robots,
            observer,
            events,
            reports,
        }
    }

    /// Everything sent so far.
    fn drain<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> Vec<T> {
        let mut items = vec![];
        while let Ok(item) = rx.try_recv() {
            items.push(item);
        }
        items
    }

    /// Everything sent until the reporter stops.
    async fn written(mut rx: mpsc::UnboundedReceiver<TrafficReport>) -> Vec<TrafficReport> {
        let mut reports = vec![];
        while let Some(report) = rx.recv().await {
            reports.push(report);
        }
        reports
    }

    fn record(id: &str, lat: &str, lon: &str, ts: &str) -> RouteRecord {
        RouteRecord::new(id, lat, lon, ts)
    }

    #[test]
    fn cutoff_matches_hour_and_minute_only() {
        let at = |ts| utility::serde::date_time::parse(ts).unwrap();
        assert!(is_cutoff(&at("2011-03-22 08:10:00")));
        assert!(is_cutoff(&at("2011-03-22 08:10:59")));
        assert!(!is_cutoff(&at("2011-03-22 08:09:59")));
        assert!(!is_cutoff(&at("2011-03-22 08:11:00")));
        assert!(!is_cutoff(&at("2011-03-22 20:10:00")));
    }

    #[tokio::test]
    async fn delivers_and_shuts_down_in_order() {
        let mut fixture = fixture(&[6043, 5937]);
        let sources = vec![
            RouteSource::from_records(
                "5937.csv",
                vec![
                    record("5937", "51.515", "-0.1415", "2011-03-22 07:47:00"),
                    record("5937", "51.5152", "-0.1415", "2011-03-22 07:48:00"),
                ],
            ),
            RouteSource::from_records(
                "6043.csv",
                vec![record("6043", "51.6", "-0.2", "2011-03-22 07:47:00")],
            ),
        ];

        let summary = Dispatcher::new(fixture.robots, sources, fixture.observer)
            .start()
            .wait()
            .await
            .unwrap();

        assert_eq!(
            summary,
            DispatchSummary {
                records_read: 3,
                delivered: 3,
                ..Default::default()
            }
        );
        let events = drain(&mut fixture.events);
        let shutdowns = events
            .iter()
            .filter_map(|event| match event {
                Event::ShutdownStarted { vehicle_id } => Some((*vehicle_id, None)),
                Event::ShutdownAcknowledged { vehicle_id, reason } => {
                    Some((*vehicle_id, Some(*reason)))
                }
                _ => None,
            })
            .collect::<Vec<_>>();
        assert_eq!(
            shutdowns,
            vec![
                (5937, None),
                (5937, Some(StopReason::Closed)),
                (6043, None),
                (6043, Some(StopReason::Closed)),
            ]
        );
        assert_eq!(events.last(), Some(&Event::Terminated));
        assert_eq!(written(fixture.reports).await.len(), 2);
    }

    #[tokio::test]
    async fn skips_bad_records_and_unknown_vehicles() {
        let mut fixture = fixture(&[5937]);
        let sources = vec![RouteSource::from_records(
            "5937.csv",
            vec![
                record("5937", "51.515", "-0.1415", "yesterday"),
                record("x", "51.515", "-0.1415", "2011-03-22 07:47:00"),
                record("1234", "51.515", "-0.1415", "2011-03-22 07:47:00"),
                record("5937", "51.515", "-0.1415", "2011-03-22 07:47:00"),
            ],
        )];

        let summary = Dispatcher::new(fixture.robots, sources, fixture.observer)
            .start()
            .wait()
            .await
            .unwrap();

        assert_eq!(summary.records_read, 4);
        assert_eq!(summary.skipped_malformed, 2);
        assert_eq!(summary.skipped_unknown_vehicle, 1);
        assert_eq!(summary.delivered, 1);
        let skipped = drain(&mut fixture.events)
            .into_iter()
            .filter_map(|event| match event {
                Event::RecordSkipped { reason, .. } => Some(reason),
                _ => None,
            })
            .collect::<Vec<_>>();
        assert!(matches!(skipped[0], SkipReason::Malformed(_)));
        assert!(matches!(skipped[1], SkipReason::Malformed(_)));
        assert_eq!(skipped[2], SkipReason::UnknownVehicle(1234));
        // only the valid record reached the robot
        let reports = written(fixture.reports).await;
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].speed, 0.0);
    }

    #[tokio::test]
    async fn cutoff_stops_the_source() {
        let mut fixture = fixture(&[5937]);
        let sources = vec![RouteSource::from_records(
            "5937.csv",
            vec![
                record("5937", "51.515", "-0.1415", "2011-03-22 08:09:00"),
                record("5937", "51.5152", "-0.1415", "2011-03-22 08:10:00"),
                record("5937", "51.5151", "-0.1415", "2011-03-22 08:11:00"),
            ],
        )];

        let summary = Dispatcher::new(fixture.robots, sources, fixture.observer)
            .start()
            .wait()
            .await
            .unwrap();

        assert_eq!(summary.records_read, 2);
        assert_eq!(summary.delivered, 1);
        assert_eq!(summary.cutoffs, 1);
        let events = drain(&mut fixture.events);
        assert!(events.iter().any(|event| matches!(
            event,
            Event::CutoffReached {
                vehicle_id: 5937,
                ..
            }
        )));
        assert!(events.iter().any(|event| matches!(
            event,
            Event::ShutdownAcknowledged {
                vehicle_id: 5937,
                reason: StopReason::Killed | StopReason::Closed,
            }
        )));
        // at most the point delivered before the cutoff was reported
        assert!(written(fixture.reports).await.len() <= 1);
    }

    #[tokio::test]
    async fn source_failure_aborts() {
        let fixture = fixture(&[5937]);
        let failing = futures::stream::iter(vec![
            Ok(record("5937", "51.515", "-0.1415", "2011-03-22 07:47:00")),
            Err(SourceError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "truncated",
            ))),
        ]);
        let sources = vec![RouteSource::new(
            "5937.csv",
            futures::StreamExt::boxed(failing),
        )];

        let result = Dispatcher::new(fixture.robots, sources, fixture.observer)
            .start()
            .wait()
            .await;

        assert!(matches!(
            result,
            Err(DispatchError::Source { ref name, .. }) if name == "5937.csv"
        ));
    }

    #[tokio::test]
    async fn no_sources_still_terminates() {
        let fixture = fixture(&[1, 2, 3]);
        let summary = Dispatcher::new(fixture.robots, vec![], fixture.observer)
            .start()
            .wait()
            .await
            .unwrap();
        assert_eq!(summary, DispatchSummary::default());
    }
}
