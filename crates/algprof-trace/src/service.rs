//! The profiling service.
//!
//! `Created → Initialized → Finalized`. Initialization reads the owning
//! task's algorithm list, allocates one timer per algorithm plus one for
//! events and subscribes four handlers to the task's incident channels.
//! Finalization unsubscribes them and writes the report to the log sink in a
//! single locked block.

use crate::config::{ProfilingConfig, TaskConfig};
use crate::error::{Error, Result};
use crate::exec::ExecUnit;
use crate::handlers::{BeginAlgHandler, BeginEvtHandler, EndAlgHandler, EndEvtHandler, TimerTable};
use crate::incident::{BEGIN_ALG, BEGIN_EVENT, END_ALG, END_EVENT, IncidentHandler};
use crate::logging::{LogSink, Logger};
use crate::report::{Report, ReportRow};
use crate::timer::{Clock, SystemClock};
use log::LevelFilter;
use std::fmt;
use std::io::Write;
use std::sync::Arc;

const EVENT_TIMER: &str = "evtTimer";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Created,
    Initialized,
    Finalized,
}

impl ServiceState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceState::Created => "created",
            ServiceState::Initialized => "initialized",
            ServiceState::Finalized => "finalized",
        }
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct ProfilingService {
    name: String,
    config: ProfilingConfig,
    parent: Arc<dyn ExecUnit>,
    logger: Logger,
    clock: Arc<dyn Clock>,
    state: ServiceState,
    algorithms: Vec<String>,
    timers: Option<Arc<TimerTable>>,
    /// Registered handlers, in registration order
    handlers: Vec<(&'static str, Arc<dyn IncidentHandler>)>,
}

impl fmt::Debug for ProfilingService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProfilingService")
            .field("name", &self.name)
            .field("parent", &self.parent.obj_name())
            .field("state", &self.state)
            .field("algorithms", &self.algorithms)
            .field("handlers", &self.handlers)
            .finish_non_exhaustive()
    }
}

impl ProfilingService {
    pub fn new(name: impl Into<String>, parent: Arc<dyn ExecUnit>, sink: Arc<LogSink>) -> Self {
        let name = name.into();
        let config = ProfilingConfig::default();
        let logger = Logger::new(name.clone(), config.log_level, sink);
        ProfilingService {
            name,
            config,
            parent,
            logger,
            clock: Arc::new(SystemClock),
            state: ServiceState::Created,
            algorithms: Vec::new(),
            timers: None,
            handlers: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: ProfilingConfig) -> Self {
        self.logger.set_level(config.log_level);
        self.config = config;
        self
    }

    /// Apply the settings found in the parent task's `services` entry
    pub fn configured_from_task(self) -> Result<Self> {
        let config = ProfilingConfig::from_task(self.parent.json(), &self.name)?;
        Ok(self.with_config(config))
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Takes effect for handlers created by the next `initialize()`
    pub fn set_log_level(&mut self, level: LevelFilter) {
        self.config.log_level = level;
        self.logger.set_level(level);
    }

    pub fn log_level(&self) -> LevelFilter {
        self.config.log_level
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.config.description
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    /// Tracked algorithm names in configuration order
    pub fn algorithms(&self) -> &[String] {
        &self.algorithms
    }

    pub fn initialize(&mut self) -> Result<()> {
        self.expect_state(ServiceState::Created)?;

        let task = TaskConfig::from_json(self.parent.json())?;
        let algorithms = task.algorithm_names()?;
        let table = Arc::new(TimerTable::new(EVENT_TIMER, algorithms.clone(), &self.clock));

        // Every handler inherits the service's logger, and with it the log level
        let view = Arc::downgrade(&table);
        let handlers: [(&'static str, Arc<dyn IncidentHandler>); 4] = [
            (
                BEGIN_EVENT,
                Arc::new(BeginEvtHandler::new(view.clone(), self.logger.clone())),
            ),
            (
                END_EVENT,
                Arc::new(EndEvtHandler::new(view.clone(), self.logger.clone())),
            ),
            (
                BEGIN_ALG,
                Arc::new(BeginAlgHandler::new(view.clone(), self.logger.clone())),
            ),
            (
                END_ALG,
                Arc::new(EndAlgHandler::new(view, self.logger.clone())),
            ),
        ];
        self.register_all(handlers)?;

        self.algorithms = algorithms;
        self.timers = Some(table);
        self.state = ServiceState::Initialized;
        self.logger.info(format_args!("{}", self.config.description));
        Ok(())
    }

    pub fn finalize(&mut self) -> Result<()> {
        self.expect_state(ServiceState::Initialized)?;

        self.unregister_all();
        let report = self.report()?;

        // Hold the stream lock for the whole block so concurrent log lines
        // cannot land inside the report
        let mut out = self.logger.sink().lock();
        let written = write!(out, "{report}").and_then(|()| out.flush());
        drop(out);
        if let Err(e) = written {
            self.logger
                .warn(format_args!("Failed to write profiling report: {e}"));
        }

        self.timers = None;
        self.state = ServiceState::Finalized;
        self.logger.info(format_args!("finalized successfully"));
        Ok(())
    }

    /// Snapshot of the statistics gathered so far
    pub fn report(&self) -> Result<Report> {
        let Some(timers) = &self.timers else {
            return Err(self.state_error(ServiceState::Initialized));
        };

        let algorithms = timers
            .order()
            .iter()
            .map(|name| -> Result<ReportRow> {
                let timer = timers.algorithm(name)?;
                Ok(ReportRow::from_timer(name.clone(), &timer))
            })
            .collect::<Result<Vec<_>>>()?;
        let unit = self.parent.obj_name();

        Ok(Report {
            service: self.name.clone(),
            unit: unit.to_string(),
            algorithms,
            events: ReportRow::from_timer(Report::summary_name(unit), &timers.event()),
        })
    }

    /// Register handlers in order. On failure the ones already registered
    /// are unregistered again.
    fn register_all<I>(&mut self, handlers: I) -> Result<()>
    where
        I: IntoIterator<Item = (&'static str, Arc<dyn IncidentHandler>)>,
    {
        for (channel, handler) in handlers {
            if let Err(e) = self.parent.registry().register(channel, Arc::clone(&handler)) {
                self.unregister_all();
                return Err(e);
            }
            self.handlers.push((channel, handler));
        }
        Ok(())
    }

    fn unregister_all(&mut self) {
        for (channel, handler) in std::mem::take(&mut self.handlers) {
            if let Err(e) = self.parent.registry().unregister(channel, &handler) {
                self.logger.warn(format_args!("{e}"));
            }
        }
    }

    fn expect_state(&self, expected: ServiceState) -> Result<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(self.state_error(expected))
        }
    }

    fn state_error(&self, expected: ServiceState) -> Error {
        Error::InvalidState {
            service: self.name.clone(),
            actual: self.state.as_str(),
            expected: expected.as_str(),
        }
    }
}

impl Drop for ProfilingService {
    fn drop(&mut self) {
        // Never leave handlers subscribed past the service's lifetime
        self.unregister_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::Task;
    use crate::incident::{AlgBase, Incident, IncidentRegistry};
    use crate::logging::SharedBuffer;
    use crate::timer::ManualClock;
    use log::Level;
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::thread;

    struct Alg(String);

    impl Alg {
        fn new(name: &str) -> Self {
            Alg(name.to_string())
        }
    }

    impl AlgBase for Alg {
        fn obj_name(&self) -> &str {
            &self.0
        }
    }

    fn two_alg_task() -> Arc<Task> {
        Arc::new(Task::new(
            "task",
            json!({
                "algorithms": [
                    { "identifier": "PkgA/AlgX" },
                    { "identifier": "PkgB/AlgY" }
                ]
            }),
        ))
    }

    fn service_for(task: &Arc<Task>) -> (SharedBuffer, Arc<ManualClock>, ProfilingService) {
        let buffer = SharedBuffer::new();
        let clock = Arc::new(ManualClock::new());
        let service = ProfilingService::new(
            "profiling",
            task.clone(),
            Arc::new(LogSink::new(buffer.clone())),
        )
        .with_clock(clock.clone());
        (buffer, clock, service)
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-6,
            "expected {expected}, got {actual}"
        );
    }

    fn run_alg(task: &Task, clock: &ManualClock, alg: &Alg, ms: u64) {
        task.fire(&Incident::BeginAlg(alg)).unwrap();
        clock.advance_ms(ms);
        task.fire(&Incident::EndAlg(alg)).unwrap();
    }

    #[test]
    fn test_initialize_tracks_configured_algorithms() {
        let task = two_alg_task();
        let (buffer, _clock, mut service) = service_for(&task);
        service.initialize().unwrap();

        assert_eq!(service.state(), ServiceState::Initialized);
        assert_eq!(service.algorithms(), ["AlgX", "AlgY"]);
        assert_eq!(
            task.bus().channels(),
            ["BeginAlg", "BeginEvent", "EndAlg", "EndEvent"]
        );
        for channel in [BEGIN_EVENT, END_EVENT, BEGIN_ALG, END_ALG] {
            assert_eq!(task.bus().handler_count(channel), 1);
        }
        assert!(buffer.contents().contains(crate::config::DEFAULT_DESCRIPTION));
    }

    #[test]
    fn test_algorithm_statistics() {
        let task = two_alg_task();
        let (_buffer, clock, mut service) = service_for(&task);
        service.initialize().unwrap();

        let alg = Alg::new("AlgX");
        run_alg(&task, &clock, &alg, 10);
        run_alg(&task, &clock, &alg, 20);

        let report = service.report().unwrap();
        let row = report.algorithm("AlgX").unwrap();
        assert_eq!(row.count, 2);
        assert_close(row.mean_ms, 15.0);
        assert_close(row.total_ms, 30.0);
        assert_close(row.rms_ms, 5.0);
        assert_eq!(report.algorithm("AlgY").unwrap().count, 0);
    }

    #[test]
    fn test_event_only_report() {
        let task = two_alg_task();
        let (buffer, clock, mut service) = service_for(&task);
        service.initialize().unwrap();

        task.fire(&Incident::BeginEvent).unwrap();
        clock.advance_ms(7);
        task.fire(&Incident::EndEvent).unwrap();
        service.finalize().unwrap();

        let out = buffer.contents();
        let lines: Vec<&str> = out.lines().collect();
        let header = lines.iter().position(|l| l.starts_with("Name")).unwrap();
        assert!(lines[header + 1].starts_with("AlgX                     0           0.00000        0.00000      0.00000"));
        assert!(lines[header + 2].starts_with("AlgY                     0           0.00000        0.00000      0.00000"));
        assert!(lines[header + 3].starts_with("Sum of task              1           7.00000        7.00000      0.00000"));
        assert_eq!(lines[header + 4], "#".repeat(77));
        assert!(lines[header + 5].ends_with("INFO: finalized successfully"));
    }

    #[test]
    fn test_report_keeps_configuration_order() {
        let task = Arc::new(Task::new(
            "task",
            json!({ "algorithms": [
                { "identifier": "Z/Zeta" },
                { "identifier": "A/Alpha" },
                { "identifier": "M/Mu" }
            ]}),
        ));
        let (buffer, _clock, mut service) = service_for(&task);
        service.initialize().unwrap();
        service.finalize().unwrap();

        let out = buffer.contents();
        let zeta = out.find("\nZeta ").unwrap();
        let alpha = out.find("\nAlpha ").unwrap();
        let mu = out.find("\nMu ").unwrap();
        assert!(zeta < alpha && alpha < mu);
    }

    #[test]
    fn test_finalize_unregisters_and_drops_timers() {
        let task = two_alg_task();
        let (_buffer, _clock, mut service) = service_for(&task);
        service.initialize().unwrap();
        service.finalize().unwrap();

        assert_eq!(service.state(), ServiceState::Finalized);
        assert!(task.bus().channels().is_empty());
        assert!(!task.fire(&Incident::BeginEvent).unwrap());
        assert!(matches!(service.report(), Err(Error::InvalidState { .. })));
    }

    #[test]
    fn test_state_machine_is_enforced() {
        let task = two_alg_task();
        let (_buffer, _clock, mut service) = service_for(&task);

        assert!(matches!(
            service.finalize(),
            Err(Error::InvalidState {
                actual: "created",
                expected: "initialized",
                ..
            })
        ));
        service.initialize().unwrap();
        assert!(matches!(service.initialize(), Err(Error::InvalidState { .. })));
        service.finalize().unwrap();
        assert!(matches!(service.finalize(), Err(Error::InvalidState { .. })));
    }

    #[test]
    fn test_config_error_leaves_nothing_registered() {
        let task = Arc::new(Task::new("task", json!({ "algs": [] })));
        let (_buffer, _clock, mut service) = service_for(&task);

        assert!(matches!(service.initialize(), Err(Error::Config(_))));
        assert_eq!(service.state(), ServiceState::Created);
        assert!(task.bus().channels().is_empty());
    }

    #[test]
    fn test_unknown_algorithm_is_an_error() {
        let task = two_alg_task();
        let (_buffer, _clock, mut service) = service_for(&task);
        service.initialize().unwrap();

        let stranger = Alg::new("Stranger");
        assert!(matches!(
            task.fire(&Incident::BeginAlg(&stranger)),
            Err(Error::UnknownAlgorithm(name)) if name == "Stranger"
        ));
        let report = service.report().unwrap();
        assert_eq!(report.algorithms.len(), 2);
    }

    #[test]
    fn test_debug_level_reaches_end_handlers() {
        let task = two_alg_task();
        let (buffer, clock, service) = service_for(&task);
        let mut service = service.with_config(ProfilingConfig {
            log_level: LevelFilter::Debug,
            description: "timing everything".to_string(),
        });
        service.initialize().unwrap();

        task.fire(&Incident::BeginEvent).unwrap();
        run_alg(&task, &clock, &Alg::new("AlgY"), 3);
        task.fire(&Incident::EndEvent).unwrap();

        let out = buffer.contents();
        assert!(out.contains("INFO: timing everything"));
        assert!(out.contains("DEBUG: The algorithm AlgY took 3ms"));
        assert!(out.contains("DEBUG: The event took 3ms"));
    }

    #[test]
    fn test_configured_from_task() {
        let task = Arc::new(Task::new(
            "task",
            json!({
                "algorithms": [],
                "services": [{ "identifier": "AlgProfiling/profiling",
                               "properties": { "log_level": "debug" } }]
            }),
        ));
        let (_buffer, _clock, service) = service_for(&task);
        let service = service.configured_from_task().unwrap();
        assert_eq!(service.log_level(), LevelFilter::Debug);
    }

    #[test]
    fn test_drop_unregisters_handlers() {
        let task = two_alg_task();
        {
            let (_buffer, _clock, mut service) = service_for(&task);
            service.initialize().unwrap();
            assert_eq!(task.bus().channels().len(), 4);
        }
        assert!(task.bus().channels().is_empty());
    }

    #[test]
    fn test_parallel_algorithms() {
        let names: Vec<String> = (0..4).map(|i| format!("Alg{i}")).collect();
        let algorithms: Vec<Value> = names
            .iter()
            .map(|n| json!({ "identifier": format!("Pkg/{n}") }))
            .collect();
        let task = Arc::new(Task::new("task", json!({ "algorithms": algorithms })));
        let (_buffer, _clock, mut service) = service_for(&task);
        service.initialize().unwrap();

        let workers: Vec<_> = names
            .iter()
            .map(|name| {
                let task = Arc::clone(&task);
                let alg = Alg::new(name);
                thread::spawn(move || {
                    for _ in 0..200 {
                        task.fire(&Incident::BeginAlg(&alg)).unwrap();
                        task.fire(&Incident::EndAlg(&alg)).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        let report = service.report().unwrap();
        assert!(report.algorithms.iter().all(|row| row.count == 200));
    }

    #[test]
    fn test_report_is_not_interleaved() {
        let task = two_alg_task();
        let buffer = SharedBuffer::new();
        let sink = Arc::new(LogSink::new(buffer.clone()));
        let mut service = ProfilingService::new("profiling", task.clone(), sink.clone());
        service.initialize().unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let noisy = {
            let sink = Arc::clone(&sink);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                let mut n = 0u64;
                while !stop.load(Ordering::SeqCst) {
                    sink.write_line("noise", Level::Info, format_args!("line {n}"));
                    n += 1;
                    thread::yield_now();
                }
            })
        };
        while !buffer.contents().contains("noise") {
            thread::yield_now();
        }

        service.finalize().unwrap();
        stop.store(true, Ordering::SeqCst);
        noisy.join().unwrap();

        let out = buffer.contents();
        let lines: Vec<&str> = out.lines().collect();
        let top = lines
            .iter()
            .position(|l| l.contains(" profiling #"))
            .unwrap();
        let bottom = "#".repeat(77);
        assert!(lines[top + 1].starts_with("Name"));
        assert!(lines[top + 2].starts_with("AlgX"));
        assert!(lines[top + 3].starts_with("AlgY"));
        assert!(lines[top + 4].starts_with("Sum of task"));
        assert_eq!(lines[top + 5], bottom);
    }

    #[test]
    fn test_facade_logging_does_not_split_report() {
        let task = two_alg_task();
        let buffer = SharedBuffer::new();
        let sink = Arc::new(LogSink::new(buffer.clone()));
        let mut service = ProfilingService::new("profiling", task.clone(), sink.clone());
        service.initialize().unwrap();

        let stop = Arc::new(AtomicBool::new(false));
        let pipeline = {
            let sink = Arc::clone(&sink);
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                use log::Log;

                let mut n = 0u64;
                while !stop.load(Ordering::SeqCst) {
                    sink.log(
                        &log::Record::builder()
                            .target("pipeline")
                            .level(Level::Info)
                            .args(format_args!("step {n}"))
                            .build(),
                    );
                    n += 1;
                    thread::yield_now();
                }
            })
        };
        while !buffer.contents().contains("pipeline") {
            thread::yield_now();
        }

        service.finalize().unwrap();
        stop.store(true, Ordering::SeqCst);
        pipeline.join().unwrap();

        let out = buffer.contents();
        let lines: Vec<&str> = out.lines().collect();
        let top = lines
            .iter()
            .position(|l| l.contains(" profiling #"))
            .unwrap();
        assert!(lines[top + 1].starts_with("Name"));
        assert!(lines[top + 2].starts_with("AlgX"));
        assert!(lines[top + 3].starts_with("AlgY"));
        assert!(lines[top + 4].starts_with("Sum of task"));
        assert_eq!(lines[top + 5], "#".repeat(77));
        assert!(lines.iter().any(|l| l.starts_with("pipeline") && l.contains("INFO: step")));
    }

    /// Registry that refuses the n-th registration
    struct FlakyRegistry {
        fail_at: usize,
        attempts: Mutex<usize>,
        registered: Mutex<Vec<String>>,
    }

    impl IncidentRegistry for FlakyRegistry {
        fn register(&self, channel: &str, handler: Arc<dyn IncidentHandler>) -> Result<()> {
            let mut attempts = self.attempts.lock().unwrap();
            *attempts += 1;
            if *attempts == self.fail_at {
                return Err(Error::AlreadyRegistered {
                    channel: channel.to_string(),
                    handler: handler.name().to_string(),
                });
            }
            self.registered.lock().unwrap().push(channel.to_string());
            Ok(())
        }

        fn unregister(&self, channel: &str, _handler: &Arc<dyn IncidentHandler>) -> Result<()> {
            let mut registered = self.registered.lock().unwrap();
            let idx = registered.iter().position(|c| c == channel).unwrap();
            registered.remove(idx);
            Ok(())
        }
    }

    struct FlakyUnit {
        json: Value,
        registry: FlakyRegistry,
    }

    impl ExecUnit for FlakyUnit {
        fn obj_name(&self) -> &str {
            "flaky"
        }

        fn json(&self) -> &Value {
            &self.json
        }

        fn registry(&self) -> &dyn IncidentRegistry {
            &self.registry
        }
    }

    #[test]
    fn test_failed_registration_rolls_back() {
        let unit = Arc::new(FlakyUnit {
            json: json!({ "algorithms": [{ "identifier": "P/AlgX" }] }),
            registry: FlakyRegistry {
                fail_at: 3,
                attempts: Mutex::new(0),
                registered: Mutex::new(Vec::new()),
            },
        });
        let mut service = ProfilingService::new(
            "profiling",
            unit.clone(),
            Arc::new(LogSink::new(SharedBuffer::new())),
        );

        assert!(matches!(
            service.initialize(),
            Err(Error::AlreadyRegistered { channel, .. }) if channel == "BeginAlg"
        ));
        assert_eq!(service.state(), ServiceState::Created);
        assert!(unit.registry.registered.lock().unwrap().is_empty());
    }
}
