use super::load_task;
use crate::cli::parse_duration;
use crate::error::{Error, Result};
use algprof_trace::config::TaskConfig;
use algprof_trace::{AlgBase, ExecUnit, Incident, LogSink, ProfilingService, Task};
use log::LevelFilter;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

const DEFAULT_EVENTS: u64 = 10;

/// Stand-in algorithm whose execute step sleeps for a fixed cost
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatedAlg {
    pub name: String,
    pub cost: Duration,
}

impl SimulatedAlg {
    fn execute(&self) {
        log::debug!("{} executing for {:?}", self.name, self.cost);
        if !self.cost.is_zero() {
            std::thread::sleep(self.cost);
        }
    }
}

impl AlgBase for SimulatedAlg {
    fn obj_name(&self) -> &str {
        &self.name
    }
}

/// Where the service's log stream goes
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Output {
    #[default]
    Stderr,
    File(PathBuf),
    /// algprof.<task>.<timestamp>.log in the working directory
    Timestamped,
}

#[derive(Debug, Clone)]
pub struct SimulateOptions {
    pub name: Option<String>,
    pub service: String,
    pub events: Option<u64>,
    pub cost: Duration,
    pub duration: Option<Duration>,
    pub log_level: Option<LevelFilter>,
    pub json: bool,
    pub output: Output,
}

impl Default for SimulateOptions {
    fn default() -> Self {
        SimulateOptions {
            name: None,
            service: "profiling".to_string(),
            events: None,
            cost: Duration::from_millis(1),
            duration: None,
            log_level: None,
            json: false,
            output: Output::Stderr,
        }
    }
}

/// Build one simulated algorithm per configured entry, in configuration
/// order. A `cost` property overrides the default cost.
pub fn build_algorithms(config: &TaskConfig, default_cost: Duration) -> Result<Vec<SimulatedAlg>> {
    let names = config.algorithm_names()?;

    config
        .algorithms
        .iter()
        .zip(names)
        .map(|(entry, name)| -> Result<SimulatedAlg> {
            let cost = match entry.properties.get("cost") {
                None => default_cost,
                Some(value) => value
                    .as_str()
                    .and_then(|s| parse_duration(s).ok())
                    .ok_or_else(|| Error::InvalidCost {
                        algorithm: name.clone(),
                        value: value.to_string(),
                    })?,
            };
            Ok(SimulatedAlg { name, cost })
        })
        .collect()
}

/// Drive events through the task until the event limit, the deadline, or
/// `running` going false. Returns the number of completed events.
pub fn run_events(
    task: &Task,
    algorithms: &[SimulatedAlg],
    limit: Option<u64>,
    deadline: Option<Instant>,
    running: &AtomicBool,
) -> Result<u64> {
    let mut completed = 0u64;

    while running.load(Ordering::SeqCst) {
        if limit.is_some_and(|n| completed >= n) {
            break;
        }
        if deadline.is_some_and(|d| Instant::now() >= d) {
            break;
        }

        task.fire(&Incident::BeginEvent)?;
        for alg in algorithms {
            task.fire(&Incident::BeginAlg(alg))?;
            alg.execute();
            task.fire(&Incident::EndAlg(alg))?;
        }
        task.fire(&Incident::EndEvent)?;
        completed += 1;
    }

    Ok(completed)
}

fn open_sink(
    output: &Output,
    task_name: &str,
    level: LevelFilter,
) -> Result<(Arc<LogSink>, Option<PathBuf>)> {
    let path = match output {
        Output::Stderr => return Ok((Arc::new(LogSink::stderr().with_max_level(level)), None)),
        Output::File(path) => path.clone(),
        Output::Timestamped => {
            let timestamp = chrono::Local::now().format("%y%m%d%H%M%S");
            PathBuf::from(format!("algprof.{}.{}.log", task_name, timestamp))
        }
    };
    let file = std::fs::File::create(&path)?;
    Ok((Arc::new(LogSink::new(file).with_max_level(level)), Some(path)))
}

/// Run the simulation until done or until `running` goes false. The caller
/// owns the Ctrl-C handler that clears the flag.
pub fn run(path: &std::path::Path, opts: SimulateOptions, running: &AtomicBool) -> Result<()> {
    let task = Arc::new(load_task(path, opts.name.as_deref())?);
    let config = TaskConfig::from_json(task.json())?;
    let algorithms = build_algorithms(&config, opts.cost)?;

    let (sink, log_path) = open_sink(
        &opts.output,
        task.obj_name(),
        opts.log_level.unwrap_or(LevelFilter::Info),
    )?;
    if let Some(log_path) = &log_path {
        eprintln!("Output: {}", log_path.display());
    }
    // Pipeline code logging through `log` shares the report's lock. Only the
    // first sink of a process can become the global logger.
    if sink.install().is_err() {
        eprintln!("Global logger already set; `log` records bypass this run's output");
    }

    let mut service =
        ProfilingService::new(opts.service.as_str(), task.clone(), sink).configured_from_task()?;
    if let Some(level) = opts.log_level {
        service.set_log_level(level);
    }
    service.initialize()?;

    let limit = match (opts.events, opts.duration) {
        (None, None) => Some(DEFAULT_EVENTS),
        (events, _) => events,
    };
    let deadline = opts.duration.map(|d| Instant::now() + d);

    eprintln!(
        "Simulating {} with {} algorithms (Ctrl+C to stop)...",
        task.obj_name(),
        algorithms.len()
    );
    let completed = run_events(&task, &algorithms, limit, deadline, running)?;
    eprintln!(
        "{} events in {}",
        completed,
        humantime::format_duration(Duration::from_millis(
            service.report()?.events.total_ms as u64
        ))
    );

    if opts.json {
        println!("{}", serde_json::to_string_pretty(&service.report()?)?);
    }

    service.finalize()?;
    Ok(())
}
