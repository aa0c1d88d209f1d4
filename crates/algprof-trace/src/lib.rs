//! In-process timing of pipeline events and algorithms.
//!
//! A [`ProfilingService`] attaches to an execution unit (usually a [`Task`]),
//! subscribes to its `BeginEvent` / `EndEvent` / `BeginAlg` / `EndAlg`
//! incident channels and keeps streaming statistics per algorithm and for the
//! event loop as a whole. On finalize it writes a fixed-width report through
//! the shared [`LogSink`].
//!
//! # Usage
//!
//! ```rust,ignore
//! let task = Arc::new(Task::from_file("reco", Path::new("task.json"))?);
//! let sink = Arc::new(LogSink::stderr());
//! let mut profiling = ProfilingService::new("profiling", task.clone(), sink);
//! profiling.initialize()?;
//!
//! task.fire(&Incident::BeginEvent)?;
//! task.fire(&Incident::BeginAlg(&my_alg))?;
//! // ... run the algorithm ...
//! task.fire(&Incident::EndAlg(&my_alg))?;
//! task.fire(&Incident::EndEvent)?;
//!
//! profiling.finalize()?;
//! ```
//!
//! # Threading
//!
//! Handlers run on whatever thread fires the incident. Each timer has its own
//! lock, so incidents for different algorithms may be fired concurrently.
//! The host must not overlap two begin/end pairs of the same algorithm, and
//! must not overlap events: there is a single event timer. Violations are
//! logged as warnings and never corrupt the statistics.

pub mod config;
pub mod error;
pub mod exec;
mod handlers;
pub mod incident;
pub mod logging;
pub mod report;
pub mod service;
pub mod timer;

pub use error::{Error, Result, TimerAnomaly};
pub use exec::{ExecUnit, Task};
pub use incident::{AlgBase, Incident, IncidentBus, IncidentHandler, IncidentRegistry};
pub use logging::{LogSink, Logger, SharedBuffer};
pub use report::{Report, ReportRow};
pub use service::{ProfilingService, ServiceState};
pub use timer::{Clock, ManualClock, StatTimer, SystemClock};
