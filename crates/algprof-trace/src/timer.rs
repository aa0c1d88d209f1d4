//! Streaming interval statistics.
//!
//! A `StatTimer` folds every start/stop interval into a running count, mean and
//! RMS (Welford's method), so memory stays constant no matter how many
//! intervals are measured. All durations are reported in milliseconds.

use crate::error::TimerAnomaly;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// Source of timestamps for timers
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;
}

/// Monotonic wall clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to. Used by hosts replaying recorded
/// timings and by tests.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Mutex::new(Duration::ZERO),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let mut offset = self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        *offset += by;
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        let offset = *self.offset.lock().unwrap_or_else(PoisonError::into_inner);
        self.origin + offset
    }
}

/// Accumulates start/stop intervals into count, mean and RMS.
#[derive(Debug)]
pub struct StatTimer {
    name: String,
    clock: Arc<dyn Clock>,
    started_at: Option<Instant>,
    last_elapsed_ms: f64,
    count: u64,
    mean_ms: f64,
    /// Sum of squared deviations from the running mean
    m2: f64,
}

impl StatTimer {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_clock(name, Arc::new(SystemClock))
    }

    pub fn with_clock(name: impl Into<String>, clock: Arc<dyn Clock>) -> Self {
        StatTimer {
            name: name.into(),
            clock,
            started_at: None,
            last_elapsed_ms: 0.0,
            count: 0,
            mean_ms: 0.0,
            m2: 0.0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_running(&self) -> bool {
        self.started_at.is_some()
    }

    /// Begin an interval. A second start before `stop()` restarts the interval
    /// from now and reports the anomaly; the aggregates are untouched.
    pub fn start(&mut self) -> Result<(), TimerAnomaly> {
        let previous = self.started_at.replace(self.clock.now());
        match previous {
            Some(_) => Err(TimerAnomaly::AlreadyRunning),
            None => Ok(()),
        }
    }

    /// End the running interval and fold it into the statistics.
    pub fn stop(&mut self) -> Result<(), TimerAnomaly> {
        let started_at = self.started_at.take().ok_or(TimerAnomaly::NotRunning)?;
        let elapsed = self.clock.now().saturating_duration_since(started_at);
        self.record(elapsed.as_nanos() as f64 / 1_000_000.0);
        Ok(())
    }

    fn record(&mut self, sample_ms: f64) {
        self.count += 1;
        let delta = sample_ms - self.mean_ms;
        self.mean_ms += delta / self.count as f64;
        self.m2 += delta * (sample_ms - self.mean_ms);
        self.last_elapsed_ms = sample_ms;
    }

    /// Duration of the most recently completed interval, in ms
    pub fn elapsed(&self) -> f64 {
        self.last_elapsed_ms
    }

    pub fn number_of_measurements(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 { 0.0 } else { self.mean_ms }
    }

    /// Population standard deviation of the intervals, in ms
    pub fn rms(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.m2 / self.count as f64).max(0.0).sqrt()
        }
    }

    /// Sum of all intervals, in ms
    pub fn total(&self) -> f64 {
        self.count as f64 * self.mean()
    }
}
