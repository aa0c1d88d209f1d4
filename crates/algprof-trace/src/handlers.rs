//! Incident handlers that drive the service's timers.
//!
//! Handlers never own timers. They hold a `Weak` view of the service's
//! [`TimerTable`]; once the service drops the table a late incident is simply
//! reported as not handled.

use crate::error::{Error, Result, TimerAnomaly};
use crate::incident::{Incident, IncidentHandler};
use crate::logging::Logger;
use crate::timer::{Clock, StatTimer};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

/// All timers of one profiling service. The key set is fixed at construction.
#[derive(Debug)]
pub(crate) struct TimerTable {
    event: Mutex<StatTimer>,
    algorithms: HashMap<String, Mutex<StatTimer>>,
    order: Vec<String>,
}

impl TimerTable {
    pub(crate) fn new(event_timer: &str, algorithms: Vec<String>, clock: &Arc<dyn Clock>) -> Self {
        let timers = algorithms
            .iter()
            .map(|name| {
                let timer = StatTimer::with_clock(name.clone(), Arc::clone(clock));
                (name.clone(), Mutex::new(timer))
            })
            .collect();

        TimerTable {
            event: Mutex::new(StatTimer::with_clock(event_timer, Arc::clone(clock))),
            algorithms: timers,
            order: algorithms,
        }
    }

    pub(crate) fn event(&self) -> MutexGuard<'_, StatTimer> {
        self.event.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn algorithm(&self, name: &str) -> Result<MutexGuard<'_, StatTimer>> {
        let timer = self
            .algorithms
            .get(name)
            .ok_or_else(|| Error::UnknownAlgorithm(name.to_string()))?;
        Ok(timer.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Algorithm names in configuration order
    pub(crate) fn order(&self) -> &[String] {
        &self.order
    }
}

fn warn_anomaly(logger: &Logger, timer: &str, anomaly: TimerAnomaly) {
    logger.warn(format_args!("Timer {timer} {anomaly}"));
}

fn unexpected(handler: &'static str, incident: &Incident<'_>) -> Error {
    Error::UnexpectedIncident {
        handler,
        channel: incident.channel(),
    }
}

#[derive(Debug)]
pub(crate) struct BeginEvtHandler {
    timers: Weak<TimerTable>,
    logger: Logger,
}

impl BeginEvtHandler {
    const NAME: &'static str = "BeginEvtHandler";

    pub(crate) fn new(timers: Weak<TimerTable>, logger: Logger) -> Self {
        Self { timers, logger }
    }
}

impl IncidentHandler for BeginEvtHandler {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn handle(&self, incident: &Incident<'_>) -> Result<bool> {
        let Incident::BeginEvent = incident else {
            return Err(unexpected(Self::NAME, incident));
        };
        let Some(timers) = self.timers.upgrade() else {
            return Ok(false);
        };

        let mut timer = timers.event();
        if let Err(anomaly) = timer.start() {
            warn_anomaly(&self.logger, timer.name(), anomaly);
        }
        Ok(true)
    }
}

#[derive(Debug)]
pub(crate) struct EndEvtHandler {
    timers: Weak<TimerTable>,
    logger: Logger,
}

impl EndEvtHandler {
    const NAME: &'static str = "EndEvtHandler";

    pub(crate) fn new(timers: Weak<TimerTable>, logger: Logger) -> Self {
        Self { timers, logger }
    }
}

impl IncidentHandler for EndEvtHandler {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn handle(&self, incident: &Incident<'_>) -> Result<bool> {
        let Incident::EndEvent = incident else {
            return Err(unexpected(Self::NAME, incident));
        };
        let Some(timers) = self.timers.upgrade() else {
            return Ok(false);
        };

        let mut timer = timers.event();
        match timer.stop() {
            Ok(()) => self
                .logger
                .debug(format_args!("The event took {}ms", timer.elapsed())),
            Err(anomaly) => warn_anomaly(&self.logger, timer.name(), anomaly),
        }
        Ok(true)
    }
}

#[derive(Debug)]
pub(crate) struct BeginAlgHandler {
    timers: Weak<TimerTable>,
    logger: Logger,
}

impl BeginAlgHandler {
    const NAME: &'static str = "BeginAlgHandler";

    pub(crate) fn new(timers: Weak<TimerTable>, logger: Logger) -> Self {
        Self { timers, logger }
    }
}

impl IncidentHandler for BeginAlgHandler {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn handle(&self, incident: &Incident<'_>) -> Result<bool> {
        let Incident::BeginAlg(alg) = incident else {
            return Err(unexpected(Self::NAME, incident));
        };
        let Some(timers) = self.timers.upgrade() else {
            return Ok(false);
        };

        let mut timer = timers.algorithm(alg.obj_name())?;
        if let Err(anomaly) = timer.start() {
            warn_anomaly(&self.logger, timer.name(), anomaly);
        }
        Ok(true)
    }
}

#[derive(Debug)]
pub(crate) struct EndAlgHandler {
    timers: Weak<TimerTable>,
    logger: Logger,
}

impl EndAlgHandler {
    const NAME: &'static str = "EndAlgHandler";

    pub(crate) fn new(timers: Weak<TimerTable>, logger: Logger) -> Self {
        Self { timers, logger }
    }
}

impl IncidentHandler for EndAlgHandler {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn handle(&self, incident: &Incident<'_>) -> Result<bool> {
        let Incident::EndAlg(alg) = incident else {
            return Err(unexpected(Self::NAME, incident));
        };
        let Some(timers) = self.timers.upgrade() else {
            return Ok(false);
        };

        let key = alg.obj_name();
        let mut timer = timers.algorithm(key)?;
        match timer.stop() {
            Ok(()) => self.logger.debug(format_args!(
                "The algorithm {key} took {}ms",
                timer.elapsed()
            )),
            Err(anomaly) => warn_anomaly(&self.logger, key, anomaly),
        }
        Ok(true)
    }
}
