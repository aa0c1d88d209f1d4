//! Incident dispatch boundary.
//!
//! The hosting pipeline raises incidents at fixed lifecycle points; handlers
//! subscribe to a named channel and are invoked synchronously, in registration
//! order, on the thread that fires the incident.

use crate::error::{Error, Result};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

pub const BEGIN_EVENT: &str = "BeginEvent";
pub const END_EVENT: &str = "EndEvent";
pub const BEGIN_ALG: &str = "BeginAlg";
pub const END_ALG: &str = "EndAlg";

/// The view of an algorithm instance carried by algorithm incidents
pub trait AlgBase: Send + Sync {
    /// Configured object name, the key used for per-algorithm statistics
    fn obj_name(&self) -> &str;
}

/// A lifecycle signal raised by the pipeline
#[derive(Clone, Copy)]
pub enum Incident<'a> {
    BeginEvent,
    EndEvent,
    BeginAlg(&'a dyn AlgBase),
    EndAlg(&'a dyn AlgBase),
}

impl Incident<'_> {
    /// Channel this incident is delivered on
    pub fn channel(&self) -> &'static str {
        match self {
            Incident::BeginEvent => BEGIN_EVENT,
            Incident::EndEvent => END_EVENT,
            Incident::BeginAlg(_) => BEGIN_ALG,
            Incident::EndAlg(_) => END_ALG,
        }
    }
}

impl fmt::Debug for Incident<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Incident::BeginEvent | Incident::EndEvent => f.write_str(self.channel()),
            Incident::BeginAlg(alg) | Incident::EndAlg(alg) => {
                write!(f, "{}({})", self.channel(), alg.obj_name())
            }
        }
    }
}

pub trait IncidentHandler: Send + Sync + fmt::Debug {
    /// Diagnostic name
    fn name(&self) -> &str;

    /// Returns whether the incident was handled
    fn handle(&self, incident: &Incident<'_>) -> Result<bool>;
}

/// Subscription interface of a dispatcher. Every `register` must be paired
/// with exactly one `unregister` of the same handler on the same channel.
pub trait IncidentRegistry: Send + Sync {
    fn register(&self, channel: &str, handler: Arc<dyn IncidentHandler>) -> Result<()>;

    fn unregister(&self, channel: &str, handler: &Arc<dyn IncidentHandler>) -> Result<()>;
}

/// In-process dispatcher keyed by channel name
#[derive(Debug, Default)]
pub struct IncidentBus {
    channels: RwLock<HashMap<String, Vec<Arc<dyn IncidentHandler>>>>,
}

impl IncidentBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deliver an incident to every handler on its channel.
    ///
    /// Returns true if at least one handler reported it as handled. The first
    /// handler error stops delivery and is returned.
    pub fn fire(&self, incident: &Incident<'_>) -> Result<bool> {
        // Snapshot so handlers may (un)register without deadlocking
        let handlers = {
            let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
            match channels.get(incident.channel()) {
                Some(handlers) => handlers.clone(),
                None => return Ok(false),
            }
        };

        let mut handled = false;
        for handler in &handlers {
            handled |= handler.handle(incident)?;
        }
        Ok(handled)
    }

    pub fn handler_count(&self, channel: &str) -> usize {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        channels.get(channel).map_or(0, Vec::len)
    }

    /// Names of channels with at least one handler, sorted
    pub fn channels(&self) -> Vec<String> {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);
        let mut names: Vec<String> = channels.keys().cloned().collect();
        names.sort();
        names
    }
}

impl IncidentRegistry for IncidentBus {
    fn register(&self, channel: &str, handler: Arc<dyn IncidentHandler>) -> Result<()> {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        let handlers = channels.entry(channel.to_string()).or_default();
        if handlers.iter().any(|h| Arc::ptr_eq(h, &handler)) {
            return Err(Error::AlreadyRegistered {
                channel: channel.to_string(),
                handler: handler.name().to_string(),
            });
        }
        handlers.push(handler);
        Ok(())
    }

    fn unregister(&self, channel: &str, handler: &Arc<dyn IncidentHandler>) -> Result<()> {
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        let not_registered = || Error::NotRegistered {
            channel: channel.to_string(),
            handler: handler.name().to_string(),
        };

        let handlers = channels.get_mut(channel).ok_or_else(not_registered)?;
        let idx = handlers
            .iter()
            .position(|h| Arc::ptr_eq(h, handler))
            .ok_or_else(not_registered)?;
        handlers.remove(idx);

        if handlers.is_empty() {
            channels.remove(channel);
        }
        Ok(())
    }
}
