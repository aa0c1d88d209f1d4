//! Execution units that own services.

use crate::error::Result;
use crate::incident::{Incident, IncidentBus, IncidentRegistry};
use serde_json::Value;
use std::path::Path;

/// The owner of a profiling service: provides the task description, the
/// incident registry handlers subscribe to, and the name used in reports.
pub trait ExecUnit: Send + Sync {
    fn obj_name(&self) -> &str;

    /// Task description JSON
    fn json(&self) -> &Value;

    fn registry(&self) -> &dyn IncidentRegistry;
}

/// A task: named execution unit with its own incident bus
#[derive(Debug)]
pub struct Task {
    name: String,
    json: Value,
    bus: IncidentBus,
}

impl Task {
    pub fn new(name: impl Into<String>, json: Value) -> Self {
        Task {
            name: name.into(),
            json,
            bus: IncidentBus::new(),
        }
    }

    pub fn from_json_str(name: impl Into<String>, json: &str) -> Result<Self> {
        Ok(Self::new(name, serde_json::from_str(json)?))
    }

    pub fn from_file(name: impl Into<String>, path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(name, &content)
    }

    pub fn bus(&self) -> &IncidentBus {
        &self.bus
    }

    pub fn fire(&self, incident: &Incident<'_>) -> Result<bool> {
        self.bus.fire(incident)
    }
}

impl ExecUnit for Task {
    fn obj_name(&self) -> &str {
        &self.name
    }

    fn json(&self) -> &Value {
        &self.json
    }

    fn registry(&self) -> &dyn IncidentRegistry {
        &self.bus
    }
}
