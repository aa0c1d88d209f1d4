//! Task description parsing.
//!
//! A task is described by JSON of the form
//!
//! ```json
//! {
//!   "algorithms": [{ "identifier": "PkgA/AlgX", "properties": {} }],
//!   "services":   [{ "identifier": "AlgProfiling/profiling",
//!                    "properties": { "log_level": "debug" } }]
//! }
//! ```

use crate::error::{Error, Result};
use log::LevelFilter;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashSet;

pub const DEFAULT_DESCRIPTION: &str = "Profiles the execution time of every event and algorithm";

/// One configured algorithm or service
#[derive(Debug, Clone, Deserialize)]
pub struct ComponentEntry {
    pub identifier: String,
    #[serde(default)]
    pub properties: Map<String, Value>,
}

impl ComponentEntry {
    /// Object name: the component after the last `/`
    pub fn name(&self) -> &str {
        component_name(&self.identifier)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    pub algorithms: Vec<ComponentEntry>,
    #[serde(default)]
    pub services: Vec<ComponentEntry>,
}

impl TaskConfig {
    pub fn from_json(json: &Value) -> Result<Self> {
        if !json.get("algorithms").is_some_and(Value::is_array) {
            return Err(Error::Config(
                "task has no \"algorithms\" list".to_string(),
            ));
        }
        Self::deserialize(json).map_err(|e| Error::Config(e.to_string()))
    }

    /// Ordered, de-duplicated algorithm names
    pub fn algorithm_names(&self) -> Result<Vec<String>> {
        let mut seen = HashSet::new();
        let mut names = Vec::with_capacity(self.algorithms.len());
        for entry in &self.algorithms {
            let name = entry.name();
            if name.is_empty() {
                return Err(Error::Config(format!(
                    "algorithm identifier '{}' has an empty name",
                    entry.identifier
                )));
            }
            if !seen.insert(name) {
                return Err(Error::DuplicateAlgorithm {
                    name: name.to_string(),
                });
            }
            names.push(name.to_string());
        }
        Ok(names)
    }

    pub fn service(&self, name: &str) -> Option<&ComponentEntry> {
        self.services.iter().find(|entry| entry.name() == name)
    }
}

/// Strip everything up to and including the last `/`
pub fn component_name(identifier: &str) -> &str {
    identifier.rsplit('/').next().unwrap_or(identifier)
}

/// Settings of a profiling service
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ProfilingConfig {
    pub log_level: LevelFilter,
    pub description: String,
}

impl Default for ProfilingConfig {
    fn default() -> Self {
        ProfilingConfig {
            log_level: LevelFilter::Info,
            description: DEFAULT_DESCRIPTION.to_string(),
        }
    }
}

impl ProfilingConfig {
    /// Read the properties of the service entry named `service_name`.
    /// A task without such an entry yields the defaults.
    pub fn from_task(json: &Value, service_name: &str) -> Result<Self> {
        let Some(services) = json.get("services") else {
            return Ok(Self::default());
        };
        let services: Vec<ComponentEntry> = Vec::deserialize(services)
            .map_err(|e| Error::Config(format!("invalid \"services\" list: {e}")))?;

        match services.iter().find(|entry| entry.name() == service_name) {
            Some(entry) => Self::deserialize(Value::Object(entry.properties.clone())).map_err(
                |e| Error::Config(format!("invalid properties for {service_name}: {e}")),
            ),
            None => Ok(Self::default()),
        }
    }
}
