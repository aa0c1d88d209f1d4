use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid task configuration: {0}")]
    Config(String),

    #[error("Algorithm name '{name}' is configured more than once")]
    DuplicateAlgorithm { name: String },

    #[error("Unknown algorithm identifier: {0}")]
    UnknownAlgorithm(String),

    #[error("Handler {handler} is already registered on channel {channel}")]
    AlreadyRegistered { channel: String, handler: String },

    #[error("Handler {handler} is not registered on channel {channel}")]
    NotRegistered { channel: String, handler: String },

    #[error("Handler {handler} received an incident from channel {channel}")]
    UnexpectedIncident {
        handler: &'static str,
        channel: &'static str,
    },

    #[error("Service {service} is {actual}, expected {expected}")]
    InvalidState {
        service: String,
        actual: &'static str,
        expected: &'static str,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Misuse of a timer's start/stop pairing. Never fatal.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerAnomaly {
    #[error("started while already running, restarting the interval")]
    AlreadyRunning,

    #[error("stopped without a matching start, ignoring")]
    NotRunning,
}
