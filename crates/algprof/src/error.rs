use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Task file not found: {0}")]
    TaskNotFound(String),

    #[error("Invalid cost '{value}' for algorithm {algorithm}. Examples: 250us, 3ms, 1s")]
    InvalidCost { algorithm: String, value: String },

    #[error(transparent)]
    Profiling(#[from] algprof_trace::Error),

    #[error("Signal handler error: {0}")]
    Signal(#[from] ctrlc::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, Error>;

pub mod exit_code {
    pub const SUCCESS: i32 = 0;
    pub const GENERAL_ERROR: i32 = 1;
    pub const INVALID_ARGUMENTS: i32 = 2;
    pub const TASK_NOT_FOUND: i32 = 3;
    pub const INVALID_TASK: i32 = 4;
    pub const PIPELINE_ERROR: i32 = 5;
}

impl Error {
    pub fn exit_code(&self) -> i32 {
        use algprof_trace::Error as Profiling;

        match self {
            Error::TaskNotFound(_) => exit_code::TASK_NOT_FOUND,
            Error::InvalidArgument(_) => exit_code::INVALID_ARGUMENTS,
            Error::InvalidCost { .. }
            | Error::Json(_)
            | Error::Profiling(
                Profiling::Config(_) | Profiling::DuplicateAlgorithm { .. } | Profiling::Json(_),
            ) => exit_code::INVALID_TASK,
            Error::Profiling(Profiling::UnknownAlgorithm(_) | Profiling::UnexpectedIncident { .. }) => {
                exit_code::PIPELINE_ERROR
            }
            _ => exit_code::GENERAL_ERROR,
        }
    }
}

/// Exit code for an error surfaced from `main`, looking through any context
pub fn exit_code_of(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<Error>()
        .map(Error::exit_code)
        .unwrap_or(exit_code::GENERAL_ERROR)
}
