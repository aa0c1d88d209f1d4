pub mod cli;
pub mod commands;
pub mod error;

pub use error::{Error, Result};
