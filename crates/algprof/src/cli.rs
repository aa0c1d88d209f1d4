use clap::{Parser, Subcommand};
use log::LevelFilter;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "algprof")]
#[command(about = "Event and algorithm timing for incident-driven pipelines")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the algorithms a task description would be profiled for
    Check {
        /// Task description (JSON)
        task: PathBuf,
    },

    /// Drive a simulated pipeline through the profiling service and print its report
    Simulate {
        /// Task description (JSON)
        task: PathBuf,

        /// Task name shown in the report (default: file stem)
        #[arg(long)]
        name: Option<String>,

        /// Name of the profiling service, matched against the task's "services"
        #[arg(long, default_value = "profiling")]
        service: String,

        /// Number of events to run (default: 10 unless --duration is given)
        #[arg(long, short = 'n')]
        events: Option<u64>,

        /// Cost of algorithms without a "cost" property
        #[arg(long, default_value = "1ms", value_parser = parse_duration)]
        cost: Duration,

        /// Stop after this much wall time
        #[arg(long, short = 'd', value_parser = parse_duration)]
        duration: Option<Duration>,

        /// Override the service log level (off, error, warn, info, debug, trace)
        #[arg(long, short = 'l')]
        log_level: Option<LevelFilter>,

        /// Also print the report as JSON on stdout
        #[arg(long)]
        json: bool,

        /// Write log output and the report to this file instead of stderr
        #[arg(long, short = 'o', conflicts_with = "save")]
        output: Option<PathBuf>,

        /// Write log output to algprof.<task>.<timestamp>.log
        #[arg(long)]
        save: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        shell: clap_complete::Shell,
    },
}

pub(crate) fn parse_duration(s: &str) -> Result<Duration, String> {
    if let Ok(d) = humantime::parse_duration(s) {
        return Ok(d);
    }

    // Bare number as milliseconds
    if let Ok(ms) = s.parse::<u64>() {
        return Ok(Duration::from_millis(ms));
    }

    Err(format!(
        "Invalid duration '{}'. Examples: 250us, 3ms, 2s, 1m30s, 15",
        s
    ))
}

impl Cli {
    pub fn validate(&self) -> Result<(), String> {
        if let Command::Simulate {
            events, duration, ..
        } = &self.command
        {
            if *events == Some(0) {
                return Err("--events must be at least 1".to_string());
            }
            if duration.is_some_and(|d| d.is_zero()) {
                return Err("--duration must be greater than zero".to_string());
            }
        }

        Ok(())
    }
}
