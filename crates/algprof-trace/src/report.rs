//! Fixed-width timing report.

use crate::timer::StatTimer;
use serde::Serialize;
use std::fmt;

const NAME_WIDTH: usize = 25;
const COUNT_WIDTH: usize = 12;
const TOTAL_WIDTH: usize = 15;
const MEAN_WIDTH: usize = 13;
const RMS_WIDTH: usize = 13;
const PRECISION: usize = 5;
const BORDER_WIDTH: usize = 77;
const TITLE_PAD: usize = 30;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportRow {
    pub name: String,
    pub count: u64,
    pub total_ms: f64,
    pub mean_ms: f64,
    pub rms_ms: f64,
}

impl ReportRow {
    pub fn from_timer(name: impl Into<String>, timer: &StatTimer) -> Self {
        ReportRow {
            name: name.into(),
            count: timer.number_of_measurements(),
            total_ms: timer.total(),
            mean_ms: timer.mean(),
            rms_ms: timer.rms(),
        }
    }
}

impl fmt::Display for ReportRow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<NAME_WIDTH$}{:<COUNT_WIDTH$}{:<TOTAL_WIDTH$.PRECISION$}{:<MEAN_WIDTH$.PRECISION$}{:<RMS_WIDTH$.PRECISION$}",
            self.name, self.count, self.total_ms, self.mean_ms, self.rms_ms
        )
    }
}

/// Per-algorithm rows in configuration order plus the event summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub service: String,
    pub unit: String,
    pub algorithms: Vec<ReportRow>,
    pub events: ReportRow,
}

impl Report {
    /// Name shown on the event summary row
    pub fn summary_name(unit: &str) -> String {
        format!("Sum of {unit}")
    }

    pub fn algorithm(&self, name: &str) -> Option<&ReportRow> {
        self.algorithms.iter().find(|row| row.name == name)
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pad = "#".repeat(TITLE_PAD);
        writeln!(f, "{pad} {} {pad}", self.service)?;
        writeln!(
            f,
            "{:<NAME_WIDTH$}{:<COUNT_WIDTH$}{:<TOTAL_WIDTH$}{:<MEAN_WIDTH$}{:<RMS_WIDTH$}",
            "Name", "Count", "Total(ms)", "Mean(ms)", "RMS(ms)"
        )?;
        for row in &self.algorithms {
            writeln!(f, "{row}")?;
        }
        writeln!(f, "{}", self.events)?;
        writeln!(f, "{}", "#".repeat(BORDER_WIDTH))
    }
}
