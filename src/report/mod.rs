//! Result recorder.
//!
//! Keeps one [`MetricsRecord`] per converted file and one [`FailureRecord`]
//! per failed file, in the order jobs finished, and renders them as the
//! cumulative plain-text report.

use crate::state::FileJob;
use autocompress_av::ConversionResult;
use autocompress_common::paths::file_name;
use autocompress_common::units::{compression_ratio, format_duration, format_size};
use chrono::{DateTime, Local};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

const SEPARATOR_WIDTH: usize = 100;

/// Accounting entry for one successfully converted file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsRecord {
    pub original_name: String,
    pub original_size: u64,
    pub output_name: String,
    pub output_size: u64,
    /// Original size divided by output size, rounded to two decimals.
    pub compression_ratio: f64,
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub duration: Duration,
}

impl fmt::Display for MetricsRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Original file name: {}", self.original_name)?;
        writeln!(f, "Original file size: {}", format_size(self.original_size))?;
        writeln!(f, "New file name: {}", self.output_name)?;
        writeln!(f, "New file size: {}", format_size(self.output_size))?;
        writeln!(f, "Compression ratio: {:.2}", self.compression_ratio)?;
        writeln!(f, "Processing started: {}", self.started_at.format("%H:%M:%S"))?;
        writeln!(f, "Processing finished: {}", self.finished_at.format("%H:%M:%S"))?;
        writeln!(f, "Processing time: {}", format_duration(self.duration))
    }
}

/// Pipeline stage a job failed in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailureKind {
    Stabilization,
    Conversion,
    Finalization,
    Cancelled,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Stabilization => "stabilization",
            FailureKind::Conversion => "conversion",
            FailureKind::Finalization => "finalization",
            FailureKind::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Accounting entry for a file that did not make it through.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub original_name: String,
    pub source: PathBuf,
    pub kind: FailureKind,
    pub message: String,
    pub failed_at: DateTime<Local>,
}

impl fmt::Display for FailureRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "File name: {}", self.original_name)?;
        writeln!(f, "Failed during: {}", self.kind)?;
        writeln!(f, "Reason: {}", self.message)?;
        writeln!(f, "Time: {}", self.failed_at.format("%H:%M:%S"))?;
        writeln!(f, "Source kept at: {}", self.source.display())
    }
}

#[derive(Serialize)]
struct JsonReport<'a> {
    output_dir: &'a Path,
    completed: &'a [MetricsRecord],
    failed: &'a [FailureRecord],
}

/// Append-only store of job outcomes.
#[derive(Debug)]
pub struct ResultRecorder {
    output_dir: PathBuf,
    records: RwLock<Vec<MetricsRecord>>,
    failures: RwLock<Vec<FailureRecord>>,
}

impl ResultRecorder {
    pub fn new(output_dir: PathBuf) -> Self {
        Self {
            output_dir,
            records: RwLock::new(Vec::new()),
            failures: RwLock::new(Vec::new()),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Append the metrics of a finished job.
    ///
    /// `original_size` is the stable size observed before conversion, since
    /// the source is gone by the time the job is recorded.
    pub fn record(
        &self,
        job: &FileJob,
        result: &ConversionResult,
        original_size: u64,
        output_size: u64,
    ) -> MetricsRecord {
        let output_name = job
            .output
            .as_deref()
            .map(file_name)
            .unwrap_or_default();

        let record = MetricsRecord {
            original_name: job.file_name.clone(),
            original_size,
            output_name,
            output_size,
            compression_ratio: compression_ratio(original_size, output_size).unwrap_or(0.0),
            started_at: result.started_at(),
            finished_at: result.finished_at(),
            duration: result.elapsed(),
        };

        self.records.write().push(record.clone());
        record
    }

    /// Append a failure.
    pub fn record_failure(
        &self,
        job: &FileJob,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> FailureRecord {
        let failure = FailureRecord {
            original_name: job.file_name.clone(),
            source: job.source.clone(),
            kind,
            message: message.into(),
            failed_at: Local::now(),
        };

        self.failures.write().push(failure.clone());
        failure
    }

    pub fn records(&self) -> Vec<MetricsRecord> {
        self.records.read().clone()
    }

    pub fn failures(&self) -> Vec<FailureRecord> {
        self.failures.read().clone()
    }

    pub fn completed_count(&self) -> usize {
        self.records.read().len()
    }

    pub fn failed_count(&self) -> usize {
        self.failures.read().len()
    }

    /// Render every outcome collected so far.
    pub fn render_report(&self) -> String {
        let records = self.records.read();
        let failures = self.failures.read();
        render(&self.output_dir, &records, &failures)
    }

    /// Export every outcome collected so far as pretty JSON.
    pub fn to_json(&self) -> serde_json::Result<String> {
        let records = self.records.read();
        let failures = self.failures.read();
        serde_json::to_string_pretty(&JsonReport {
            output_dir: &self.output_dir,
            completed: &records,
            failed: &failures,
        })
    }
}

fn render(output_dir: &Path, records: &[MetricsRecord], failures: &[FailureRecord]) -> String {
    let separator = "-".repeat(SEPARATOR_WIDTH);
    let mut out = String::new();

    out.push_str(&format!("Processed files: {}\n", records.len()));
    out.push_str(&format!("Output folder: {}\n", output_dir.display()));
    out.push_str(&separator);
    out.push('\n');

    for (number, record) in records.iter().enumerate() {
        out.push_str(&format!("File {}:\n\n{}", number + 1, record));
        out.push_str(&separator);
        out.push('\n');
    }

    if !failures.is_empty() {
        out.push_str(&format!("Failed files: {}\n", failures.len()));
        out.push_str(&separator);
        out.push('\n');

        for (number, failure) in failures.iter().enumerate() {
            out.push_str(&format!("Failed {}:\n\n{}", number + 1, failure));
            out.push_str(&separator);
            out.push('\n');
        }
    }

    out
}
