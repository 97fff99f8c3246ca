//! Per-account run summaries and the aggregate report.
//!
//! `summary.json` field names are read by other tools, so the serialized
//! shape of [`RunSummary`] must stay stable.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, ErrorKind, Result};
use crate::index::IndexStats;
use crate::storage::{INDEX_CSV, INDEX_JSON, SUMMARY_FILE};

/// Outcome of one account for one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// No errors were recorded.
    Success,
    /// At least one error was recorded.
    CompletedWithErrors,
}

impl RunStatus {
    /// Serialized form.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::CompletedWithErrors => "completed_with_errors",
        }
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A recorded failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorEntry {
    /// Failure category.
    #[serde(rename = "type")]
    pub kind: ErrorKind,
    /// Folder involved, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub folder: Option<String>,
    /// Message UID involved, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<u32>,
    /// Human-readable description.
    pub message: String,
    /// When the failure was recorded.
    pub timestamp: DateTime<Local>,
}

impl ErrorEntry {
    /// Creates an entry stamped with the current time.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            folder: None,
            uid: None,
            message: message.into(),
            timestamp: Local::now(),
        }
    }

    /// Creates an entry from a core error, keeping its folder and UID.
    #[must_use]
    pub fn from_error(error: &Error) -> Self {
        Self {
            folder: error.folder().map(str::to_string),
            uid: error.uid(),
            ..Self::new(error.kind(), error.to_string())
        }
    }

    /// Sets the folder.
    #[must_use]
    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = Some(folder.into());
        self
    }
}

/// File names produced for the day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryFiles {
    /// CSV index.
    pub index_csv: String,
    /// JSON index.
    pub index_json: String,
    /// Container, when it was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive: Option<String>,
    /// Digest file, when it was written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
}

impl Default for SummaryFiles {
    fn default() -> Self {
        Self {
            index_csv: INDEX_CSV.to_string(),
            index_json: INDEX_JSON.to_string(),
            archive: None,
            digest: None,
        }
    }
}

/// Container details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveInfo {
    /// Container file name.
    pub filename: String,
    /// Container size in bytes.
    pub size_bytes: u64,
    /// Hex SHA-256, when the digest was written.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

/// Wall-clock timing of the account run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Processing {
    /// When processing started.
    pub start_time: DateTime<Local>,
    /// When processing ended.
    pub end_time: DateTime<Local>,
    /// `end_time - start_time`.
    pub duration_seconds: f64,
}

/// Contents of `summary.json`.
///
/// The status is derived from the recorded errors and cannot disagree with
/// them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Account login name.
    pub account: String,
    /// Archived day.
    pub date: NaiveDate,
    /// When the summary was produced.
    pub generated_at: DateTime<Local>,
    status: RunStatus,
    /// Index totals.
    pub statistics: IndexStats,
    /// Produced files.
    pub files: SummaryFiles,
    /// Container details, when one was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive: Option<ArchiveInfo>,
    /// Timing.
    pub processing: Processing,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    errors: Vec<ErrorEntry>,
    #[serde(default, skip_serializing_if = "is_zero")]
    error_count: usize,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
const fn is_zero(n: &usize) -> bool {
    *n == 0
}

impl RunSummary {
    /// Starts a summary for a run that began at `start_time`.
    #[must_use]
    pub fn new(account: impl Into<String>, date: NaiveDate, start_time: DateTime<Local>) -> Self {
        Self {
            account: account.into(),
            date,
            generated_at: start_time,
            status: RunStatus::Success,
            statistics: IndexStats::default(),
            files: SummaryFiles::default(),
            archive: None,
            processing: Processing {
                start_time,
                end_time: start_time,
                duration_seconds: 0.0,
            },
            errors: Vec::new(),
            error_count: 0,
        }
    }

    /// Outcome of the run.
    #[must_use]
    pub const fn status(&self) -> RunStatus {
        self.status
    }

    /// Recorded errors, in order.
    #[must_use]
    pub fn errors(&self) -> &[ErrorEntry] {
        &self.errors
    }

    /// Number of recorded errors.
    #[must_use]
    pub const fn error_count(&self) -> usize {
        self.error_count
    }

    /// Whether any error was recorded.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Records an error.
    pub fn push_error(&mut self, entry: ErrorEntry) {
        self.errors.push(entry);
        self.error_count = self.errors.len();
        self.status = RunStatus::CompletedWithErrors;
    }

    /// Records a core error.
    pub fn record(&mut self, error: &Error) {
        self.push_error(ErrorEntry::from_error(error));
    }

    /// Records the container and, when present, its digest.
    pub fn set_archive(&mut self, filename: String, size_bytes: u64, sha256: Option<String>) {
        self.files.archive = Some(filename.clone());
        if sha256.is_some() {
            self.files.digest = Some(crate::storage::DIGEST_FILE.to_string());
        }
        self.archive = Some(ArchiveInfo {
            filename,
            size_bytes,
            sha256,
        });
    }

    /// Stamps the end of processing.
    pub fn finish(&mut self, end_time: DateTime<Local>) {
        let elapsed = (end_time - self.processing.start_time).num_milliseconds();
        self.processing.end_time = end_time;
        #[allow(clippy::cast_precision_loss)]
        let seconds = elapsed.max(0) as f64 / 1000.0;
        self.processing.duration_seconds = seconds;
        self.generated_at = end_time;
    }

    /// Writes `summary.json` into `day_dir` and returns its path.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn write(&self, day_dir: &Path) -> Result<PathBuf> {
        let path = day_dir.join(SUMMARY_FILE);
        let mut json = serde_json::to_vec_pretty(self)?;
        json.push(b'\n');
        std::fs::write(&path, json).map_err(|e| Error::storage(&path, e))?;
        debug!(path = %path.display(), status = %self.status, "summary written");
        Ok(path)
    }

    /// Reads a `summary.json`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| Error::storage(path, e))?;
        let mut summary: Self = serde_json::from_slice(&bytes)?;
        summary.error_count = summary.errors.len();
        summary.status = if summary.errors.is_empty() {
            RunStatus::Success
        } else {
            RunStatus::CompletedWithErrors
        };
        Ok(summary)
    }

    /// Multi-line digest for the log.
    #[must_use]
    pub fn log_lines(&self) -> Vec<String> {
        let mut lines = vec![
            format!("Account: {}", self.account),
            format!("Date: {}", self.date),
            format!("Status: {}", self.status),
            format!("Messages: {}", self.statistics.total_messages),
        ];
        for (folder, count) in &self.statistics.folders {
            lines.push(format!("  - {folder}: {count}"));
        }
        if let Some(archive) = &self.archive {
            #[allow(clippy::cast_precision_loss)]
            let megabytes = archive.size_bytes as f64 / (1024.0 * 1024.0);
            lines.push(format!("Archive: {} ({megabytes:.2} MB)", archive.filename));
        }
        if self.has_errors() {
            lines.push(format!("Errors: {}", self.error_count));
        }
        lines
    }
}

/// One line of the aggregate report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountOutcome {
    /// Account login name.
    pub account: String,
    /// Outcome.
    pub status: RunStatus,
    /// Messages archived.
    pub messages: u64,
}

/// Roll-up of every account processed in a run.
///
/// Handed to notification or monitoring code; nothing here is persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateReport {
    /// When the report was built.
    pub generated_at: DateTime<Local>,
    /// Accounts with a summary.
    pub accounts_processed: usize,
    /// Accounts without errors.
    pub accounts_successful: usize,
    /// Accounts with at least one error.
    pub accounts_with_errors: usize,
    /// Messages over all accounts.
    pub total_messages: u64,
    /// Bytes over all accounts.
    pub total_size_bytes: u64,
    /// Errors over all accounts.
    pub total_errors: usize,
    /// Per-account lines.
    pub accounts: Vec<AccountOutcome>,
}

impl AggregateReport {
    /// Builds the report from in-memory summaries.
    #[must_use]
    pub fn from_summaries<'a>(summaries: impl IntoIterator<Item = &'a RunSummary>) -> Self {
        let mut report = Self {
            generated_at: Local::now(),
            accounts_processed: 0,
            accounts_successful: 0,
            accounts_with_errors: 0,
            total_messages: 0,
            total_size_bytes: 0,
            total_errors: 0,
            accounts: Vec::new(),
        };

        for summary in summaries {
            report.accounts_processed += 1;
            match summary.status() {
                RunStatus::Success => report.accounts_successful += 1,
                RunStatus::CompletedWithErrors => report.accounts_with_errors += 1,
            }
            report.total_messages += summary.statistics.total_messages;
            report.total_size_bytes += summary.statistics.total_size_bytes;
            report.total_errors += summary.error_count();
            report.accounts.push(AccountOutcome {
                account: summary.account.clone(),
                status: summary.status(),
                messages: summary.statistics.total_messages,
            });
        }

        report
    }

    /// Builds the report from `summary.json` files. Unreadable files are
    /// logged and skipped.
    #[must_use]
    pub fn from_files<P: AsRef<Path>>(paths: &[P]) -> Self {
        let summaries: Vec<RunSummary> = paths
            .iter()
            .filter_map(|path| {
                let path = path.as_ref();
                RunSummary::read(path)
                    .inspect_err(|e| {
                        warn!(path = %path.display(), error = %e, "failed to read summary");
                    })
                    .ok()
            })
            .collect();
        Self::from_summaries(&summaries)
    }

    /// Whether any account recorded an error.
    #[must_use]
    pub const fn has_errors(&self) -> bool {
        self.accounts_with_errors > 0
    }
}
