//! One account, one day: fetch, index, archive, summarize.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use super::fetch::{FetchContext, fetch_day};
use crate::archive::{archive_name, create_archive, create_digest};
use crate::config::{Account, ImapSettings};
use crate::error::ErrorKind;
use crate::index::Indexer;
use crate::mailbox::Connector;
use crate::report::{ErrorEntry, RunSummary};
use crate::retry::RetryPolicy;
use crate::storage::Storage;
use crate::{Error, Result};

/// Everything an account task owns, so it can run on its own task.
pub struct AccountJob {
    pub connector: Arc<dyn Connector>,
    pub storage: Storage,
    pub account: Account,
    pub date: NaiveDate,
    pub retry: RetryPolicy,
    pub imap: ImapSettings,
}

impl AccountJob {
    /// Runs every stage in order and returns the summary that was written.
    ///
    /// Stage failures are recorded in the summary; only directory creation
    /// stops the run early.
    pub async fn run(self) -> RunSummary {
        let mut summary = RunSummary::new(&self.account.username, self.date, Local::now());
        info!(account = %self.account.username, date = %self.date, "processing account");

        let day_dir = match self.storage.create_day(&self.account, self.date).await {
            Ok(dir) => dir,
            Err(e) => {
                error!(account = %self.account.username, error = %e, "cannot create day directory");
                summary.record(&e);
                let day_dir = self.storage.day_dir(&self.account.storage_name(), self.date);
                return finish(summary, &day_dir).await;
            }
        };

        let indexer = Mutex::new(Indexer::new());
        let ctx = FetchContext {
            connector: self.connector.as_ref(),
            account: &self.account,
            date: self.date,
            imap: &self.imap,
            day_dir: &day_dir,
        };
        for e in fetch_day(&ctx, &self.retry, &indexer).await {
            summary.record(&e);
        }

        let indexer = indexer.into_inner();
        summary.statistics = indexer.stats();

        let dir = day_dir.clone();
        let indexed = blocking(move || indexer.write_indexes(&dir), Error::Index);
        if let Err(e) = indexed.await {
            error!(account = %self.account.username, error = %e, "indexing failed");
            summary.record(&e);
        }

        let name = archive_name(&self.account.storage_name(), self.date);
        let archive_path = day_dir.join(&name);
        archive_day(&mut summary, day_dir.clone(), archive_path, name).await;

        finish(summary, &day_dir).await
    }
}

/// Builds the container and its digest. Failures are recorded, never raised.
async fn archive_day(
    summary: &mut RunSummary,
    day_dir: PathBuf,
    archive_path: PathBuf,
    name: String,
) {
    let path = archive_path.clone();
    let size = match blocking(move || create_archive(&day_dir, &path), Error::Compression).await {
        Ok(size) => size,
        Err(e) => {
            error!(account = %summary.account, error = %e, "archive creation failed");
            summary.record(&e);
            return;
        }
    };

    let digest = match blocking(move || create_digest(&archive_path), Error::Compression).await {
        Ok(digest) => Some(digest),
        Err(e) => {
            error!(account = %summary.account, error = %e, "digest creation failed");
            summary.record(&e);
            None
        }
    };
    summary.set_archive(name, size, digest);
}

/// Stamps the end time, writes `summary.json` and logs the outcome.
pub async fn finish(mut summary: RunSummary, day_dir: &Path) -> RunSummary {
    summary.finish(Local::now());

    let to_write = summary.clone();
    let dir = day_dir.to_path_buf();
    let written = blocking(move || to_write.write(&dir), |m| {
        Error::Io(std::io::Error::other(m))
    });
    if let Err(e) = written.await {
        error!(account = %summary.account, error = %e, "cannot write summary");
    }

    for line in summary.log_lines() {
        info!("{line}");
    }
    summary
}

/// Summary for an account whose task died unexpectedly.
pub async fn orchestration_failure(
    storage: &Storage,
    account: &Account,
    date: NaiveDate,
    message: String,
) -> RunSummary {
    let mut summary = RunSummary::new(&account.username, date, Local::now());
    summary.push_error(ErrorEntry::new(ErrorKind::Orchestration, message));

    let day_dir = storage.day_dir(&account.storage_name(), date);
    if !day_dir.is_dir() {
        warn!(account = %account.username, "no day directory for failure summary");
        summary.finish(Local::now());
        return summary;
    }
    finish(summary, &day_dir).await
}

/// Runs filesystem-heavy work off the async workers. A panic in `work`
/// becomes the error built by `on_panic`.
async fn blocking<T, F>(work: F, on_panic: fn(String) -> Error) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .unwrap_or_else(|e| Err(on_panic(format!("background task failed: {e}"))))
}
