//! Runs every account for a day on a bounded pool of workers.
//!
//! Each worker takes the next account from a shared queue and runs it to
//! completion on its own task before taking another. A panicking account
//! task is turned into an `orchestration` error for that account only; the
//! run itself never fails, and its outcome is read from the returned
//! [`AggregateReport`].

mod fetch;
mod worker;

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{Local, NaiveDate};
use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::config::{Account, Config, ImapSettings};
use crate::mailbox::{Connector, ImapConnector};
use crate::report::{AggregateReport, RunSummary};
use crate::retry::RetryPolicy;
use crate::storage::Storage;
use crate::{Error, Result};

use worker::{AccountJob, orchestration_failure};

/// Archives all configured accounts.
pub struct Orchestrator {
    connector: Arc<dyn Connector>,
    storage: Storage,
    accounts: Vec<Account>,
    workers: usize,
    retry: RetryPolicy,
    imap: ImapSettings,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("root", &self.storage.root())
            .field("accounts", &self.accounts.len())
            .field("workers", &self.workers)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator that talks to real IMAP servers.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self::with_connector(config, Arc::new(ImapConnector))
    }

    /// Creates an orchestrator with a custom mailbox connector.
    #[must_use]
    pub fn with_connector(config: &Config, connector: Arc<dyn Connector>) -> Self {
        Self::from_parts(
            connector,
            config.base_path.clone(),
            config.accounts.clone(),
            config.concurrency,
            config.retry_policy.clone(),
            config.imap.clone(),
        )
    }

    /// Creates an orchestrator from individual settings. A `concurrency`
    /// below 1 runs one account at a time.
    #[must_use]
    pub fn from_parts(
        connector: Arc<dyn Connector>,
        base_path: impl Into<PathBuf>,
        accounts: Vec<Account>,
        concurrency: i64,
        retry: RetryPolicy,
        imap: ImapSettings,
    ) -> Self {
        Self {
            connector,
            storage: Storage::new(base_path),
            accounts,
            workers: usize::try_from(concurrency.max(1)).unwrap_or(1),
            retry,
            imap,
        }
    }

    /// Configured accounts.
    #[must_use]
    pub fn accounts(&self) -> &[Account] {
        &self.accounts
    }

    /// Archives `date` for every account and aggregates the summaries.
    ///
    /// Every account yields exactly one summary, whatever fails. The order
    /// of accounts in the report follows completion and is not stable.
    pub async fn run_for_date(&self, date: NaiveDate) -> AggregateReport {
        info!(
            date = %date,
            accounts = self.accounts.len(),
            workers = self.workers,
            "starting archive run"
        );

        let queue = Arc::new(Mutex::new(
            self.accounts.iter().cloned().collect::<VecDeque<_>>(),
        ));
        let mut pool = JoinSet::new();
        for _ in 0..self.workers.min(self.accounts.len()) {
            let queue = Arc::clone(&queue);
            let connector = Arc::clone(&self.connector);
            let storage = self.storage.clone();
            let retry = self.retry.clone();
            let imap = self.imap.clone();

            pool.spawn(async move {
                let mut summaries = Vec::new();
                while let Some(account) = next_account(&queue) {
                    let job = AccountJob {
                        connector: Arc::clone(&connector),
                        storage: storage.clone(),
                        account: account.clone(),
                        date,
                        retry: retry.clone(),
                        imap: imap.clone(),
                    };
                    let summary = match tokio::spawn(job.run()).await {
                        Ok(summary) => summary,
                        Err(e) => {
                            error!(account = %account.username, error = %e, "account task failed");
                            let message = format!("account task failed: {e}");
                            orchestration_failure(&storage, &account, date, message).await
                        }
                    };
                    summaries.push(summary);
                }
                summaries
            });
        }

        let mut summaries: Vec<RunSummary> = Vec::with_capacity(self.accounts.len());
        while let Some(joined) = pool.join_next().await {
            match joined {
                Ok(batch) => summaries.extend(batch),
                Err(e) => error!(error = %e, "worker failed"),
            }
        }

        let report = AggregateReport::from_summaries(&summaries);
        info!(
            date = %date,
            successful = report.accounts_successful,
            processed = report.accounts_processed,
            messages = report.total_messages,
            "archive run completed"
        );
        report
    }

    /// Archives every day from `from` to `to` inclusive, one day at a time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `from` is after `to` or `to` is in the
    /// future.
    pub async fn run_for_range(&self, from: NaiveDate, to: NaiveDate) -> Result<RangeReport> {
        validate_range(from, to, Local::now().date_naive())?;
        info!(from = %from, to = %to, "starting range backfill");

        let mut range = RangeReport::new(from, to);
        for date in from.iter_days().take_while(|d| *d <= to) {
            let report = self.run_for_date(date).await;
            range.add(date, report);
        }

        for line in range.log_lines() {
            info!("{line}");
        }
        Ok(range)
    }
}

fn next_account(queue: &Mutex<VecDeque<Account>>) -> Option<Account> {
    queue
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .pop_front()
}

/// Checks a backfill range against `today`.
///
/// # Errors
///
/// Returns [`Error::Config`] if `from > to` or `to > today`.
pub fn validate_range(from: NaiveDate, to: NaiveDate, today: NaiveDate) -> Result<()> {
    if from > to {
        return Err(Error::Config(format!(
            "start date ({from}) must be before or equal to end date ({to})"
        )));
    }
    if to > today {
        return Err(Error::Config(format!("end date ({to}) cannot be in the future")));
    }
    Ok(())
}

/// Report of one day inside a range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DayReport {
    /// Archived day.
    pub date: NaiveDate,
    /// That day's aggregate.
    pub report: AggregateReport,
}

/// Totals of a multi-day backfill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RangeReport {
    /// First day.
    pub date_from: NaiveDate,
    /// Last day.
    pub date_to: NaiveDate,
    /// Days run.
    pub dates_processed: usize,
    /// Days where every account succeeded.
    pub dates_successful: usize,
    /// Days with at least one failing account.
    pub dates_with_errors: usize,
    /// Account runs over all days.
    pub total_accounts_processed: usize,
    /// Successful account runs over all days.
    pub total_accounts_successful: usize,
    /// Messages over all days.
    pub total_messages: u64,
    /// Errors over all days.
    pub total_errors: usize,
    /// Per-day reports, in date order.
    pub days: Vec<DayReport>,
}

impl RangeReport {
    fn new(date_from: NaiveDate, date_to: NaiveDate) -> Self {
        Self {
            date_from,
            date_to,
            dates_processed: 0,
            dates_successful: 0,
            dates_with_errors: 0,
            total_accounts_processed: 0,
            total_accounts_successful: 0,
            total_messages: 0,
            total_errors: 0,
            days: Vec::new(),
        }
    }

    fn add(&mut self, date: NaiveDate, report: AggregateReport) {
        self.dates_processed += 1;
        if report.has_errors() {
            self.dates_with_errors += 1;
        } else {
            self.dates_successful += 1;
        }
        self.total_accounts_processed += report.accounts_processed;
        self.total_accounts_successful += report.accounts_successful;
        self.total_messages += report.total_messages;
        self.total_errors += report.total_errors;
        self.days.push(DayReport { date, report });
    }

    /// Whether any day had a failing account.
    #[must_use]
    pub const fn has_errors(&self) -> bool {
        self.dates_with_errors > 0
    }

    /// Multi-line digest for the log.
    #[must_use]
    pub fn log_lines(&self) -> Vec<String> {
        vec![
            format!("Date range: {} to {}", self.date_from, self.date_to),
            format!("Days processed: {}", self.dates_processed),
            format!("Days successful: {}", self.dates_successful),
            format!("Days with errors: {}", self.dates_with_errors),
            format!("Total accounts processed: {}", self.total_accounts_processed),
            format!("Total accounts successful: {}", self.total_accounts_successful),
            format!("Total messages: {}", self.total_messages),
            format!("Total errors: {}", self.total_errors),
        ]
    }
}
