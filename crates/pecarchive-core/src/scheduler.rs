//! Daily trigger for archive runs.

use std::time::Duration;

use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use tracing::info;

use crate::config::Config;
use crate::orchestrator::Orchestrator;
use crate::report::AggregateReport;
use crate::{Error, Result};

/// Runs the orchestrator once a day for the previous day.
#[derive(Debug)]
pub struct Scheduler {
    orchestrator: Orchestrator,
    run_time: NaiveTime,
}

impl Scheduler {
    /// Creates a scheduler firing at `run_time` local time.
    #[must_use]
    pub const fn new(orchestrator: Orchestrator, run_time: NaiveTime) -> Self {
        Self {
            orchestrator,
            run_time,
        }
    }

    /// Creates a scheduler for the configured accounts and run time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `scheduler.run_time` is not `HH:MM`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let run_time = config.scheduler.time_of_day().ok_or_else(|| {
            Error::Config(format!(
                "invalid scheduler.run_time '{}'",
                config.scheduler.run_time
            ))
        })?;
        Ok(Self::new(Orchestrator::new(config), run_time))
    }

    /// The wrapped orchestrator.
    #[must_use]
    pub const fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    /// Runs one archive pass for `date`, or for yesterday when `None`.
    pub async fn run_once(&self, date: Option<NaiveDate>) -> AggregateReport {
        let date = date.unwrap_or_else(|| yesterday(Local::now().date_naive()));
        self.orchestrator.run_for_date(date).await
    }

    /// Sleeps until each daily run time and archives the previous day.
    /// Never returns.
    pub async fn run_daily(&self) {
        info!(run_time = %self.run_time.format("%H:%M"), "scheduler started");
        loop {
            let now = Local::now().naive_local();
            let next = next_run_after(now, self.run_time);
            let wait = (next - now).to_std().unwrap_or(Duration::ZERO);
            info!(next_run = %next, wait_secs = wait.as_secs(), "waiting for next run");
            tokio::time::sleep(wait).await;

            let report = self.run_once(None).await;
            info!(
                successful = report.accounts_successful,
                processed = report.accounts_processed,
                has_errors = report.has_errors(),
                "scheduled run finished"
            );
        }
    }
}

/// The day before `today`.
#[must_use]
pub fn yesterday(today: NaiveDate) -> NaiveDate {
    today.pred_opt().unwrap_or(today)
}

/// First occurrence of `run_time` strictly after `now`.
#[must_use]
pub fn next_run_after(now: NaiveDateTime, run_time: NaiveTime) -> NaiveDateTime {
    let today = now.date().and_time(run_time);
    if today > now {
        today
    } else {
        now.date().succ_opt().unwrap_or(now.date()).and_time(run_time)
    }
}
