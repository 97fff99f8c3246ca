//! `pecarchive` - daily archiver for PEC mailboxes
//!
//! Without flags it runs forever, archiving the previous day at the
//! configured time. `--once`, `--date` and `--date-from/--date-to` run a
//! single pass and exit non-zero if any account reported errors.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, bail};
use chrono::NaiveDate;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pecarchive_core::{Config, Scheduler, validate_config};

/// Archive PEC mailboxes into per-day compressed containers.
#[derive(Debug, Parser)]
#[command(name = "pecarchive", version, about)]
struct Cli {
    /// YAML configuration file.
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Archive yesterday once and exit.
    #[arg(long)]
    once: bool,

    /// Archive this day (YYYY-MM-DD) once and exit.
    #[arg(long, conflicts_with_all = ["date_from", "date_to"])]
    date: Option<NaiveDate>,

    /// First day of a backfill range.
    #[arg(long, requires = "date_to")]
    date_from: Option<NaiveDate>,

    /// Last day of a backfill range.
    #[arg(long, requires = "date_from")]
    date_to: Option<NaiveDate>,
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "pecarchive=info,pecarchive_core=info,pecarchive_imap=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;
    let scheduler = Scheduler::from_config(&config)?;
    info!(
        config = %cli.config.display(),
        accounts = config.accounts.len(),
        "Starting pecarchive"
    );

    if let (Some(from), Some(to)) = (cli.date_from, cli.date_to) {
        let range = scheduler.orchestrator().run_for_range(from, to).await?;
        return Ok(exit_code(range.has_errors()));
    }

    if cli.once || cli.date.is_some() {
        let report = scheduler.run_once(cli.date).await;
        return Ok(exit_code(report.has_errors()));
    }

    scheduler.run_daily().await;
    Ok(ExitCode::SUCCESS)
}

fn load_config(path: &Path) -> anyhow::Result<Config> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read config file {}", path.display()))?;
    let config: Config = serde_yaml::from_str(&text)
        .with_context(|| format!("cannot parse config file {}", path.display()))?;

    if let Err(errors) = validate_config(&config) {
        for e in &errors {
            error!(field = e.field(), "{e}");
        }
        bail!("invalid configuration: {} problem(s)", errors.len());
    }
    Ok(config)
}

const fn exit_code(has_errors: bool) -> ExitCode {
    if has_errors {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
