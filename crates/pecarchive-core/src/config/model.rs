//! Configuration model types.

use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveTime;
use serde::{Deserialize, Serialize};

use crate::retry::RetryPolicy;
use crate::storage::sanitize_filename;

/// Default number of accounts processed concurrently.
pub const DEFAULT_CONCURRENCY: i64 = 4;

/// Name of the cache directory created under the storage root.
pub const DEFAULT_CACHE_DIR: &str = ".cache";

/// One mailbox account to archive.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Login name, usually the full PEC address.
    #[serde(default)]
    pub username: String,
    /// Login password.
    #[serde(default)]
    pub password: String,
    /// IMAP server host.
    #[serde(default)]
    pub host: String,
    /// IMAP server port.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Folders to archive, in order.
    #[serde(default)]
    pub folders: Vec<String>,
}

impl Account {
    /// Creates an account on the default port.
    #[must_use]
    pub fn new(
        username: impl Into<String>,
        password: impl Into<String>,
        host: impl Into<String>,
        folders: Vec<String>,
    ) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            host: host.into(),
            port: default_port(),
            folders,
        }
    }

    /// Storage namespace: the sanitized part of the login before `@`.
    #[must_use]
    pub fn storage_name(&self) -> String {
        let local = self
            .username
            .split_once('@')
            .map_or(self.username.as_str(), |(local, _)| local);
        sanitize_filename(local)
    }
}

/// Protocol client settings shared by all accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImapSettings {
    /// Per-operation timeout, in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout: u64,
    /// Number of messages fetched per request.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

impl ImapSettings {
    /// Returns the timeout as a duration.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }
}

impl Default for ImapSettings {
    fn default() -> Self {
        Self {
            timeout: default_timeout_secs(),
            batch_size: default_batch_size(),
        }
    }
}

/// Daily scheduling settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerSettings {
    /// Local wall-clock time of the daily run, `HH:MM`.
    #[serde(default = "default_run_time")]
    pub run_time: String,
}

impl SchedulerSettings {
    /// Parses `run_time`, or `None` if it is not a valid `HH:MM`.
    #[must_use]
    pub fn time_of_day(&self) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(self.run_time.trim(), "%H:%M").ok()
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            run_time: default_run_time(),
        }
    }
}

/// Retrieval cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Cache directory; defaults to `<base_path>/.cache`.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Disk budget in megabytes.
    #[serde(default = "default_cache_mb")]
    pub max_size_mb: u64,
}

impl CacheSettings {
    /// Returns the budget in bytes.
    #[must_use]
    pub const fn max_size_bytes(&self) -> u64 {
        self.max_size_mb.saturating_mul(1024 * 1024)
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            path: None,
            max_size_mb: default_cache_mb(),
        }
    }
}

/// Complete archiver configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Storage root.
    #[serde(default)]
    pub base_path: PathBuf,
    /// Accounts to archive.
    #[serde(default)]
    pub accounts: Vec<Account>,
    /// Maximum accounts processed at once; values below 1 mean 1.
    #[serde(default = "default_concurrency")]
    pub concurrency: i64,
    /// Backoff policy for the connect-and-fetch phase.
    #[serde(default, alias = "retry")]
    pub retry_policy: RetryPolicy,
    /// Protocol client settings.
    #[serde(default)]
    pub imap: ImapSettings,
    /// Daily scheduling settings.
    #[serde(default)]
    pub scheduler: SchedulerSettings,
    /// Retrieval cache settings.
    #[serde(default)]
    pub cache: CacheSettings,
}

impl Config {
    /// Creates a configuration with defaults for everything but the root and
    /// the accounts.
    #[must_use]
    pub fn new(base_path: impl Into<PathBuf>, accounts: Vec<Account>) -> Self {
        Self {
            base_path: base_path.into(),
            accounts,
            concurrency: DEFAULT_CONCURRENCY,
            retry_policy: RetryPolicy::default(),
            imap: ImapSettings::default(),
            scheduler: SchedulerSettings::default(),
            cache: CacheSettings::default(),
        }
    }

    /// Number of worker tasks to run.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        usize::try_from(self.concurrency.max(1)).unwrap_or(1)
    }

    /// Resolved cache directory.
    #[must_use]
    pub fn cache_path(&self) -> PathBuf {
        self.cache
            .path
            .clone()
            .unwrap_or_else(|| self.base_path.join(DEFAULT_CACHE_DIR))
    }
}

const fn default_port() -> u16 {
    993
}

const fn default_timeout_secs() -> u64 {
    30
}

const fn default_batch_size() -> usize {
    100
}

fn default_run_time() -> String {
    "01:00".to_string()
}

const fn default_cache_mb() -> u64 {
    500
}

const fn default_concurrency() -> i64 {
    DEFAULT_CONCURRENCY
}
