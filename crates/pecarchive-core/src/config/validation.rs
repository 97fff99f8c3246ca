//! Configuration validation.

use std::collections::HashSet;

use super::model::Config;

/// A single problem found in a configuration.
///
/// Account positions are 1-based, matching how operators count entries in
/// the YAML file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// `base_path` is empty.
    EmptyBasePath,
    /// No accounts are configured.
    NoAccounts,
    /// An account has no username.
    EmptyUsername {
        /// Account position.
        account: usize,
    },
    /// An account has no password.
    EmptyPassword {
        /// Account position.
        account: usize,
    },
    /// An account has no host.
    EmptyHost {
        /// Account position.
        account: usize,
    },
    /// An account's port is 0.
    InvalidPort {
        /// Account position.
        account: usize,
    },
    /// An account lists no folders.
    NoFolders {
        /// Account position.
        account: usize,
    },
    /// An account lists a blank folder name.
    EmptyFolder {
        /// Account position.
        account: usize,
    },
    /// Two accounts map to the same storage directory.
    DuplicateAccount {
        /// Account position of the later duplicate.
        account: usize,
        /// The shared storage name.
        name: String,
    },
    /// `retry_policy.initial_delay` is negative or not finite.
    InvalidInitialDelay,
    /// `retry_policy.backoff_multiplier` is below 1 or not finite.
    InvalidBackoffMultiplier,
    /// `imap.timeout` is 0.
    InvalidTimeout,
    /// `imap.batch_size` is 0.
    InvalidBatchSize,
    /// `scheduler.run_time` is not `HH:MM`.
    InvalidRunTime(String),
    /// `cache.max_size_mb` is 0.
    InvalidCacheSize,
}

impl ValidationError {
    /// Get the configuration field this error relates to.
    #[must_use]
    pub const fn field(&self) -> &'static str {
        match self {
            Self::EmptyBasePath => "base_path",
            Self::NoAccounts | Self::DuplicateAccount { .. } => "accounts",
            Self::EmptyUsername { .. } => "accounts.username",
            Self::EmptyPassword { .. } => "accounts.password",
            Self::EmptyHost { .. } => "accounts.host",
            Self::InvalidPort { .. } => "accounts.port",
            Self::NoFolders { .. } | Self::EmptyFolder { .. } => "accounts.folders",
            Self::InvalidInitialDelay => "retry_policy.initial_delay",
            Self::InvalidBackoffMultiplier => "retry_policy.backoff_multiplier",
            Self::InvalidTimeout => "imap.timeout",
            Self::InvalidBatchSize => "imap.batch_size",
            Self::InvalidRunTime(_) => "scheduler.run_time",
            Self::InvalidCacheSize => "cache.max_size_mb",
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyBasePath => write!(f, "base_path is required"),
            Self::NoAccounts => write!(f, "at least one account must be configured"),
            Self::EmptyUsername { account } => write!(f, "account {account}: username is required"),
            Self::EmptyPassword { account } => write!(f, "account {account}: password is required"),
            Self::EmptyHost { account } => write!(f, "account {account}: host is required"),
            Self::InvalidPort { account } => write!(f, "account {account}: port must be 1-65535"),
            Self::NoFolders { account } => {
                write!(f, "account {account}: at least one folder must be specified")
            }
            Self::EmptyFolder { account } => {
                write!(f, "account {account}: folder names must not be blank")
            }
            Self::DuplicateAccount { account, name } => write!(
                f,
                "account {account}: storage name '{name}' is already used by another account"
            ),
            Self::InvalidInitialDelay => {
                write!(f, "retry_policy.initial_delay must be a non-negative number")
            }
            Self::InvalidBackoffMultiplier => {
                write!(f, "retry_policy.backoff_multiplier must be at least 1")
            }
            Self::InvalidTimeout => write!(f, "imap.timeout must be at least 1 second"),
            Self::InvalidBatchSize => write!(f, "imap.batch_size must be at least 1"),
            Self::InvalidRunTime(value) => {
                write!(f, "scheduler.run_time '{value}' is not a valid HH:MM time")
            }
            Self::InvalidCacheSize => write!(f, "cache.max_size_mb must be at least 1"),
        }
    }
}

impl std::error::Error for ValidationError {}

/// Result of validating a configuration.
pub type ValidationResult = Result<(), Vec<ValidationError>>;

/// Validate a configuration.
///
/// Returns `Ok(())` if valid, or every problem found in one pass.
///
/// # Errors
///
/// Returns a vector of `ValidationError` if any fields are invalid.
pub fn validate_config(config: &Config) -> ValidationResult {
    let mut errors = Vec::new();

    if config.base_path.as_os_str().is_empty() {
        errors.push(ValidationError::EmptyBasePath);
    }

    if config.accounts.is_empty() {
        errors.push(ValidationError::NoAccounts);
    }

    let mut seen = HashSet::new();
    for (i, account) in config.accounts.iter().enumerate() {
        let position = i + 1;

        if account.username.trim().is_empty() {
            errors.push(ValidationError::EmptyUsername { account: position });
        } else if !seen.insert(account.storage_name()) {
            errors.push(ValidationError::DuplicateAccount {
                account: position,
                name: account.storage_name(),
            });
        }
        if account.password.is_empty() {
            errors.push(ValidationError::EmptyPassword { account: position });
        }
        if account.host.trim().is_empty() {
            errors.push(ValidationError::EmptyHost { account: position });
        }
        if account.port == 0 {
            errors.push(ValidationError::InvalidPort { account: position });
        }
        if account.folders.is_empty() {
            errors.push(ValidationError::NoFolders { account: position });
        } else if account.folders.iter().any(|f| f.trim().is_empty()) {
            errors.push(ValidationError::EmptyFolder { account: position });
        }
    }

    let retry = &config.retry_policy;
    if !retry.initial_delay.is_finite() || retry.initial_delay < 0.0 {
        errors.push(ValidationError::InvalidInitialDelay);
    }
    if !retry.backoff_multiplier.is_finite() || retry.backoff_multiplier < 1.0 {
        errors.push(ValidationError::InvalidBackoffMultiplier);
    }

    if config.imap.timeout == 0 {
        errors.push(ValidationError::InvalidTimeout);
    }
    if config.imap.batch_size == 0 {
        errors.push(ValidationError::InvalidBatchSize);
    }

    if config.scheduler.time_of_day().is_none() {
        errors.push(ValidationError::InvalidRunTime(
            config.scheduler.run_time.clone(),
        ));
    }

    if config.cache.max_size_mb == 0 {
        errors.push(ValidationError::InvalidCacheSize);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::config::Account;

    fn valid_config() -> Config {
        Config::new(
            "/data/pec-archive",
            vec![Account::new(
                "a@pec.it",
                "secret",
                "imap.pec.it",
                vec!["INBOX".into()],
            )],
        )
    }

    #[test]
    fn test_valid_config() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_empty_config_reports_everything() {
        let mut config = Config::new("", vec![]);
        config.imap.batch_size = 0;
        config.scheduler.run_time = "25:99".into();

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::EmptyBasePath,
                ValidationError::NoAccounts,
                ValidationError::InvalidBatchSize,
                ValidationError::InvalidRunTime("25:99".into()),
            ]
        );
    }

    #[test]
    fn test_account_errors_all_reported() {
        let mut config = valid_config();
        config.accounts.push(Account {
            username: String::new(),
            password: String::new(),
            host: " ".into(),
            port: 0,
            folders: vec![],
        });

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 5);
        assert!(errors.contains(&ValidationError::EmptyUsername { account: 2 }));
        assert!(errors.contains(&ValidationError::NoFolders { account: 2 }));
        assert!(errors.iter().all(|e| e.field().starts_with("accounts")));
    }

    #[test]
    fn test_duplicate_storage_name() {
        let mut config = valid_config();
        config.accounts.push(Account::new(
            "a@other-pec.it",
            "pw",
            "imap.other.it",
            vec!["INBOX".into()],
        ));

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![ValidationError::DuplicateAccount {
                account: 2,
                name: "a".into()
            }]
        );
    }

    #[test]
    fn test_retry_policy_bounds() {
        let mut config = valid_config();
        config.retry_policy.initial_delay = -1.0;
        config.retry_policy.backoff_multiplier = 0.5;

        let errors = validate_config(&config).unwrap_err();
        assert_eq!(
            errors,
            vec![
                ValidationError::InvalidInitialDelay,
                ValidationError::InvalidBackoffMultiplier
            ]
        );
    }

    #[test]
    fn test_display_mentions_account_position() {
        let err = ValidationError::EmptyHost { account: 3 };
        assert_eq!(err.to_string(), "account 3: host is required");
        assert_eq!(err.field(), "accounts.host");
    }
}
