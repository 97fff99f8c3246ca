//! Archiver configuration.
//!
//! Provides the typed configuration model, its defaults, and validation.

mod model;
mod validation;

pub use model::{Account, CacheSettings, Config, ImapSettings, SchedulerSettings};
pub use validation::{ValidationError, ValidationResult, validate_config};
