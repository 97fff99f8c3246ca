//! # pecarchive-core
//!
//! Daily archival of PEC (certified e-mail) mailboxes.
//!
//! This crate provides:
//! - Configuration model and validation
//! - Per-account fetch pipeline with retry and a bounded worker pool
//! - On-disk layout, `.eml` storage and per-day indexes (CSV and JSON)
//! - `.tar.gz` day containers with SHA-256 digests
//! - Run summaries and aggregate reports
//! - **Retrieval cache** - LRU extraction of single files from containers
//! - **Query surface** - Listing, searching and reading archived mail
//! - Daily scheduler and date-range backfill

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

pub mod archive;
pub mod cache;
pub mod config;
mod error;
pub mod index;
pub mod mailbox;
pub mod orchestrator;
pub mod query;
pub mod report;
pub mod retry;
pub mod scheduler;
pub mod storage;

pub use cache::{ExtractionError, RetrievalCache};
pub use config::{Account, Config, ValidationError, validate_config};
pub use error::{Error, ErrorKind, Result};
pub use index::{Indexer, MessageRecord};
pub use mailbox::{Connector, ImapConnector, Mailbox, RawMessage};
pub use orchestrator::{Orchestrator, RangeReport};
pub use query::{ArchiveReader, ReadError, SearchQuery, SearchResults};
pub use report::{AggregateReport, RunStatus, RunSummary};
pub use retry::RetryPolicy;
pub use scheduler::Scheduler;
pub use storage::Storage;
