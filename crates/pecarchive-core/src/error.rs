//! Error types for the core library.

use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::cache::ExtractionError;

/// Errors that can occur in core operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Could not connect or log in to the mail server.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A folder could not be opened or searched.
    #[error("Folder '{folder}': {message}")]
    Folder {
        /// Folder name as configured.
        folder: String,
        /// What went wrong.
        message: String,
    },

    /// A message could not be retrieved.
    #[error("Fetch error in '{folder}'{}: {message}", uid.map(|u| format!(" (uid {u})")).unwrap_or_default())]
    Fetch {
        /// Folder the message lives in.
        folder: String,
        /// Message UID, when the failure is tied to one message.
        uid: Option<u32>,
        /// What went wrong.
        message: String,
    },

    /// A file or directory could not be written.
    #[error("Storage error at {}: {source}", path.display())]
    Storage {
        /// Path being written.
        path: PathBuf,
        /// Underlying I/O failure.
        source: std::io::Error,
    },

    /// Index files could not be produced.
    #[error("Index error: {0}")]
    Index(String),

    /// Container or digest could not be produced.
    #[error("Compression error: {0}")]
    Compression(String),

    /// A file could not be recovered from a container.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    /// Configuration is unusable.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl Error {
    /// Wraps an I/O failure on `path` as a storage error.
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Category recorded in run summaries.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection(_) => ErrorKind::Connection,
            Self::Folder { .. } => ErrorKind::Folder,
            Self::Fetch { .. } => ErrorKind::Fetch,
            Self::Storage { .. } | Self::Io(_) => ErrorKind::Storage,
            Self::Index(_) | Self::Serde(_) => ErrorKind::Index,
            Self::Compression(_) | Self::Extraction(_) => ErrorKind::Compression,
            Self::Config(_) => ErrorKind::Orchestration,
        }
    }

    /// Folder this error belongs to, if any.
    #[must_use]
    pub fn folder(&self) -> Option<&str> {
        match self {
            Self::Folder { folder, .. } | Self::Fetch { folder, .. } => Some(folder),
            _ => None,
        }
    }

    /// Message UID this error belongs to, if any.
    #[must_use]
    pub const fn uid(&self) -> Option<u32> {
        match self {
            Self::Fetch { uid, .. } => *uid,
            _ => None,
        }
    }
}

/// Error category as written to `summary.json`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    /// Connect or login failure, or a failure that exhausted retries.
    Connection,
    /// Folder could not be opened.
    Folder,
    /// Message retrieval failure.
    Fetch,
    /// Filesystem write failure.
    Storage,
    /// Index generation failure.
    Index,
    /// Container or digest failure.
    Compression,
    /// Unexpected failure of an account task.
    Orchestration,
}

impl ErrorKind {
    /// Returns the serialized name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::Folder => "folder",
            Self::Fetch => "fetch",
            Self::Storage => "storage",
            Self::Index => "index",
            Self::Compression => "compression",
            Self::Orchestration => "orchestration",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;
