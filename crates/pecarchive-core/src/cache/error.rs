//! Extraction errors.

use std::path::PathBuf;

use thiserror::Error;

/// A file could not be served from a container.
#[derive(Debug, Error)]
pub enum ExtractionError {
    /// The container does not exist.
    #[error("archive not found: {}", .0.display())]
    ArchiveNotFound(PathBuf),

    /// No member matches the requested path.
    #[error("file not found in archive: {0}")]
    MemberNotFound(String),

    /// The matching member is a directory, link or other non-file entry.
    #[error("not a regular file in archive: {0}")]
    NotAFile(String),

    /// The requested path is absolute or walks out of its container.
    #[error("invalid path in archive: {0}")]
    InvalidPath(String),

    /// The container could not be read or decompressed.
    #[error("failed to read archive {}: {source}", path.display())]
    Read {
        /// Container path.
        path: PathBuf,
        /// Underlying failure.
        source: std::io::Error,
    },

    /// The cache directory could not be written.
    #[error("failed to write cache file {}: {source}", path.display())]
    Write {
        /// Cache file path.
        path: PathBuf,
        /// Underlying failure.
        source: std::io::Error,
    },
}
