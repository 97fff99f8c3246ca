//! Read path errors.

use thiserror::Error;

use crate::cache::ExtractionError;

/// Why a read request failed.
#[derive(Debug, Error)]
pub enum ReadError {
    /// The account, day, message or container does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The request itself is malformed or tries to leave the archive root.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The archive exists but could not be read.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ExtractionError> for ReadError {
    fn from(error: ExtractionError) -> Self {
        match error {
            ExtractionError::ArchiveNotFound(_) | ExtractionError::MemberNotFound(_) => {
                Self::NotFound(error.to_string())
            }
            ExtractionError::InvalidPath(_) => Self::InvalidInput(error.to_string()),
            ExtractionError::NotAFile(_)
            | ExtractionError::Read { .. }
            | ExtractionError::Write { .. } => Self::Internal(error.to_string()),
        }
    }
}

impl From<std::io::Error> for ReadError {
    fn from(error: std::io::Error) -> Self {
        if error.kind() == std::io::ErrorKind::NotFound {
            Self::NotFound(error.to_string())
        } else {
            Self::Internal(error.to_string())
        }
    }
}
