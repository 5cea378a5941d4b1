//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid time expression: {0}")]
    InvalidTimeSpec(String),

    #[error("invalid snapshot window: {0}")]
    InvalidWindow(String),

    #[error("invalid snapshot id: {0}")]
    InvalidSnapshotId(String),

    #[error("invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("passphrase hashing failed: {0}")]
    Hash(String),
}

impl Error {
    /// Whether this error came from parsing a time expression or date-time.
    pub fn is_parse_error(&self) -> bool {
        matches!(self, Self::InvalidTimeSpec(_))
    }
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
