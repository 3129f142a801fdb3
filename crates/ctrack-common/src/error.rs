//! Error types for ctrack

use crate::domain::DomainError;
use thiserror::Error;

/// ctrack error type
#[derive(Error, Debug)]
pub enum TrackerError {
    /// Entity not present in the current snapshot
    #[error("not found: {0}")]
    NotFound(String),

    /// Snapshot is still loading or its last fetch failed
    #[error("snapshot unavailable: {0}")]
    StaleSnapshot(String),

    /// Backend collaborator rejected or failed a request
    #[error("backend error: {0}")]
    Backend(String),

    /// Domain rule violated
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("config error: {0}")]
    Config(String),
}

impl TrackerError {
    /// True when the caller should fall back to the root view
    pub fn is_not_found(&self) -> bool {
        matches!(self, TrackerError::NotFound(_))
    }
}

/// Result type for ctrack
pub type TrackerResult<T> = Result<T, TrackerError>;
