//! Client error types

use ctrack_common::TrackerError;
use thiserror::Error;

/// Error type for backend requests
#[derive(Error, Debug)]
pub enum Error {
    /// Error returned by the server
    #[error("API error: {code} - {message}")]
    Api {
        status_code: u16,
        code: String,
        message: String,
    },

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns true for 404 responses
    pub fn is_not_found_error(&self) -> bool {
        matches!(self, Error::Api { status_code: 404, .. })
    }

    /// Returns true for 401 and 403 responses
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Error::Api { status_code: 401 | 403, .. })
    }

    /// Returns true if this error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::Api { status_code, .. } => *status_code >= 500,
            Error::Http(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }
}

impl From<Error> for TrackerError {
    fn from(e: Error) -> Self {
        match e {
            Error::Api { status_code: 404, message, .. } => TrackerError::NotFound(message),
            Error::Json(e) => TrackerError::Serialization(e),
            Error::Config(message) => TrackerError::Config(message),
            other => TrackerError::Backend(other.to_string()),
        }
    }
}

/// Result type alias for client operations
pub type Result<T> = std::result::Result<T, Error>;
