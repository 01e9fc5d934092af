//! Error types for fetch operations
//!
//! Every query task reports failure as a `FetchError` value instead of
//! panicking, so fan-out strategies can finish a batch when some members fail.

use thiserror::Error;

/// Main error type for cache, executor and collaborator operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    /// The primary entity of an aggregate fetch does not exist
    #[error("{entity} not found: {id}")]
    NotFound { entity: String, id: String },

    /// The remote collaborator answered with an error
    #[error("Upstream query error ({status}): {message}")]
    Upstream { status: u16, message: String },

    /// A query exceeded its allotted time
    #[error("Query timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// A secondary join failed and was downgraded to missing data
    #[error("Partial join failure on {relation}: {reason}")]
    PartialJoin { relation: String, reason: String },

    /// Network or transport failure talking to the collaborator
    #[error("Connection error: {0}")]
    Connection(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization/Deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Malformed arguments passed by the caller
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The request context was cancelled before the collaborator answered
    #[error("Request cancelled")]
    Cancelled,

    /// Generic error with context
    #[error("Error: {0}")]
    Other(String),
}

impl FetchError {
    /// Shorthand for an upstream error without a meaningful HTTP status
    pub fn upstream(message: impl Into<String>) -> Self {
        FetchError::Upstream {
            status: 0,
            message: message.into(),
        }
    }

    /// Whether a retry has a reasonable chance of succeeding
    ///
    /// Client errors (4xx) are permanent; server errors, unknown statuses,
    /// transport failures and timeouts are treated as transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Upstream { status, .. } => *status == 0 || *status >= 500,
            FetchError::Connection(_) | FetchError::Timeout { .. } => true,
            _ => false,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound { .. })
    }
}

/// Result type alias for fetch operations
pub type Result<T> = std::result::Result<T, FetchError>;

impl From<String> for FetchError {
    fn from(s: String) -> Self {
        FetchError::Other(s)
    }
}

impl From<&str> for FetchError {
    fn from(s: &str) -> Self {
        FetchError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for FetchError {
    fn from(e: serde_json::Error) -> Self {
        FetchError::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Connection(format!("request timed out: {}", e))
        } else if e.is_decode() {
            FetchError::Serialization(e.to_string())
        } else {
            FetchError::Connection(e.to_string())
        }
    }
}
