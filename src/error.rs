//! Error types for the sync engine.
//!
//! The taxonomy separates transient transport failures (retried inside the
//! HTTP client) from terminal HTTP errors (surfaced to the caller with their
//! status code) and local validation failures.

use reqwest::StatusCode;
use thiserror::Error;

/// Errors produced by the sync engine.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Connection-level failure (DNS, refused connection, closed socket).
    #[error("network error: {0}")]
    Transport(#[from] reqwest::Error),

    /// The resilient client ran out of attempts on a transport failure.
    #[error("request failed after {attempts} attempts")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// Terminal non-2xx response from an operation that requires success.
    #[error("HTTP {status}")]
    Http { status: StatusCode },

    /// Local input validation failure.
    #[error("validation error in field '{field}': {message}")]
    Validation { field: String, message: String },

    /// Operation requires a session token and none is installed.
    #[error("not authenticated")]
    NotAuthenticated,

    /// JSON serialization or deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SyncError {
    /// Create a new validation error.
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a retries-exhausted error carrying the final transport failure.
    pub fn retries_exhausted(attempts: u32, source: reqwest::Error) -> Self {
        Self::RetriesExhausted {
            attempts,
            source: Some(source),
        }
    }

    /// Whether this error class self-heals on a later pass.
    ///
    /// Transient errors during background sync are logged but never surfaced
    /// to the user; terminal errors and validation failures are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(_) | Self::RetriesExhausted { .. } => true,
            Self::Http { status } => {
                *status == StatusCode::BAD_GATEWAY || *status == StatusCode::SERVICE_UNAVAILABLE
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_error_display() {
        let err = SyncError::validation("title", "must not be empty");
        let display = format!("{}", err);
        assert!(display.contains("title"));
        assert!(display.contains("must not be empty"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(SyncError::RetriesExhausted {
            attempts: 3,
            source: None
        }
        .is_transient());
        assert!(SyncError::Http {
            status: StatusCode::SERVICE_UNAVAILABLE
        }
        .is_transient());
        assert!(!SyncError::Http {
            status: StatusCode::NOT_FOUND
        }
        .is_transient());
        assert!(!SyncError::NotAuthenticated.is_transient());
    }
}
