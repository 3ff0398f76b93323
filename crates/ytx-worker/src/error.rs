//! Worker error types.

use std::time::Duration;

use thiserror::Error;

use crate::retry::{classify_message, FailureClass, RetryError};

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Fetch failed: {0}")]
    Fetch(String),

    #[error("Derivation failed: {0}")]
    Derivation(String),

    #[error("Rate limited: {message}")]
    RateLimited {
        message: String,
        retry_after: Option<Duration>,
    },

    /// The remote side refused the request outright (bad input, auth)
    #[error("Request rejected: {0}")]
    Rejected(String),

    #[error("Render failed: {0}")]
    Render(String),

    #[error("{operation} failed after {attempts} attempt(s): {message}")]
    Retry {
        operation: String,
        attempts: u32,
        message: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Queue error: {0}")]
    Queue(#[from] ytx_queue::QueueError),

    #[error("Cache error: {0}")]
    Cache(#[from] ytx_cache::CacheError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn fetch(msg: impl Into<String>) -> Self {
        Self::Fetch(msg.into())
    }

    pub fn derivation(msg: impl Into<String>) -> Self {
        Self::Derivation(msg.into())
    }

    pub fn rate_limited(msg: impl Into<String>, retry_after: Option<Duration>) -> Self {
        Self::RateLimited {
            message: msg.into(),
            retry_after,
        }
    }

    pub fn rejected(msg: impl Into<String>) -> Self {
        Self::Rejected(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Collapse a retry outcome into a single error carrying the attempt
    /// count and the last error text.
    pub fn from_retry(operation: &str, err: RetryError<WorkerError>) -> Self {
        Self::Retry {
            operation: operation.to_string(),
            attempts: err.attempts(),
            message: err.to_string(),
        }
    }

    /// Classification used by the retry layer.
    ///
    /// Collaborator errors are classified by their message; configuration
    /// and bookkeeping errors are never worth retrying.
    pub fn failure_class(&self) -> FailureClass {
        match self {
            WorkerError::RateLimited { retry_after, .. } => FailureClass::RateLimited {
                retry_after: *retry_after,
            },
            WorkerError::Fetch(msg) | WorkerError::Derivation(msg) => classify_message(msg),
            WorkerError::Io(e) => classify_message(&e.to_string()),
            _ => FailureClass::Fatal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.failure_class().is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_class() {
        assert_eq!(
            WorkerError::fetch("connection reset by peer").failure_class(),
            FailureClass::Transient
        );
        assert_eq!(
            WorkerError::derivation("Gemini API returned 400 Bad Request").failure_class(),
            FailureClass::Fatal
        );
        assert_eq!(
            WorkerError::rate_limited("slow down", Some(Duration::from_secs(7))).failure_class(),
            FailureClass::RateLimited {
                retry_after: Some(Duration::from_secs(7))
            }
        );
        assert!(!WorkerError::config("GEMINI_API_KEY not set").is_retryable());
        assert!(!WorkerError::rejected("400 Bad Request: please try again later").is_retryable());
    }

    #[test]
    fn test_from_retry_keeps_error_text() {
        let err = WorkerError::from_retry(
            "derive",
            RetryError::Fatal {
                error: WorkerError::derivation("invalid argument"),
                attempts: 1,
            },
        );
        assert_eq!(
            err.to_string(),
            "derive failed after 1 attempt(s): Derivation failed: invalid argument"
        );
    }
}
