//! Error types for crusty-buffer operations.
//!
//! Two subsystems surface errors to callers:
//! - The article store (hot metadata/queue backend plus cold content backend)
//! - The content-extraction collaborator invoked by workers

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during article store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Article {0} not found")]
    NotFound(Uuid),

    #[error("Content store unavailable: no cold store is configured for this process")]
    ContentStoreUnavailable,

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid status transition from '{from}' to '{to}': {reason}")]
    InvalidTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Hot store error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Cold store error: {0}")]
    Sled(#[from] sled::Error),

    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupt record at '{key}': {reason}")]
    CorruptRecord { key: String, reason: String },
}

impl StoreError {
    /// Network or IO failure from either backend.
    pub fn is_backend_unavailable(&self) -> bool {
        matches!(
            self,
            Self::BackendUnavailable(_) | Self::Redis(_) | Self::Sled(_) | Self::Io(_)
        )
    }

    /// Whether repeating the same call may succeed.
    ///
    /// Only transient backend failures qualify; a missing cold store or a
    /// rejected transition fails identically on every attempt.
    pub fn is_retryable(&self) -> bool {
        self.is_backend_unavailable()
    }
}

/// Errors that can occur while extracting readable content from a page.
#[derive(Debug, Error)]
pub enum ExtractionError {
    #[error("{0}")]
    Failed(String),

    #[error("Extraction timed out after {0:?}")]
    Timeout(Duration),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Invalid URL '{0}'")]
    InvalidUrl(String),

    #[error("No readable content found at {0}")]
    NoContent(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display() {
        let id = Uuid::new_v4();
        assert!(StoreError::NotFound(id).to_string().contains(&id.to_string()));
        assert!(StoreError::ContentStoreUnavailable
            .to_string()
            .contains("no cold store"));
        assert!(StoreError::Cancelled.to_string().contains("cancelled"));

        let err = StoreError::InvalidTransition {
            from: "archived".to_string(),
            to: "pending".to_string(),
            reason: "terminal".to_string(),
        };
        assert!(err.to_string().contains("'archived' to 'pending'"));
    }

    #[test]
    fn test_store_error_classification() {
        assert!(StoreError::BackendUnavailable("down".to_string()).is_backend_unavailable());
        assert!(StoreError::Io(std::io::Error::other("disk")).is_retryable());
        assert!(!StoreError::ContentStoreUnavailable.is_retryable());
        assert!(!StoreError::NotFound(Uuid::new_v4()).is_retryable());
        assert!(!StoreError::Cancelled.is_backend_unavailable());
    }

    #[test]
    fn test_extraction_error_message_is_verbatim() {
        assert_eq!(ExtractionError::Failed("404".to_string()).to_string(), "404");
        assert!(ExtractionError::Timeout(Duration::from_secs(30))
            .to_string()
            .contains("30s"));
        let err = ExtractionError::Status {
            status: 503,
            url: "http://x".to_string(),
        };
        assert_eq!(err.to_string(), "HTTP 503 for http://x");
    }
}
