//! Synchronisation error types.

use std::time::Duration;
use thiserror::Error;

/// Errors raised by a document source.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Reading or writing the backing file failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The document body was not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The HTTP request to the document store failed.
    #[cfg(feature = "firestore")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The document store answered with an unexpected status.
    #[error("Unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    /// The document does not exist (yet).
    #[error("Document not found: {0}")]
    NotFound(String),

    /// The document exists but is not shaped like a definitions document.
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
}

impl SourceError {
    /// Create an I/O error for `path`.
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create an "invalid document" error.
    pub fn invalid_document(msg: impl Into<String>) -> Self {
        Self::InvalidDocument(msg.into())
    }
}

/// Errors raised by the change listener.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The listener stopped before the first snapshot was applied.
    #[error("Listener stopped before the initial template load completed")]
    ListenerStopped,

    /// The first snapshot did not arrive in time.
    #[error("Initial template load did not complete within {0:?}")]
    ReadyTimeout(Duration),
}
