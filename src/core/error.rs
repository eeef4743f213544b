//! Error types and handling for the server.
//!
//! This module defines a unified error type that can represent errors from
//! all domains and external dependencies, providing consistent error handling
//! across the entire application.

use thiserror::Error;

/// A specialized Result type for server operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Unified error type for the server.
///
/// This enum captures all possible error conditions that can occur during
/// server operation, including domain-specific errors and external failures.
#[derive(Debug, Error)]
pub enum Error {
    /// Error originating from the templates domain.
    #[error("Template error: {0}")]
    Template(#[from] crate::domains::templates::TemplateError),

    /// Error originating from a document source.
    #[error("Source error: {0}")]
    Source(#[from] crate::domains::sync::SourceError),

    /// Error originating from the change listener.
    #[error("Sync error: {0}")]
    Sync(#[from] crate::domains::sync::SyncError),

    /// Error originating from the webhooks domain.
    #[error("Webhook error: {0}")]
    Webhook(#[from] crate::domains::webhooks::WebhookError),

    /// Error originating from the transport layer.
    #[error("Transport error: {0}")]
    Transport(#[from] super::transport::TransportError),

    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors from file operations or network communication.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Create a new configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
