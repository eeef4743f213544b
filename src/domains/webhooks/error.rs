//! Webhook-specific error types.

use thiserror::Error;

use crate::domains::sync::SourceError;
use crate::domains::templates::TemplateError;

/// Errors that can occur while fulfilling a webhook or updating definitions.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// No template is stored for the endpoint.
    #[error("No template found for endpoint: {0}")]
    TemplateNotFound(String),

    /// The template names a handler that is not registered.
    #[error("Unknown handler: {0}")]
    UnknownHandler(String),

    /// Executing the template failed.
    #[error(transparent)]
    Template(#[from] TemplateError),

    /// Writing definitions to the document source failed.
    #[error("Definitions source error: {0}")]
    Source(#[from] SourceError),
}

impl WebhookError {
    /// Create a new "template not found" error.
    pub fn template_not_found(endpoint: impl Into<String>) -> Self {
        Self::TemplateNotFound(endpoint.into())
    }

    /// Create a new "unknown handler" error.
    pub fn unknown_handler(name: impl Into<String>) -> Self {
        Self::UnknownHandler(name.into())
    }

    /// Whether the caller, rather than this server, is at fault.
    pub fn is_client_error(&self) -> bool {
        match self {
            Self::TemplateNotFound(_) => true,
            Self::Template(e) => e.is_client_error(),
            Self::UnknownHandler(_) | Self::Source(_) => false,
        }
    }
}
