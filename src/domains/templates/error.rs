//! Template-specific error types.

use thiserror::Error;

/// Errors that can occur while building or executing a template.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// The prototype is not valid template source.
    #[error("Template '{name}' failed to compile at offset {offset}: {message}")]
    Compile {
        name: String,
        offset: usize,
        message: String,
    },

    /// The raw definition could not be decoded into a template.
    #[error("Template '{name}' could not be decoded: {source}")]
    Decode {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    /// A required placeholder was not supplied at execution time.
    #[error("Missing argument '{argument}' for template '{endpoint}'")]
    MissingArgument { endpoint: String, argument: String },
}

impl TemplateError {
    /// Create a new "compile" error.
    pub fn compile(name: impl Into<String>, offset: usize, message: impl Into<String>) -> Self {
        Self::Compile {
            name: name.into(),
            offset,
            message: message.into(),
        }
    }

    /// Create a new "decode" error.
    pub fn decode(name: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Decode {
            name: name.into(),
            source,
        }
    }

    /// Create a new "missing argument" error.
    pub fn missing_argument(endpoint: impl Into<String>, argument: impl Into<String>) -> Self {
        Self::MissingArgument {
            endpoint: endpoint.into(),
            argument: argument.into(),
        }
    }

    /// Whether this error was caused by the caller rather than the definition.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::MissingArgument { .. })
    }
}
