//! Handler Registry - central registration and dispatch for all handlers.
//!
//! When adding a new handler:
//! 1. Create the handler file in `definitions/`
//! 2. Export it in `definitions/mod.rs`
//! 3. Register it here in `handler_info()` and `calculate_one()`

use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, warn};

use super::definitions::{ClockHandler, DefaultHandler, HandlerDefinition, UniversalAnswerHandler};
use super::error::WebhookError;
use super::payload::WebhookRequest;

/// Handler metadata, for listing.
#[derive(Debug, Clone, Serialize)]
pub struct HandlerInfo {
    pub name: &'static str,
    pub description: &'static str,
    pub variables: &'static [&'static str],
}

fn info<H: HandlerDefinition>() -> HandlerInfo {
    HandlerInfo {
        name: H::NAME,
        description: H::DESCRIPTION,
        variables: H::variables(),
    }
}

/// Handler registry - dispatches calculated variables by handler name.
#[derive(Debug, Clone, Copy, Default)]
pub struct HandlerRegistry;

impl HandlerRegistry {
    pub fn new() -> Self {
        Self
    }

    /// Metadata for every registered handler.
    pub fn handler_info(&self) -> Vec<HandlerInfo> {
        vec![
            info::<DefaultHandler>(),
            info::<UniversalAnswerHandler>(),
            info::<ClockHandler>(),
        ]
    }

    /// Get all handler names.
    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handler_info().into_iter().map(|h| h.name).collect()
    }

    /// Whether `name` resolves to a registered handler. The empty name is the
    /// default handler.
    pub fn contains(&self, name: &str) -> bool {
        name.is_empty() || self.handler_names().contains(&name)
    }

    /// Compute `variables` with the handler called `handler`.
    ///
    /// Variables the handler does not supply are left out of the result.
    pub fn calculate(
        &self,
        handler: &str,
        variables: &[String],
        request: &WebhookRequest,
    ) -> Result<HashMap<String, String>, WebhookError> {
        if !self.contains(handler) {
            warn!(handler, "Unknown handler requested");
            return Err(WebhookError::unknown_handler(handler));
        }

        let mut calculated = HashMap::with_capacity(variables.len());
        for variable in variables {
            match calculate_one(handler, variable, request) {
                Some(value) => {
                    calculated.insert(variable.clone(), value);
                }
                None => debug!(handler, variable = %variable, "Handler does not supply variable"),
            }
        }
        Ok(calculated)
    }
}

fn calculate_one(handler: &str, variable: &str, request: &WebhookRequest) -> Option<String> {
    match handler {
        "" | DefaultHandler::NAME => DefaultHandler::calculate(variable, request),
        UniversalAnswerHandler::NAME => UniversalAnswerHandler::calculate(variable, request),
        ClockHandler::NAME => ClockHandler::calculate(variable, request),
        _ => None,
    }
}
