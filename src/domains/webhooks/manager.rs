//! Per-request fulfillment.
//!
//! [`WebhookManager`] composes one request, the template it resolved to and
//! the variable mapping being built for it. Each step is an explicit call:
//! load and seed from the session, merge calculated values, execute.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::error::WebhookError;
use super::payload::{WebhookRequest, WebhookResponse};
use super::registry::HandlerRegistry;
use crate::domains::templates::{Template, TemplateCache};

/// Fulfillment state for one webhook request.
#[derive(Debug)]
pub struct WebhookManager {
    request: WebhookRequest,
    template: Arc<Template>,
    variables: HashMap<String, String>,
}

impl WebhookManager {
    /// Resolve `endpoint` in `cache` and seed the variables from the
    /// request's session parameters.
    pub fn initialize(
        cache: &TemplateCache,
        endpoint: &str,
        request: WebhookRequest,
    ) -> Result<Self, WebhookError> {
        let template = cache
            .load(endpoint)
            .ok_or_else(|| WebhookError::template_not_found(endpoint))?;
        let variables = template.map_session_variables(&request.session_parameters());

        Ok(Self {
            request,
            template,
            variables,
        })
    }

    pub fn request(&self) -> &WebhookRequest {
        &self.request
    }

    pub fn template(&self) -> &Template {
        &self.template
    }

    pub fn variables(&self) -> &HashMap<String, String> {
        &self.variables
    }

    /// Set a calculated variable, overriding any session-derived value.
    pub fn map_calculated(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.variables.insert(name.into(), value.into());
    }

    /// Ask the template's handler for its calculated variables and merge them.
    pub fn calculate(&mut self, registry: &HandlerRegistry) -> Result<(), WebhookError> {
        let calculated = registry.calculate(
            self.template.handler(),
            self.template.calculated_variables(),
            &self.request,
        )?;
        debug!(
            endpoint = self.template.endpoint(),
            calculated = calculated.len(),
            "Merged calculated variables"
        );
        self.variables.extend(calculated);
        Ok(())
    }

    /// Render the template against the current variables.
    pub fn render(&self) -> Result<String, WebhookError> {
        Ok(self.template.execute(&self.variables)?)
    }

    /// Render and wrap the result in a text response.
    pub fn execute(&self) -> Result<WebhookResponse, WebhookError> {
        self.render().map(|text| WebhookResponse::text([text]))
    }
}

/// Fulfill `request` for `endpoint`: load, seed, calculate, execute.
pub fn fulfill(
    cache: &TemplateCache,
    registry: &HandlerRegistry,
    endpoint: &str,
    request: WebhookRequest,
) -> Result<WebhookResponse, WebhookError> {
    let mut manager = WebhookManager::initialize(cache, endpoint, request)?;
    manager.calculate(registry)?;
    manager.execute()
}
