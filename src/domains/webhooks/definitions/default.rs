//! Default handler definition.

use super::HandlerDefinition;
use crate::domains::webhooks::payload::WebhookRequest;

/// Used by templates that need no calculated variables.
pub struct DefaultHandler;

impl HandlerDefinition for DefaultHandler {
    const NAME: &'static str = "default";
    const DESCRIPTION: &'static str = "Supplies no calculated variables";

    fn variables() -> &'static [&'static str] {
        &[]
    }

    fn calculate(_variable: &str, _request: &WebhookRequest) -> Option<String> {
        None
    }
}
