//! Universal answer handler definition.

use super::HandlerDefinition;
use crate::domains::webhooks::payload::WebhookRequest;

const ANSWER: &str = "42";

/// Answers life, the universe and everything.
pub struct UniversalAnswerHandler;

impl HandlerDefinition for UniversalAnswerHandler {
    const NAME: &'static str = "universal-answer";
    const DESCRIPTION: &'static str = "Supplies the answer to the ultimate question";

    fn variables() -> &'static [&'static str] {
        &["UniversalAnswer", "Answer"]
    }

    fn calculate(variable: &str, _request: &WebhookRequest) -> Option<String> {
        match variable {
            "UniversalAnswer" | "Answer" => Some(ANSWER.to_string()),
            _ => None,
        }
    }
}
