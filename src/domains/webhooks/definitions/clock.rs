//! Clock handler definition.

use chrono::{DateTime, Utc};

use super::HandlerDefinition;
use crate::domains::webhooks::payload::WebhookRequest;

/// Current date and time, in UTC.
pub struct ClockHandler;

impl ClockHandler {
    fn format(variable: &str, now: DateTime<Utc>) -> Option<String> {
        match variable {
            "CurrentDate" => Some(now.format("%Y-%m-%d").to_string()),
            "CurrentTime" => Some(now.format("%H:%M:%S").to_string()),
            "CurrentTimestamp" => Some(now.to_rfc3339()),
            _ => None,
        }
    }
}

impl HandlerDefinition for ClockHandler {
    const NAME: &'static str = "clock";
    const DESCRIPTION: &'static str = "Supplies the current UTC date, time and timestamp";

    fn variables() -> &'static [&'static str] {
        &["CurrentDate", "CurrentTime", "CurrentTimestamp"]
    }

    fn calculate(variable: &str, _request: &WebhookRequest) -> Option<String> {
        Self::format(variable, Utc::now())
    }
}
