//! Webhook request and response payloads.
//!
//! Only the parts the fulfillment path reads or writes are typed: the session
//! parameters on the way in and a text (or SSML) message on the way out.
//! Everything else is carried through untouched.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// An incoming fulfillment request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detect_intent_response_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent_info: Option<IntentInfo>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_info: Option<PageInfo>,

    #[serde(default)]
    pub session_info: SessionInfo,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fulfillment_info: Option<FulfillmentInfo>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_code: Option<String>,

    /// Fields this server does not interpret.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentInfo {
    #[serde(default)]
    pub last_matched_intent: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default)]
    pub confidence: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    #[serde(default)]
    pub current_page: String,
    #[serde(default)]
    pub display_name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    #[serde(default)]
    pub session: String,
    #[serde(default)]
    pub parameters: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentInfo {
    #[serde(default)]
    pub tag: String,
}

impl WebhookRequest {
    /// Session parameters as text.
    ///
    /// Strings are taken as-is, other scalars use their JSON rendering, and
    /// nulls are dropped.
    pub fn session_parameters(&self) -> HashMap<String, String> {
        self.session_info
            .parameters
            .iter()
            .filter_map(|(name, value)| {
                let text = match value {
                    Value::Null => return None,
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                Some((name.clone(), text))
            })
            .collect()
    }

    /// The fulfillment tag, if the request carries one.
    pub fn tag(&self) -> Option<&str> {
        self.fulfillment_info
            .as_ref()
            .map(|info| info.tag.as_str())
            .filter(|tag| !tag.is_empty())
    }
}

/// An outgoing fulfillment response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    pub fulfillment_response: FulfillmentResponse,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_info: Option<SessionInfo>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillmentResponse {
    pub messages: Vec<ResponseMessage>,

    #[serde(default)]
    pub merge_behavior: MergeBehavior,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MergeBehavior {
    #[default]
    MergeBehaviorUnspecified,
    Append,
    Replace,
}

/// One message in a fulfillment response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResponseMessage {
    Text(TextMessage),
    OutputAudioText(OutputAudioText),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextMessage {
    pub text: Vec<String>,
    #[serde(default)]
    pub allow_playback_interruption: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputAudioText {
    pub ssml: String,
    #[serde(default)]
    pub allow_playback_interruption: bool,
}

impl WebhookResponse {
    /// A response carrying one text message with the given lines.
    pub fn text<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_message(ResponseMessage::Text(TextMessage {
            text: lines.into_iter().map(Into::into).collect(),
            allow_playback_interruption: true,
        }))
    }

    /// A response carrying one SSML message.
    pub fn ssml(ssml: impl Into<String>) -> Self {
        Self::with_message(ResponseMessage::OutputAudioText(OutputAudioText {
            ssml: ssml.into(),
            allow_playback_interruption: true,
        }))
    }

    fn with_message(message: ResponseMessage) -> Self {
        Self {
            fulfillment_response: FulfillmentResponse {
                messages: vec![message],
                merge_behavior: MergeBehavior::default(),
            },
            session_info: None,
        }
    }

    /// Text of every text message, in order.
    pub fn texts(&self) -> Vec<&str> {
        self.fulfillment_response
            .messages
            .iter()
            .filter_map(|m| match m {
                ResponseMessage::Text(t) => Some(t),
                ResponseMessage::OutputAudioText(_) => None,
            })
            .flat_map(|t| t.text.iter().map(String::as_str))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_session_parameters() {
        let request: WebhookRequest = serde_json::from_value(json!({
            "detectIntentResponseId": "abc",
            "sessionInfo": {
                "session": "projects/p/sessions/s",
                "parameters": {
                    "user_name": "Ada",
                    "age": 36,
                    "vip": true,
                    "cleared": null
                }
            },
            "fulfillmentInfo": { "tag": "greet" },
            "languageCode": "en",
            "payload": { "opaque": 1 }
        }))
        .unwrap();

        let params = request.session_parameters();
        assert_eq!(params.len(), 3);
        assert_eq!(params["user_name"], "Ada");
        assert_eq!(params["age"], "36");
        assert_eq!(params["vip"], "true");
        assert_eq!(request.tag(), Some("greet"));
        assert_eq!(request.extra["payload"], json!({ "opaque": 1 }));
    }

    #[test]
    fn test_empty_request() {
        let request: WebhookRequest = serde_json::from_str("{}").unwrap();
        assert!(request.session_parameters().is_empty());
        assert_eq!(request.tag(), None);
    }

    #[test]
    fn test_text_response_shape() {
        let response = WebhookResponse::text(["Hello Ada"]);
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({
                "fulfillmentResponse": {
                    "messages": [{
                        "text": {
                            "text": ["Hello Ada"],
                            "allowPlaybackInterruption": true
                        }
                    }],
                    "mergeBehavior": "MERGE_BEHAVIOR_UNSPECIFIED"
                }
            })
        );
        assert_eq!(response.texts(), vec!["Hello Ada"]);
    }

    #[test]
    fn test_ssml_response_has_no_text() {
        let response = WebhookResponse::ssml("<speak>hi</speak>");
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(
            value["fulfillmentResponse"]["messages"][0]["outputAudioText"]["ssml"],
            "<speak>hi</speak>"
        );
        assert!(response.texts().is_empty());
    }
}
