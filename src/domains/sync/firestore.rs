//! Firestore document source.
//!
//! Reads the definitions document through the Firestore REST API (or the
//! local emulator) and polls it for changes, emitting a snapshot whenever the
//! document's `updateTime` moves. Replacing the document is a PATCH without
//! an update mask, which overwrites every field in one write.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::time::Duration;
use tracing::{debug, info};

use super::config::FirestoreConfig;
use super::error::SourceError;
use super::source::{DocumentSource, Snapshot, SnapshotStream, WriteResult, poll_changes};

const PRODUCTION_BASE: &str = "https://firestore.googleapis.com/v1";

/// A document source backed by one Firestore document.
#[derive(Clone)]
pub struct FirestoreDocumentSource {
    client: reqwest::Client,
    url: String,
    access_token: Option<String>,
    poll_interval: Duration,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FirestoreDocument {
    #[serde(default)]
    fields: Map<String, Value>,
    update_time: Option<String>,
}

impl std::fmt::Debug for FirestoreDocumentSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirestoreDocumentSource")
            .field("url", &self.url)
            .field("poll_interval", &self.poll_interval)
            .finish_non_exhaustive()
    }
}

impl FirestoreDocumentSource {
    /// Create a source for the document described by `config`.
    pub fn new(config: FirestoreConfig) -> Result<Self, SourceError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("graffiti/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(30))
            .build()?;

        let base = match &config.emulator_host {
            Some(host) => format!("http://{}/v1", host),
            None => PRODUCTION_BASE.to_string(),
        };
        let url = format!(
            "{}/projects/{}/databases/{}/documents/{}/{}",
            base, config.project_id, config.database, config.collection, config.document
        );

        // The emulator accepts any caller.
        let access_token = match config.emulator_host {
            Some(_) => None,
            None => config.access_token,
        };

        Ok(Self {
            client,
            url,
            access_token,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        })
    }

    /// The REST URL of the document.
    pub fn url(&self) -> &str {
        &self.url
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn fetch(&self) -> Result<(String, Snapshot), SourceError> {
        let response = self.authorize(self.client.get(&self.url)).send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(SourceError::NotFound(self.url.clone()));
        }
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }

        let document: FirestoreDocument = response.json().await?;
        let version = document.update_time.clone().unwrap_or_default();
        let snapshot = Snapshot {
            data: decode_fields(&document.fields)?,
            update_time: document.update_time.as_deref().and_then(parse_timestamp),
        };
        debug!(version = %version, fields = snapshot.data.len(), "Fetched definitions document");

        Ok((version, snapshot))
    }
}

#[async_trait]
impl DocumentSource for FirestoreDocumentSource {
    fn describe(&self) -> String {
        format!("firestore {}", self.url)
    }

    async fn subscribe(&self) -> Result<SnapshotStream, SourceError> {
        let source = self.clone();
        Ok(poll_changes(self.poll_interval, move || {
            let source = source.clone();
            async move { source.fetch().await }
        }))
    }

    async fn replace(&self, data: Map<String, Value>) -> Result<WriteResult, SourceError> {
        let body = json!({ "fields": encode_fields(&data) });
        let response = self
            .authorize(self.client.patch(&self.url))
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(SourceError::Status {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }

        let document: FirestoreDocument = response.json().await?;
        let update_time = document
            .update_time
            .as_deref()
            .and_then(parse_timestamp)
            .unwrap_or_else(Utc::now);

        info!(url = %self.url, fields = data.len(), "Replaced definitions document");
        Ok(WriteResult { update_time })
    }
}

fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Decode a Firestore `fields` map into plain JSON.
pub fn decode_fields(fields: &Map<String, Value>) -> Result<Map<String, Value>, SourceError> {
    fields
        .iter()
        .map(|(key, value)| Ok((key.clone(), decode_value(value)?)))
        .collect()
}

/// Decode one Firestore typed value into plain JSON.
pub fn decode_value(value: &Value) -> Result<Value, SourceError> {
    let (kind, inner) = value
        .as_object()
        .and_then(|obj| obj.iter().next())
        .ok_or_else(|| SourceError::invalid_document(format!("untyped value {}", value)))?;

    match (kind.as_str(), inner) {
        ("nullValue", _) => Ok(Value::Null),
        ("booleanValue", v) => Ok(v.clone()),
        ("doubleValue", v) => Ok(v.clone()),
        ("integerValue", Value::String(raw)) => raw
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| SourceError::invalid_document(format!("bad integerValue {}", raw))),
        ("integerValue", v) => Ok(v.clone()),
        ("stringValue", v)
        | ("timestampValue", v)
        | ("referenceValue", v)
        | ("bytesValue", v) => Ok(v.clone()),
        ("geoPointValue", v) => Ok(v.clone()),
        ("mapValue", v) => {
            let empty = Map::new();
            let fields = v.get("fields").and_then(Value::as_object).unwrap_or(&empty);
            decode_fields(fields).map(Value::Object)
        }
        ("arrayValue", v) => v
            .get("values")
            .and_then(Value::as_array)
            .map(|values| values.iter().map(decode_value).collect::<Result<Vec<_>, _>>())
            .transpose()
            .map(|values| Value::Array(values.unwrap_or_default())),
        (kind, _) => Err(SourceError::invalid_document(format!(
            "unsupported value type {}",
            kind
        ))),
    }
}

/// Encode plain JSON fields as Firestore typed values.
pub fn encode_fields(fields: &Map<String, Value>) -> Map<String, Value> {
    fields
        .iter()
        .map(|(key, value)| (key.clone(), encode_value(value)))
        .collect()
}

/// Encode one plain JSON value as a Firestore typed value.
pub fn encode_value(value: &Value) -> Value {
    match value {
        Value::Null => json!({ "nullValue": null }),
        Value::Bool(b) => json!({ "booleanValue": b }),
        Value::Number(n) => match n.as_i64() {
            Some(i) => json!({ "integerValue": i.to_string() }),
            None => json!({ "doubleValue": n.as_f64() }),
        },
        Value::String(s) => json!({ "stringValue": s }),
        Value::Array(values) => json!({
            "arrayValue": { "values": values.iter().map(encode_value).collect::<Vec<_>>() }
        }),
        Value::Object(fields) => json!({ "mapValue": { "fields": encode_fields(fields) } }),
    }
}
