//! The remote definitions document, as a capability.
//!
//! The listener only needs two things from wherever the definitions live: a
//! stream of full-document snapshots and a way to replace the whole document.
//! Transport, retries and authentication stay behind [`DocumentSource`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{self, BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::future::Future;
use std::time::Duration;

use super::error::SourceError;

/// A full point-in-time copy of the definitions document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Top-level fields of the document.
    pub data: Map<String, Value>,

    /// When the document was last written, if the source knows.
    #[serde(rename = "updateTime", skip_serializing_if = "Option::is_none")]
    pub update_time: Option<DateTime<Utc>>,
}

impl Snapshot {
    /// Create a snapshot stamped with the current time.
    pub fn new(data: Map<String, Value>) -> Self {
        Self {
            data,
            update_time: Some(Utc::now()),
        }
    }
}

/// Acknowledgement of an accepted document replacement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WriteResult {
    #[serde(rename = "updateTime")]
    pub update_time: DateTime<Utc>,
}

/// An endless stream of snapshots; an error or the end of the stream means
/// the subscription is gone and must be re-established.
pub type SnapshotStream = BoxStream<'static, Result<Snapshot, SourceError>>;

/// Where template definitions are read from and written to.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// Human readable location, for logs.
    fn describe(&self) -> String;

    /// Open a subscription to the document.
    async fn subscribe(&self) -> Result<SnapshotStream, SourceError>;

    /// Replace the whole document with `data`.
    async fn replace(&self, data: Map<String, Value>) -> Result<WriteResult, SourceError>;
}

/// Parse a JSON document body into its top-level fields.
pub fn parse_document(body: &str) -> Result<Map<String, Value>, SourceError> {
    match serde_json::from_str::<Value>(body)? {
        Value::Object(fields) => Ok(fields),
        other => Err(SourceError::invalid_document(format!(
            "expected a JSON object, found {}",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

struct PollState<F, K> {
    fetch: F,
    last: Option<K>,
    first: bool,
    failed: bool,
}

/// Turn a fetch function into a snapshot stream.
///
/// `fetch` is called immediately and then every `interval`; a snapshot is
/// emitted whenever the returned version differs from the previous one. The
/// first fetch error is yielded and ends the stream.
pub(crate) fn poll_changes<F, Fut, K>(interval: Duration, fetch: F) -> SnapshotStream
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<(K, Snapshot), SourceError>> + Send + 'static,
    K: PartialEq + Send + 'static,
{
    let state = PollState {
        fetch,
        last: None,
        first: true,
        failed: false,
    };

    stream::unfold(state, move |mut state| async move {
        if state.failed {
            return None;
        }

        loop {
            if !state.first {
                tokio::time::sleep(interval).await;
            }
            state.first = false;

            match (state.fetch)().await {
                Ok((version, snapshot)) => {
                    if state.last.as_ref() == Some(&version) {
                        continue;
                    }
                    state.last = Some(version);
                    return Some((Ok(snapshot), state));
                }
                Err(e) => {
                    state.failed = true;
                    return Some((Err(e), state));
                }
            }
        }
    })
    .boxed()
}
