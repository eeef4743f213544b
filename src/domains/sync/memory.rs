//! In-process document source.
//!
//! Holds the document in a watch channel. A new subscriber first receives the
//! current document (if one was ever written) and then every later
//! replacement. Slow subscribers only see the latest document, never a stale
//! one.

use async_trait::async_trait;
use chrono::Utc;
use futures::stream::{self, StreamExt};
use serde_json::{Map, Value};
use tokio::sync::watch;
use tracing::debug;

use super::error::SourceError;
use super::source::{DocumentSource, Snapshot, SnapshotStream, WriteResult};

/// A document source that lives entirely in memory.
#[derive(Debug)]
pub struct MemoryDocumentSource {
    sender: watch::Sender<Option<Snapshot>>,
}

impl MemoryDocumentSource {
    /// Create a source with no document yet.
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self { sender }
    }

    /// Create a source that already holds `data`.
    pub fn with_document(data: Map<String, Value>) -> Self {
        let (sender, _) = watch::channel(Some(Snapshot::new(data)));
        Self { sender }
    }

    /// The current document, if any.
    pub fn current(&self) -> Option<Snapshot> {
        self.sender.borrow().clone()
    }

    /// Number of open subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for MemoryDocumentSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentSource for MemoryDocumentSource {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    async fn subscribe(&self) -> Result<SnapshotStream, SourceError> {
        let mut receiver = self.sender.subscribe();
        receiver.mark_changed();

        let stream = stream::unfold(receiver, |mut receiver| async move {
            loop {
                receiver.changed().await.ok()?;
                let current = receiver.borrow_and_update().clone();
                if let Some(snapshot) = current {
                    return Some((Ok(snapshot), receiver));
                }
            }
        });

        Ok(stream.boxed())
    }

    async fn replace(&self, data: Map<String, Value>) -> Result<WriteResult, SourceError> {
        let update_time = Utc::now();
        debug!(fields = data.len(), "Replacing in-memory document");
        self.sender.send_replace(Some(Snapshot {
            data,
            update_time: Some(update_time),
        }));
        Ok(WriteResult { update_time })
    }
}
