//! JSON file document source.
//!
//! Useful for local development: definitions live in a single JSON object on
//! disk, the file is re-read every poll interval and a snapshot is emitted
//! whenever its contents change.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

use super::error::SourceError;
use super::source::{
    DocumentSource, Snapshot, SnapshotStream, WriteResult, parse_document, poll_changes,
};

/// A document source backed by a JSON file.
#[derive(Debug, Clone)]
pub struct FileDocumentSource {
    path: PathBuf,
    poll_interval: Duration,
}

impl FileDocumentSource {
    /// Create a source reading `path` every `poll_interval`.
    pub fn new(path: impl Into<PathBuf>, poll_interval: Duration) -> Self {
        Self {
            path: path.into(),
            poll_interval,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

async fn read_document(path: PathBuf) -> Result<(String, Snapshot), SourceError> {
    let shown = path.display().to_string();
    let body = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| SourceError::io(&shown, e))?;
    let modified = tokio::fs::metadata(&path)
        .await
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Utc>::from);

    let data = parse_document(&body)?;
    debug!(path = %shown, fields = data.len(), "Read definitions file");

    Ok((
        body,
        Snapshot {
            data,
            update_time: modified,
        },
    ))
}

#[async_trait]
impl DocumentSource for FileDocumentSource {
    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }

    async fn subscribe(&self) -> Result<SnapshotStream, SourceError> {
        let path = self.path.clone();
        Ok(poll_changes(self.poll_interval, move || {
            read_document(path.clone())
        }))
    }

    async fn replace(&self, data: Map<String, Value>) -> Result<WriteResult, SourceError> {
        let shown = self.path.display().to_string();
        let body = serde_json::to_vec_pretty(&Value::Object(data))?;

        let mut staging = self.path.clone().into_os_string();
        staging.push(".tmp");
        let staging = PathBuf::from(staging);

        tokio::fs::write(&staging, &body)
            .await
            .map_err(|e| SourceError::io(staging.display().to_string(), e))?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|e| SourceError::io(&shown, e))?;

        info!(path = %shown, bytes = body.len(), "Replaced definitions file");
        Ok(WriteResult {
            update_time: Utc::now(),
        })
    }
}
