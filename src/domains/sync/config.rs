//! Document source and listener configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use super::error::SourceError;
use super::file::FileDocumentSource;
use super::source::DocumentSource;

#[cfg(feature = "firestore")]
use super::firestore::FirestoreDocumentSource;

/// Where the definitions document lives.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SourceConfig {
    /// A JSON file on local disk, polled for changes.
    File(FileSourceConfig),

    /// A Firestore document, read over the REST API.
    #[cfg(feature = "firestore")]
    Firestore(FirestoreConfig),
}

/// File source configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileSourceConfig {
    /// Path of the JSON definitions document.
    pub path: PathBuf,

    /// How often the file is re-read, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// Firestore source configuration.
#[cfg(feature = "firestore")]
#[derive(Clone, Serialize, Deserialize)]
pub struct FirestoreConfig {
    /// Google Cloud project id.
    pub project_id: String,

    /// Database id.
    #[serde(default = "default_database")]
    pub database: String,

    /// Collection holding the definitions document.
    pub collection: String,

    /// Id of the definitions document.
    pub document: String,

    /// `host:port` of a Firestore emulator; plain HTTP and no auth when set.
    #[serde(default)]
    pub emulator_host: Option<String>,

    /// OAuth2 bearer token for the production endpoint.
    #[serde(default)]
    pub access_token: Option<String>,

    /// How often the document is re-read, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

/// Custom Debug implementation to redact the access token from logs.
#[cfg(feature = "firestore")]
impl std::fmt::Debug for FirestoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirestoreConfig")
            .field("project_id", &self.project_id)
            .field("database", &self.database)
            .field("collection", &self.collection)
            .field("document", &self.document)
            .field("emulator_host", &self.emulator_host)
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("poll_interval_ms", &self.poll_interval_ms)
            .finish()
    }
}

/// Change listener tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListenerConfig {
    /// Capacity of the delivery -> processing snapshot channel.
    pub channel_capacity: usize,

    /// First reconnect delay after a subscription failure, in milliseconds.
    pub initial_backoff_ms: u64,

    /// Upper bound for the reconnect delay, in milliseconds.
    pub max_backoff_ms: u64,

    /// Drop cached templates whose key disappeared from the document.
    pub prune_removed: bool,

    /// How long startup waits for the first snapshot; `None` waits forever.
    pub ready_timeout_ms: Option<u64>,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

#[cfg(feature = "firestore")]
fn default_database() -> String {
    "(default)".to_string()
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

impl Default for FileSourceConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("definitions.json"),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

#[cfg(feature = "firestore")]
impl Default for FirestoreConfig {
    fn default() -> Self {
        Self {
            project_id: String::new(),
            database: default_database(),
            collection: "graffiti".to_string(),
            document: "definitions".to_string(),
            emulator_host: None,
            access_token: None,
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 16,
            initial_backoff_ms: 1000,
            max_backoff_ms: 30_000,
            prune_removed: false,
            ready_timeout_ms: None,
        }
    }
}

impl Default for SourceConfig {
    fn default() -> Self {
        #[cfg(feature = "firestore")]
        {
            return Self::Firestore(FirestoreConfig::default());
        }

        #[cfg(not(feature = "firestore"))]
        {
            return Self::File(FileSourceConfig::default());
        }
    }
}

impl SourceConfig {
    /// Load source config from environment variables.
    pub fn from_env() -> Self {
        let source = std::env::var("GRAFFITI_SOURCE")
            .unwrap_or_default()
            .to_lowercase();

        match source.as_str() {
            "file" => Self::File(FileSourceConfig::from_env()),
            #[cfg(feature = "firestore")]
            "firestore" => Self::Firestore(FirestoreConfig::from_env()),
            #[cfg(feature = "firestore")]
            _ => Self::Firestore(FirestoreConfig::from_env()),
            #[cfg(not(feature = "firestore"))]
            _ => Self::File(FileSourceConfig::from_env()),
        }
    }

    /// Get a description of this source for logging.
    pub fn description(&self) -> String {
        match self {
            Self::File(cfg) => format!("file {}", cfg.path.display()),
            #[cfg(feature = "firestore")]
            Self::Firestore(cfg) => format!(
                "firestore projects/{}/databases/{}/documents/{}/{}",
                cfg.project_id, cfg.database, cfg.collection, cfg.document
            ),
        }
    }

    /// Check the configuration for values that cannot work.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::File(cfg) => {
                if cfg.path.as_os_str().is_empty() {
                    return Err("file source path is empty".to_string());
                }
                if cfg.poll_interval_ms == 0 {
                    return Err("poll interval must be positive".to_string());
                }
            }
            #[cfg(feature = "firestore")]
            Self::Firestore(cfg) => {
                if cfg.project_id.is_empty() {
                    return Err(
                        "firestore project id is not set (GRAFFITI_PROJECT_ID or PROJECT_ID)"
                            .to_string(),
                    );
                }
                if cfg.collection.is_empty() || cfg.document.is_empty() {
                    return Err("firestore collection and document must be set".to_string());
                }
                if cfg.poll_interval_ms == 0 {
                    return Err("poll interval must be positive".to_string());
                }
            }
        }
        Ok(())
    }

    /// Build the configured document source.
    pub fn build(&self) -> Result<Arc<dyn DocumentSource>, SourceError> {
        match self {
            Self::File(cfg) => Ok(Arc::new(FileDocumentSource::new(
                cfg.path.clone(),
                Duration::from_millis(cfg.poll_interval_ms),
            ))),
            #[cfg(feature = "firestore")]
            Self::Firestore(cfg) => Ok(Arc::new(FirestoreDocumentSource::new(cfg.clone())?)),
        }
    }
}

impl FileSourceConfig {
    /// Load file source config from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(path) = std::env::var("GRAFFITI_FILE_PATH") {
            config.path = PathBuf::from(path);
        }
        if let Some(interval) = env_u64("GRAFFITI_POLL_INTERVAL_MS") {
            config.poll_interval_ms = interval;
        }
        config
    }
}

#[cfg(feature = "firestore")]
impl FirestoreConfig {
    /// Load Firestore config from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(project) =
            std::env::var("GRAFFITI_PROJECT_ID").or_else(|_| std::env::var("PROJECT_ID"))
        {
            config.project_id = project;
        }
        if let Ok(database) = std::env::var("GRAFFITI_DATABASE") {
            config.database = database;
        }
        if let Ok(collection) = std::env::var("GRAFFITI_COLLECTION") {
            config.collection = collection;
        }
        if let Ok(document) = std::env::var("GRAFFITI_DOCUMENT") {
            config.document = document;
        }
        config.emulator_host = std::env::var("FIRESTORE_EMULATOR_HOST").ok();
        config.access_token = std::env::var("GRAFFITI_ACCESS_TOKEN").ok();
        if let Some(interval) = env_u64("GRAFFITI_POLL_INTERVAL_MS") {
            config.poll_interval_ms = interval;
        }
        config
    }
}

impl ListenerConfig {
    /// Load listener config from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(capacity) = env_u64("GRAFFITI_LISTENER_CHANNEL_CAPACITY") {
            config.channel_capacity = capacity as usize;
        }
        if let Some(ms) = env_u64("GRAFFITI_LISTENER_INITIAL_BACKOFF_MS") {
            config.initial_backoff_ms = ms;
        }
        if let Some(ms) = env_u64("GRAFFITI_LISTENER_MAX_BACKOFF_MS") {
            config.max_backoff_ms = ms;
        }
        if let Ok(prune) = std::env::var("GRAFFITI_LISTENER_PRUNE") {
            config.prune_removed = prune.parse().unwrap_or(false);
        }
        config.ready_timeout_ms = env_u64("GRAFFITI_READY_TIMEOUT_MS");
        config
    }

    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }

    pub fn ready_timeout(&self) -> Option<Duration> {
        self.ready_timeout_ms.map(Duration::from_millis)
    }

    /// Check the configuration for values that cannot work.
    pub fn validate(&self) -> Result<(), String> {
        if self.channel_capacity == 0 {
            return Err("listener channel capacity must be positive".to_string());
        }
        if self.initial_backoff_ms == 0 {
            return Err("listener initial backoff must be positive".to_string());
        }
        if self.initial_backoff_ms > self.max_backoff_ms {
            return Err("listener initial backoff exceeds max backoff".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listener_defaults_validate() {
        let config = ListenerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.initial_backoff(), Duration::from_secs(1));
        assert_eq!(config.max_backoff(), Duration::from_secs(30));
        assert_eq!(config.ready_timeout(), None);
    }

    #[test]
    fn test_listener_validation() {
        let config = ListenerConfig {
            initial_backoff_ms: 10_000,
            max_backoff_ms: 10,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ListenerConfig {
            channel_capacity: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_source_validation() {
        let config = SourceConfig::File(FileSourceConfig::default());
        assert!(config.validate().is_ok());
        assert!(config.description().contains("definitions.json"));

        let config = SourceConfig::File(FileSourceConfig {
            poll_interval_ms: 0,
            ..Default::default()
        });
        assert!(config.validate().is_err());
    }

    #[cfg(feature = "firestore")]
    #[test]
    fn test_firestore_requires_project() {
        let config = SourceConfig::Firestore(FirestoreConfig::default());
        assert!(config.validate().is_err());

        let config = SourceConfig::Firestore(FirestoreConfig {
            project_id: "demo".to_string(),
            ..Default::default()
        });
        assert!(config.validate().is_ok());
        assert_eq!(
            config.description(),
            "firestore projects/demo/databases/(default)/documents/graffiti/definitions"
        );
    }

    #[cfg(feature = "firestore")]
    #[test]
    fn test_access_token_redacted_in_debug() {
        let config = FirestoreConfig {
            access_token: Some("super_secret_token".to_string()),
            ..Default::default()
        };
        let debug_str = format!("{:?}", config);
        assert!(debug_str.contains("REDACTED"));
        assert!(!debug_str.contains("super_secret_token"));
    }
}
