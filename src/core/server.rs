//! Server facade and lifecycle management.
//!
//! [`GraffitiServer`] owns the template cache, the definitions source and the
//! handler registry, and exposes the operations the transport layer serves:
//! definitions dump and replace, webhook fulfillment and health.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};

use super::config::Config;
use super::error::Result;
use crate::domains::sync::{
    DocumentSource, ListenerHandle, ListenerMonitor, ListenerStats, WriteResult,
};
use crate::domains::templates::{TemplateCache, TemplateDefinition};
use crate::domains::webhooks::{
    HandlerInfo, HandlerRegistry, WebhookError, WebhookRequest, WebhookResponse, fulfill,
};

/// Point-in-time server health.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: &'static str,
    pub agent: String,
    pub ready: bool,
    pub templates: usize,
    pub revision: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listener: Option<ListenerStats>,
    pub timestamp: DateTime<Utc>,
}

/// The template server.
#[derive(Clone)]
pub struct GraffitiServer {
    /// Server configuration.
    config: Arc<Config>,

    /// The live template cache.
    cache: Arc<TemplateCache>,

    /// Where definitions are read from and written to.
    source: Arc<dyn DocumentSource>,

    /// Calculated variable providers.
    handlers: HandlerRegistry,

    /// Set once the listener has been started.
    listener: Arc<OnceLock<ListenerMonitor>>,
}

impl GraffitiServer {
    /// Create a server reading definitions from the configured source.
    pub fn new(config: Config) -> Result<Self> {
        let source = config.source.build()?;
        Ok(Self::with_source(config, source))
    }

    /// Create a server reading definitions from `source`.
    pub fn with_source(config: Config, source: Arc<dyn DocumentSource>) -> Self {
        let cache = Arc::new(TemplateCache::new(config.server.agent_name.clone()));
        Self {
            config: Arc::new(config),
            cache,
            source,
            handlers: HandlerRegistry::new(),
            listener: Arc::new(OnceLock::new()),
        }
    }

    /// Get the server name.
    pub fn name(&self) -> &str {
        &self.config.server.name
    }

    /// Get the server version.
    pub fn version(&self) -> &str {
        &self.config.server.version
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    pub fn cache(&self) -> &Arc<TemplateCache> {
        &self.cache
    }

    pub fn handlers(&self) -> &HandlerRegistry {
        &self.handlers
    }

    /// Start syncing the cache and wait for the initial load.
    pub async fn start_listener(&self, cancel: CancellationToken) -> Result<ListenerHandle> {
        let handle = self
            .cache
            .listen(
                Arc::clone(&self.source),
                self.config.listener.clone(),
                cancel,
            )
            .await?;

        if self.listener.set(handle.monitor()).is_err() {
            warn!("Listener started more than once; health reports the first one");
        }
        info!(
            templates = self.cache.len(),
            revision = self.cache.revision(),
            "Template cache ready"
        );
        Ok(handle)
    }

    /// Whether the initial template load has completed.
    pub fn is_ready(&self) -> bool {
        self.listener.get().is_some_and(ListenerMonitor::is_ready)
    }

    /// Copy of every stored definition, keyed by endpoint.
    pub fn definitions(&self) -> BTreeMap<String, TemplateDefinition> {
        self.cache.snapshot()
    }

    /// Replace the whole definitions document.
    ///
    /// The cache picks the change up through the listener like any other.
    #[instrument(skip(self, definitions), fields(fields = definitions.len()))]
    pub async fn update_definitions(
        &self,
        definitions: Map<String, Value>,
    ) -> std::result::Result<WriteResult, WebhookError> {
        let written = self.source.replace(definitions).await?;
        info!(update_time = %written.update_time, "Definitions replaced");
        Ok(written)
    }

    /// Fulfill a webhook request for `endpoint`.
    #[instrument(skip(self, request))]
    pub fn fulfill(
        &self,
        endpoint: &str,
        request: WebhookRequest,
    ) -> std::result::Result<WebhookResponse, WebhookError> {
        fulfill(&self.cache, &self.handlers, endpoint, request)
    }

    /// Registered handlers.
    pub fn list_handlers(&self) -> Vec<HandlerInfo> {
        self.handlers.handler_info()
    }

    pub fn health(&self) -> HealthReport {
        let ready = self.is_ready();
        HealthReport {
            status: if ready { "healthy" } else { "starting" },
            agent: self.cache.agent_name().to_string(),
            ready,
            templates: self.cache.len(),
            revision: self.cache.revision(),
            listener: self.listener.get().map(ListenerMonitor::stats),
            timestamp: Utc::now(),
        }
    }
}
