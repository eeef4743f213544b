//! Transport service - runs the configured transport.

use tokio_util::sync::CancellationToken;
use tracing::info;

use super::http::HttpTransport;
use super::{TransportConfig, TransportResult};
use crate::core::GraffitiServer;

/// Transport service - manages the transport layer for the server.
pub struct TransportService {
    config: TransportConfig,
}

impl TransportService {
    /// Create a new transport service with the given configuration.
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }

    /// Log information about the configured transport.
    pub fn log_info(&self) {
        info!("Starting transport: {}", self.config.description());
    }

    /// Serve `server` until `cancel` fires.
    pub async fn run(self, server: GraffitiServer, cancel: CancellationToken) -> TransportResult<()> {
        self.log_info();
        HttpTransport::new(self.config).run(server, cancel).await
    }
}
