//! Transport configuration types.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// HTTP transport configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Port number to listen on.
    pub port: u16,

    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Enable CORS for browser clients.
    #[serde(default = "default_cors")]
    pub enable_cors: bool,

    /// How long in-flight requests get to finish on shutdown, in seconds.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_cors() -> bool {
    true
}

fn default_shutdown_timeout_secs() -> u64 {
    5
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            port: 8081,
            host: default_host(),
            enable_cors: default_cors(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl TransportConfig {
    /// Create an HTTP transport config.
    pub fn http(port: u16, host: impl Into<String>) -> Self {
        Self {
            port,
            host: host.into(),
            ..Default::default()
        }
    }

    /// Load transport config from environment variables.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(port) = std::env::var("GRAFFITI_HTTP_PORT")
            .or_else(|_| std::env::var("PORT"))
            .ok()
            .and_then(|p| p.parse().ok())
        {
            config.port = port;
        }
        if let Ok(host) = std::env::var("GRAFFITI_HTTP_HOST") {
            config.host = host;
        }
        if let Ok(cors) = std::env::var("GRAFFITI_HTTP_CORS") {
            config.enable_cors = cors.to_lowercase() != "false" && cors != "0";
        }
        if let Some(secs) = std::env::var("GRAFFITI_SHUTDOWN_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
        {
            config.shutdown_timeout_secs = secs;
        }

        config
    }

    /// Get the bind address.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Get a description of this transport for logging.
    pub fn description(&self) -> String {
        format!(
            "HTTP on {} (CORS {})",
            self.address(),
            if self.enable_cors { "enabled" } else { "disabled" }
        )
    }
}
