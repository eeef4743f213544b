//! Configuration management for the server.
//!
//! This module provides a centralized configuration structure that can be
//! populated from environment variables (and a `.env` file) or defaults.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::error::{Error, Result};
use super::transport::TransportConfig;
use crate::domains::sync::{ListenerConfig, SourceConfig};

/// Main configuration structure for the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server identification and metadata.
    pub server: ServerConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,

    /// Transport configuration.
    pub transport: TransportConfig,

    /// Where template definitions are read from.
    pub source: SourceConfig,

    /// Change listener tuning.
    pub listener: ListenerConfig,
}

/// Server identification configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// The name of the server, for logs and the root endpoint.
    pub name: String,

    /// The version of the server.
    pub version: String,

    /// Identifies the project owning the template cache.
    pub agent_name: String,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "trace").
    pub level: String,

    /// Whether to include timestamps in log output.
    pub with_timestamps: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                name: "graffiti".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                agent_name: "graffiti".to_string(),
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                with_timestamps: true,
            },
            transport: TransportConfig::default(),
            source: SourceConfig::default(),
            listener: ListenerConfig::default(),
        }
    }
}

impl Config {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from environment variables.
    ///
    /// Environment variables are expected to be prefixed with `GRAFFITI_`.
    /// For example: `GRAFFITI_AGENT_NAME`, `GRAFFITI_LOG_LEVEL`.
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let mut config = Self::default();

        if let Ok(name) = std::env::var("GRAFFITI_SERVER_NAME") {
            config.server.name = name;
        }

        if let Ok(agent) =
            std::env::var("GRAFFITI_AGENT_NAME").or_else(|_| std::env::var("PROJECT_ID"))
        {
            config.server.agent_name = agent;
        }

        if let Ok(level) = std::env::var("GRAFFITI_LOG_LEVEL") {
            config.logging.level = level;
        }

        if let Ok(timestamps) = std::env::var("GRAFFITI_LOG_TIMESTAMPS") {
            config.logging.with_timestamps = timestamps.parse().unwrap_or(true);
        }

        config.transport = TransportConfig::from_env();
        config.source = SourceConfig::from_env();
        config.listener = ListenerConfig::from_env();

        info!("Definitions source: {}", config.source.description());
        if config.listener.ready_timeout_ms.is_none() {
            warn!(
                "GRAFFITI_READY_TIMEOUT_MS not set - startup waits for the \
                 initial template load without a deadline"
            );
        }

        config
    }

    /// Check the configuration for values that cannot work.
    pub fn validate(&self) -> Result<()> {
        if self.server.agent_name.is_empty() {
            return Err(Error::config("agent name must not be empty"));
        }
        if self.transport.port == 0 {
            return Err(Error::config("HTTP port must be positive"));
        }
        self.source.validate().map_err(Error::config)?;
        self.listener.validate().map_err(Error::config)?;
        Ok(())
    }
}
