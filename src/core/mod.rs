//! Core module containing shared infrastructure components.
//!
//! This module provides the foundational building blocks for the server,
//! including error handling, configuration, the server facade and the
//! transport layer.

pub mod config;
pub mod error;
pub mod server;
pub mod transport;

pub use config::Config;
pub use error::{Error, Result};
pub use server::{GraffitiServer, HealthReport};
pub use transport::TransportConfig;

#[cfg(feature = "http")]
pub use transport::TransportService;
