//! Transport layer for the server.
//!
//! - **HTTP**: axum server for definitions, health and webhooks - feature: `http`
//!
//! Configuration and errors are always compiled so the library can be
//! configured without the server.

mod config;
mod error;

#[cfg(feature = "http")]
pub mod http;

#[cfg(feature = "http")]
mod service;

pub use config::TransportConfig;
pub use error::{TransportError, TransportResult};

#[cfg(feature = "http")]
pub use service::TransportService;
