//! Graffiti Library
//!
//! A live template cache kept in sync with a remote definitions document,
//! and a webhook server that fills those templates per request.
//!
//! # Architecture
//!
//! - **core**: Configuration, error handling, the server facade and transport
//! - **domains**: Business logic organized by bounded contexts
//!   - **templates**: template compilation, execution and the cache
//!   - **sync**: document sources and the change listener
//!   - **webhooks**: handler registry and request fulfillment
//!
//! # Example
//!
//! ```rust,no_run
//! use graffiti::{core::Config, core::GraffitiServer};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::from_env();
//!     let server = GraffitiServer::new(config)?;
//!     let listener = server.start_listener(CancellationToken::new()).await?;
//!     // Serve requests...
//!     listener.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod core;
pub mod domains;

// Re-export commonly used types for convenience
pub use core::{Config, Error, GraffitiServer, Result};
