//! Webhooks domain module.
//!
//! Turns a fulfillment request into a rendered response: the endpoint key
//! selects a template, session parameters and handler-calculated values fill
//! it in.
//!
//! ## Architecture
//!
//! - `definitions/` - Individual handler definitions (one file per handler)
//! - `registry.rs` - Central handler registration and dispatch
//! - `manager.rs` - Per-request fulfillment
//! - `payload.rs` - Request/response payloads
//! - `error.rs` - Webhook-specific error types
//!
//! ## Adding a New Handler
//!
//! 1. Create a new file in `definitions/` (e.g., `my_handler.rs`)
//! 2. Implement the `HandlerDefinition` trait
//! 3. Export in `definitions/mod.rs`
//! 4. Register in `registry.rs`

pub mod definitions;
mod error;
mod manager;
pub mod payload;
mod registry;

pub use definitions::HandlerDefinition;
pub use error::WebhookError;
pub use manager::{WebhookManager, fulfill};
pub use payload::{WebhookRequest, WebhookResponse};
pub use registry::{HandlerInfo, HandlerRegistry};
