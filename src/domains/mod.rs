//! Domains module containing business logic organized by bounded contexts.
//!
//! - **templates**: compiled templates and the live template cache
//! - **sync**: document sources and the change listener feeding the cache
//! - **webhooks**: handler registry and per-request fulfillment

pub mod sync;
pub mod templates;
pub mod webhooks;
