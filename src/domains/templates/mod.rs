//! Templates domain module.
//!
//! Endpoint templates are authored as raw definitions in a remote document,
//! compiled once on ingestion and kept in a shared cache for per-request
//! execution.
//!
//! ## Architecture
//!
//! - `prototype.rs` - Template source compiler and renderer
//! - `template.rs` - Compiled template with argument validation
//! - `cache.rs` - Concurrent endpoint -> template cache
//! - `error.rs` - Template-specific error types

mod cache;
mod error;
pub mod prototype;
mod template;

pub use cache::{StoreOutcome, TemplateCache};
pub use error::TemplateError;
pub use prototype::Prototype;
pub use template::{Template, TemplateDefinition};
