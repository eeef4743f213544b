//! Handler definitions module.
//!
//! A handler supplies the calculated variables a template declares. Each
//! handler is defined in its own file with:
//! - Metadata (name, description, variables it can supply)
//! - The calculation itself
//!
//! ## Adding a New Handler
//!
//! 1. Create a new file (e.g., `my_handler.rs`)
//! 2. Implement the `HandlerDefinition` trait
//! 3. Export it here
//! 4. Register in `registry.rs`

mod clock;
mod default;
mod universal_answer;

pub use clock::ClockHandler;
pub use default::DefaultHandler;
pub use universal_answer::UniversalAnswerHandler;

use super::payload::WebhookRequest;

/// Trait for handler definitions.
pub trait HandlerDefinition {
    /// The name templates refer to in `handler-name`.
    const NAME: &'static str;

    /// A description of what the handler supplies.
    const DESCRIPTION: &'static str;

    /// Variable names this handler can supply.
    fn variables() -> &'static [&'static str];

    /// Compute `variable` for `request`; `None` if this handler does not
    /// supply it.
    fn calculate(variable: &str, request: &WebhookRequest) -> Option<String>;
}
