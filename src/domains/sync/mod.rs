//! Sync domain module.
//!
//! Keeps the template cache in step with the remote definitions document.
//!
//! ## Architecture
//!
//! - `source.rs` - The `DocumentSource` capability and snapshot types
//! - `memory.rs` - In-process source, used by tests and embedders
//! - `file.rs` - JSON file source for local development
//! - `firestore.rs` - Firestore REST source (feature `firestore`)
//! - `listener.rs` - Delivery/processing tasks and snapshot application
//! - `config.rs` - Source and listener configuration
//! - `error.rs` - Sync-specific error types

mod config;
mod error;
mod file;
#[cfg(feature = "firestore")]
mod firestore;
mod listener;
mod memory;
mod source;

pub use config::{FileSourceConfig, ListenerConfig, SourceConfig};
#[cfg(feature = "firestore")]
pub use config::FirestoreConfig;
pub use error::{SourceError, SyncError};
pub use file::FileDocumentSource;
#[cfg(feature = "firestore")]
pub use firestore::FirestoreDocumentSource;
pub use listener::{
    ApplyReport, CacheListener, ListenerHandle, ListenerMonitor, ListenerStats, apply_snapshot,
};
pub use memory::MemoryDocumentSource;
pub use source::{DocumentSource, Snapshot, SnapshotStream, WriteResult, parse_document};
