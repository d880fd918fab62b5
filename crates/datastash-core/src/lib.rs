// ABOUTME: Core types for the datastash storage sync layer.
// ABOUTME: Source registry, sync state, error taxonomy, and the local durable store abstraction.

pub mod error;
pub mod keys;
pub mod local;
pub mod source;
pub mod state;

pub use error::StoreError;
pub use keys::StorageKeys;
pub use local::{FileStore, LocalStore, MemoryStore};
pub use source::{ConfigField, SourceDescriptor, SourceId, descriptor, registry};
pub use state::{SourceConfig, SyncState, non_empty};
