// ABOUTME: Embedded SQLite persistence path: snapshot manager, autosave, and remote sync.
// ABOUTME: Includes query history, app-scoped user helpers, and the auto-discovery bootstrapper.

pub mod bootstrap;
pub mod engine;
pub mod history;
pub mod sync;
pub mod users;

pub use bootstrap::{BootstrapOutcome, RepoSnapshotFetcher, SnapshotFetcher, bootstrap, is_local_origin};
pub use engine::{EngineError, QueryOutput, SqlEngine, TableInfo};
pub use history::{HistoryEntry, QueryHistory};
pub use sync::{SnapshotManager, default_remote};
pub use users::{AppStatus, NewUser, UserError, UserRecord};
