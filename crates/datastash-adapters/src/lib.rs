// ABOUTME: Backend adapters implementing the uniform read/write contract per storage protocol.
// ABOUTME: Also hosts the DataSourceManager facade that dispatches to the active adapter.

pub mod backend;
pub mod bin_store;
pub mod endpoint;
pub mod gist;
pub mod local;
pub mod manager;
pub mod repo;
pub mod sheets;

pub use backend::{ProbeOutcome, StorageBackend};
pub use manager::DataSourceManager;
pub use repo::{RemoteFile, RepoFileClient, RepoSyncConfig};

/// User agent sent on every outbound request; some remote APIs reject
/// requests without one.
pub const USER_AGENT: &str = concat!("datastash/", env!("CARGO_PKG_VERSION"));

/// Build the shared HTTP client used by all remote adapters.
pub fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new())
}
