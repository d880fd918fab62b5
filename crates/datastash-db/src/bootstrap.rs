// ABOUTME: Startup auto-discovery: local snapshot first, then the shared remote.
// ABOUTME: Local-development origins never touch the network.

use async_trait::async_trait;

use datastash_adapters::{RepoFileClient, RepoSyncConfig};
use datastash_core::StoreError;

use crate::engine::EngineError;
use crate::sync::SnapshotManager;

/// Where the startup database came from, if anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapOutcome {
    LoadedLocal,
    LoadedRemote,
    Unloaded,
}

/// Whether an origin string names a local development context. Such
/// contexts skip remote discovery entirely so development never reads
/// shared data by accident.
pub fn is_local_origin(origin: &str) -> bool {
    let origin = origin.trim().to_ascii_lowercase();
    if origin.starts_with("file:") {
        return true;
    }

    let host = origin
        .strip_prefix("https://")
        .or_else(|| origin.strip_prefix("http://"))
        .unwrap_or(&origin);
    let host = host.split(['/', ':']).next().unwrap_or("");

    host == "localhost"
        || host == "127.0.0.1"
        || host.starts_with("192.168.")
        || host.starts_with("10.")
}

/// Source of the default remote snapshot, abstracted so bootstrap logic
/// is testable without a network.
#[async_trait]
pub trait SnapshotFetcher: Send + Sync {
    /// Fetch the shared snapshot's bytes. `Ok(None)` means the remote
    /// file does not exist.
    async fn fetch_default(&self) -> Result<Option<Vec<u8>>, StoreError>;
}

/// Fetches the default snapshot from a repository file.
pub struct RepoSnapshotFetcher {
    client: RepoFileClient,
    config: RepoSyncConfig,
}

impl RepoSnapshotFetcher {
    pub fn new(client: RepoFileClient, config: RepoSyncConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl SnapshotFetcher for RepoSnapshotFetcher {
    async fn fetch_default(&self) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self
            .client
            .fetch_file(&self.config)
            .await?
            .map(|f| f.content))
    }
}

/// Decide where the startup database comes from: the local snapshot if
/// one restores, otherwise the shared remote, unless the origin is a
/// local development context. Remote failures of any kind leave the
/// manager unloaded rather than failing startup.
pub async fn bootstrap(
    manager: &mut SnapshotManager,
    origin: &str,
    fetcher: &dyn SnapshotFetcher,
) -> Result<BootstrapOutcome, EngineError> {
    if manager.load_local()? {
        tracing::info!("database restored from local snapshot");
        return Ok(BootstrapOutcome::LoadedLocal);
    }

    if is_local_origin(origin) {
        tracing::info!(origin, "local development context, skipping remote discovery");
        return Ok(BootstrapOutcome::Unloaded);
    }

    let bytes = match fetcher.fetch_default().await {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            tracing::debug!("no shared remote snapshot available");
            return Ok(BootstrapOutcome::Unloaded);
        }
        Err(e) => {
            tracing::debug!(error = %e, "remote discovery failed, starting unloaded");
            return Ok(BootstrapOutcome::Unloaded);
        }
    };

    match manager.load_bytes(&bytes) {
        Ok(()) => {
            tracing::info!("database restored from shared remote snapshot");
            Ok(BootstrapOutcome::LoadedRemote)
        }
        Err(EngineError::Store(StoreError::Deserialization(e))) => {
            tracing::debug!(error = %e, "remote snapshot unreadable, starting unloaded");
            Ok(BootstrapOutcome::Unloaded)
        }
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use datastash_core::{MemoryStore, StorageKeys};

    struct FakeFetcher {
        calls: AtomicUsize,
        result: Option<Vec<u8>>,
    }

    impl FakeFetcher {
        fn returning(result: Option<Vec<u8>>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                result,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl SnapshotFetcher for FakeFetcher {
        async fn fetch_default(&self) -> Result<Option<Vec<u8>>, StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.result.clone())
        }
    }

    fn manager_with(store: Arc<MemoryStore>) -> SnapshotManager {
        SnapshotManager::new(store, StorageKeys::new("testapp"))
    }

    fn snapshot_bytes() -> Vec<u8> {
        let mut mgr = manager_with(Arc::new(MemoryStore::new()));
        mgr.execute("CREATE TABLE t (v TEXT)").unwrap();
        mgr.execute("INSERT INTO t VALUES ('from-remote')").unwrap();
        mgr.export_bytes().unwrap()
    }

    #[test]
    fn local_origins_are_recognized() {
        assert!(is_local_origin("http://localhost:3000"));
        assert!(is_local_origin("http://127.0.0.1"));
        assert!(is_local_origin("http://192.168.1.5:8080"));
        assert!(is_local_origin("http://10.0.0.2"));
        assert!(is_local_origin("file:///home/me/index.html"));

        assert!(!is_local_origin("https://example.com"));
        assert!(!is_local_origin("https://10x.example.com"));
        assert!(!is_local_origin("https://mylocalhost.example.com"));
    }

    #[tokio::test]
    async fn local_snapshot_wins_without_network() {
        let store = Arc::new(MemoryStore::new());
        let mut seeded = manager_with(store.clone());
        seeded.execute("CREATE TABLE t (v)").unwrap();

        let mut mgr = manager_with(store);
        let fetcher = FakeFetcher::returning(Some(snapshot_bytes()));
        let outcome = bootstrap(&mut mgr, "https://example.com", &fetcher)
            .await
            .unwrap();

        assert_eq!(outcome, BootstrapOutcome::LoadedLocal);
        assert_eq!(fetcher.calls(), 0, "local restore must not touch the network");
    }

    #[tokio::test]
    async fn local_dev_origin_skips_remote_discovery() {
        let mut mgr = manager_with(Arc::new(MemoryStore::new()));
        let fetcher = FakeFetcher::returning(Some(snapshot_bytes()));
        let outcome = bootstrap(&mut mgr, "http://localhost:3000", &fetcher)
            .await
            .unwrap();

        assert_eq!(outcome, BootstrapOutcome::Unloaded);
        assert_eq!(fetcher.calls(), 0);
        assert!(!mgr.is_loaded());
    }

    #[tokio::test]
    async fn public_origin_loads_the_remote_snapshot() {
        let mut mgr = manager_with(Arc::new(MemoryStore::new()));
        let fetcher = FakeFetcher::returning(Some(snapshot_bytes()));
        let outcome = bootstrap(&mut mgr, "https://example.com", &fetcher)
            .await
            .unwrap();

        assert_eq!(outcome, BootstrapOutcome::LoadedRemote);
        assert_eq!(fetcher.calls(), 1);
        let out = mgr.execute("SELECT v FROM t").unwrap();
        assert_eq!(out.rows[0][0], serde_json::json!("from-remote"));
    }

    #[tokio::test]
    async fn missing_remote_leaves_manager_unloaded() {
        let mut mgr = manager_with(Arc::new(MemoryStore::new()));
        let fetcher = FakeFetcher::returning(None);
        let outcome = bootstrap(&mut mgr, "https://example.com", &fetcher)
            .await
            .unwrap();

        assert_eq!(outcome, BootstrapOutcome::Unloaded);
        assert!(!mgr.is_loaded());
    }

    #[tokio::test]
    async fn garbage_remote_bytes_leave_manager_unloaded() {
        let mut mgr = manager_with(Arc::new(MemoryStore::new()));
        let fetcher = FakeFetcher::returning(Some(b"not a database".to_vec()));
        let outcome = bootstrap(&mut mgr, "https://example.com", &fetcher)
            .await
            .unwrap();

        assert_eq!(outcome, BootstrapOutcome::Unloaded);
        assert!(!mgr.is_loaded());
    }

    struct FailingFetcher;

    #[async_trait]
    impl SnapshotFetcher for FailingFetcher {
        async fn fetch_default(&self) -> Result<Option<Vec<u8>>, StoreError> {
            Err(StoreError::Network("connection refused".to_string()))
        }
    }

    #[tokio::test]
    async fn remote_failure_is_swallowed() {
        let mut mgr = manager_with(Arc::new(MemoryStore::new()));
        let outcome = bootstrap(&mut mgr, "https://example.com", &FailingFetcher)
            .await
            .unwrap();
        assert_eq!(outcome, BootstrapOutcome::Unloaded);
    }
}
