// ABOUTME: DataSourceManager facade: validates, activates, probes, and dispatches read/write.
// ABOUTME: Owns the persisted SyncState; adapter construction goes through a registry factory.

use std::sync::Arc;

use serde_json::Value;

use datastash_core::{
    LocalStore, SourceConfig, SourceId, StorageKeys, StoreError, SyncState, descriptor,
};

use crate::backend::{ProbeOutcome, StorageBackend};
use crate::bin_store::HostedBinBackend;
use crate::endpoint::HostedEndpointBackend;
use crate::gist::GistBackend;
use crate::local::LocalBackend;
use crate::repo::RepoFileBackend;
use crate::sheets::SheetFormBackend;

/// Facade over the active backend adapter. Loads SyncState from the local
/// store on construction, persists it on every activation, and dispatches
/// read/write to whichever adapter is active.
pub struct DataSourceManager {
    local: Arc<dyn LocalStore>,
    client: reqwest::Client,
    keys: StorageKeys,
    state: SyncState,
}

impl DataSourceManager {
    /// Load the manager, restoring persisted SyncState or starting from
    /// defaults (local store active, no configs).
    pub fn load(local: Arc<dyn LocalStore>, keys: StorageKeys) -> Self {
        let raw = local.get(&keys.sync_state());
        let state = SyncState::from_json(raw.as_deref());
        tracing::info!(active = %state.active_source, "data source manager loaded");

        Self {
            local,
            client: crate::http_client(),
            keys,
            state,
        }
    }

    /// Swap the HTTP client (used by tests to redirect adapters).
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    pub fn active_source(&self) -> SourceId {
        self.state.active_source
    }

    /// The stored config for a source, empty when none was saved.
    pub fn config_for(&self, id: SourceId) -> SourceConfig {
        self.state.config_for(id)
    }

    /// Validate the config against the source's descriptor, store it, mark
    /// the source active, and persist. Other sources' configs are never
    /// touched. Validation happens before anything else, so a bad config
    /// leaves the previous state fully intact.
    pub fn activate(&mut self, id: SourceId, config: SourceConfig) -> Result<(), StoreError> {
        validate_config(id, &config)?;

        self.state.activate(id, config);
        self.persist()?;
        tracing::info!(source = %id, "data source activated");
        Ok(())
    }

    /// Probe a candidate configuration without mutating any state. Missing
    /// required fields surface as `ConfigMissing` before any network call;
    /// an unreachable backend is a `ProbeOutcome` with `success: false`.
    pub async fn test_connection(
        &self,
        id: SourceId,
        config: &SourceConfig,
    ) -> Result<ProbeOutcome, StoreError> {
        validate_config(id, config)?;
        self.backend_for(id, config).probe().await
    }

    /// Read `key` through the active adapter. `None` means no data,
    /// whatever the underlying reason.
    pub async fn read(&self, key: &str) -> Option<Value> {
        let id = self.state.active_source;
        let config = self.state.config_for(id);
        self.backend_for(id, &config).read(key).await
    }

    /// Write `key` through the active adapter. `false` means the write
    /// must not be assumed persisted.
    pub async fn write(&self, key: &str, value: &Value) -> bool {
        let id = self.state.active_source;
        let config = self.state.config_for(id);
        self.backend_for(id, &config).write(key, value).await
    }

    fn persist(&self) -> Result<(), StoreError> {
        let json = serde_json::to_string(&self.state)?;
        self.local.set(&self.keys.sync_state(), &json)
    }

    /// Registry-driven adapter factory: one implementing type per source
    /// kind, all behind the same trait object.
    fn backend_for(&self, id: SourceId, config: &SourceConfig) -> Box<dyn StorageBackend> {
        match id {
            SourceId::LocalStore => Box::new(LocalBackend::new(Arc::clone(&self.local))),
            SourceId::SpreadsheetForm => {
                Box::new(SheetFormBackend::from_config(self.client.clone(), config))
            }
            SourceId::Gist => Box::new(GistBackend::from_config(self.client.clone(), config)),
            SourceId::RepoFile => Box::new(RepoFileBackend::from_config(self.client.clone(), config)),
            SourceId::HostedBin => {
                Box::new(HostedBinBackend::from_config(self.client.clone(), config))
            }
            SourceId::HostedEndpoint => {
                Box::new(HostedEndpointBackend::from_config(self.client.clone(), config))
            }
        }
    }
}

/// Check every required descriptor field is present and non-empty.
fn validate_config(id: SourceId, config: &SourceConfig) -> Result<(), StoreError> {
    let desc = descriptor(id);
    for field in desc.required_fields() {
        if datastash_core::non_empty(config, field).is_none() {
            return Err(StoreError::ConfigMissing(field.to_string()));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use datastash_core::MemoryStore;
    use serde_json::json;

    fn cfg(pairs: &[(&str, &str)]) -> SourceConfig {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn manager() -> (DataSourceManager, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let mgr = DataSourceManager::load(store.clone() as Arc<dyn LocalStore>, StorageKeys::default());
        (mgr, store)
    }

    #[tokio::test]
    async fn local_store_write_then_read_round_trips() {
        let (mut mgr, _store) = manager();
        mgr.activate(SourceId::LocalStore, SourceConfig::new()).unwrap();

        let users = json!([{"id": 1, "name": "a"}]);
        assert!(mgr.write("users", &users).await);
        assert_eq!(mgr.read("users").await, Some(users));
    }

    #[test]
    fn defaults_to_local_store() {
        let (mgr, _) = manager();
        assert_eq!(mgr.active_source(), SourceId::LocalStore);
    }

    #[test]
    fn activate_rejects_missing_required_fields() {
        let (mut mgr, _) = manager();

        let err = mgr
            .activate(SourceId::HostedBin, cfg(&[("bin_id", "b1")]))
            .unwrap_err();
        assert!(matches!(err, StoreError::ConfigMissing(f) if f == "api_key"));

        // The failed activation must not change the active source.
        assert_eq!(mgr.active_source(), SourceId::LocalStore);
    }

    #[test]
    fn activate_accepts_missing_optional_token() {
        let (mut mgr, _) = manager();
        mgr.activate(
            SourceId::RepoFile,
            cfg(&[
                ("owner", "x"),
                ("repo", "y"),
                ("path", "data/app.db"),
                ("branch", "main"),
            ]),
        )
        .unwrap();
        assert_eq!(mgr.active_source(), SourceId::RepoFile);
    }

    #[test]
    fn switching_sources_preserves_stored_configs() {
        let (mut mgr, _) = manager();

        let gist = cfg(&[("gist_id", "g1"), ("filename", "data.json"), ("token", "t")]);
        mgr.activate(SourceId::Gist, gist.clone()).unwrap();
        mgr.activate(SourceId::HostedEndpoint, cfg(&[("endpoint_id", "ep")]))
            .unwrap();

        assert_eq!(mgr.active_source(), SourceId::HostedEndpoint);
        assert_eq!(mgr.config_for(SourceId::Gist), gist);

        // Switch back without reconfiguring.
        let stored = mgr.config_for(SourceId::Gist);
        mgr.activate(SourceId::Gist, stored).unwrap();
        assert_eq!(mgr.active_source(), SourceId::Gist);
        assert_eq!(mgr.config_for(SourceId::Gist), gist);
    }

    #[test]
    fn state_survives_reload() {
        let store = Arc::new(MemoryStore::new());
        let keys = StorageKeys::new("reload_test");

        let mut mgr =
            DataSourceManager::load(store.clone() as Arc<dyn LocalStore>, keys.clone());
        mgr.activate(SourceId::HostedEndpoint, cfg(&[("endpoint_id", "ep")]))
            .unwrap();
        drop(mgr);

        let mgr = DataSourceManager::load(store as Arc<dyn LocalStore>, keys);
        assert_eq!(mgr.active_source(), SourceId::HostedEndpoint);
        assert_eq!(
            mgr.config_for(SourceId::HostedEndpoint)
                .get("endpoint_id")
                .map(String::as_str),
            Some("ep")
        );
    }

    #[tokio::test]
    async fn test_connection_rejects_config_before_network() {
        let (mgr, _) = manager();
        let err = mgr
            .test_connection(SourceId::Gist, &cfg(&[]))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::ConfigMissing(f) if f == "gist_id"));
    }

    #[tokio::test]
    async fn test_connection_local_store_always_succeeds() {
        let (mgr, _) = manager();
        let outcome = mgr
            .test_connection(SourceId::LocalStore, &SourceConfig::new())
            .await
            .unwrap();
        assert!(outcome.success);
    }

    #[tokio::test]
    async fn dispatch_with_no_stored_config_uses_empty_config() {
        // Force an active remote source with no config by writing state
        // directly, then verify dispatch degrades per the adapter contract.
        let store = Arc::new(MemoryStore::new());
        let keys = StorageKeys::default();
        let mut state = SyncState::new();
        state.active_source = SourceId::HostedEndpoint;
        store
            .set(&keys.sync_state(), &serde_json::to_string(&state).unwrap())
            .unwrap();

        let mgr = DataSourceManager::load(store as Arc<dyn LocalStore>, keys);
        assert_eq!(mgr.read("users").await, None);
        assert!(!mgr.write("users", &json!([])).await);
    }
}
