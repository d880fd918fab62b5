// ABOUTME: Snapshot manager tying the engine to local autosave and the repo-file remote.
// ABOUTME: Every save serializes the complete database; pulls replace it wholesale.

use std::sync::Arc;

use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};

use datastash_adapters::{RepoFileClient, RepoSyncConfig};
use datastash_core::{LocalStore, StorageKeys, StoreError};

use crate::engine::{EngineError, QueryOutput, SqlEngine, TableInfo};
use crate::history::{HistoryEntry, QueryHistory};
use crate::users::{self, AppStatus, NewUser, UserError, UserRecord};

/// The conventional shared remote used when no location has been
/// configured. Public reads work without a token; pushes need one.
pub fn default_remote() -> RepoSyncConfig {
    RepoSyncConfig {
        owner: "AIUNITES".to_string(),
        repo: "AIUNITES-database-sync".to_string(),
        path: "data/app.db".to_string(),
        branch: "main".to_string(),
        token: None,
    }
}

/// Owns the embedded engine and keeps its serialized form in the local
/// store after every successful mutation, so a restart can restore the
/// exact database without touching the network.
pub struct SnapshotManager {
    engine: Option<SqlEngine>,
    store: Arc<dyn LocalStore>,
    keys: StorageKeys,
    history: QueryHistory,
}

impl SnapshotManager {
    pub fn new(store: Arc<dyn LocalStore>, keys: StorageKeys) -> Self {
        let history = QueryHistory::load(store.as_ref(), &keys.history());
        Self {
            engine: None,
            store,
            keys,
            history,
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.engine.is_some()
    }

    /// Start from an empty database and persist it immediately.
    pub fn create_empty(&mut self) -> Result<(), EngineError> {
        self.engine = Some(SqlEngine::new()?);
        self.autosave()
    }

    /// Replace the loaded database with the given serialized bytes.
    pub fn load_bytes(&mut self, bytes: &[u8]) -> Result<(), EngineError> {
        self.engine = Some(SqlEngine::from_bytes(bytes)?);
        self.autosave()
    }

    /// Restore the database from the locally stored snapshot. Returns
    /// whether a database ended up loaded; a corrupt snapshot logs and
    /// reports false instead of failing.
    pub fn load_local(&mut self) -> Result<bool, EngineError> {
        let Some(encoded) = self.store.get(&self.keys.snapshot()) else {
            return Ok(false);
        };

        let stripped: String = encoded.chars().filter(|c| !c.is_whitespace()).collect();
        let bytes = match BASE64.decode(stripped.as_bytes()) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(error = %e, "stored snapshot is not base64, ignoring");
                return Ok(false);
            }
        };

        match SqlEngine::from_bytes(&bytes) {
            Ok(engine) => {
                self.engine = Some(engine);
                Ok(true)
            }
            Err(EngineError::Store(StoreError::Deserialization(e))) => {
                tracing::warn!(error = %e, "stored snapshot unreadable, ignoring");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    /// Run one statement, record it in the history, and autosave on
    /// success. Failed statements are recorded too, with their error.
    pub fn execute(&mut self, sql: &str) -> Result<QueryOutput, EngineError> {
        if self.engine.is_none() {
            self.engine = Some(SqlEngine::new()?);
        }
        let engine = self.engine.as_mut().ok_or(EngineError::NotLoaded)?;

        match engine.execute(sql) {
            Ok(output) => {
                self.record_history(sql, true, None);
                self.autosave()?;
                Ok(output)
            }
            Err(e) => {
                self.record_history(sql, false, Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Serialize the current database into the local store.
    pub fn autosave(&mut self) -> Result<(), EngineError> {
        let engine = self.engine.as_ref().ok_or(EngineError::NotLoaded)?;
        let bytes = engine.export_bytes()?;
        self.store
            .set(&self.keys.snapshot(), &BASE64.encode(&bytes))?;
        tracing::debug!(bytes = bytes.len(), "snapshot autosaved");
        Ok(())
    }

    pub fn export_bytes(&self) -> Result<Vec<u8>, EngineError> {
        self.engine
            .as_ref()
            .ok_or(EngineError::NotLoaded)?
            .export_bytes()
    }

    /// Push the current database to the remote. Two phases: fetch the
    /// file's current SHA (absent when it does not exist yet), then PUT
    /// with that SHA as precondition. A concurrent update in between
    /// surfaces as `PreconditionMismatch`; the caller decides whether to
    /// pull and retry.
    pub async fn push_remote(
        &self,
        client: &RepoFileClient,
        cfg: &RepoSyncConfig,
    ) -> Result<(), EngineError> {
        let bytes = self.export_bytes()?;

        let sha = client.fetch_file(cfg).await?.map(|f| f.sha);
        let message = format!("Update {}", cfg.path);
        client
            .put_file(cfg, &bytes, sha.as_deref(), &message)
            .await?;
        tracing::info!(owner = %cfg.owner, repo = %cfg.repo, path = %cfg.path, "snapshot pushed");
        Ok(())
    }

    /// Replace the local database with the remote file, wholesale, and
    /// autosave the result. A missing remote file is an error; there is
    /// nothing sensible to replace with.
    pub async fn pull_remote(
        &mut self,
        client: &RepoFileClient,
        cfg: Option<&RepoSyncConfig>,
    ) -> Result<(), EngineError> {
        let fallback;
        let cfg = match cfg {
            Some(cfg) => cfg,
            None => {
                fallback = self.remote_location().unwrap_or_else(default_remote);
                &fallback
            }
        };

        let file = client
            .fetch_file(cfg)
            .await?
            .ok_or_else(|| StoreError::Network("remote database file not found".to_string()))?;

        self.load_bytes(&file.content)?;
        tracing::info!(owner = %cfg.owner, repo = %cfg.repo, path = %cfg.path, "snapshot pulled");
        Ok(())
    }

    /// The persisted remote location, if one has been configured.
    pub fn remote_location(&self) -> Option<RepoSyncConfig> {
        let raw = self.store.get(&self.keys.db_location())?;
        match serde_json::from_str(&raw) {
            Ok(cfg) => Some(cfg),
            Err(e) => {
                tracing::warn!(error = %e, "stored remote location unreadable, ignoring");
                None
            }
        }
    }

    pub fn set_remote_location(&mut self, cfg: &RepoSyncConfig) -> Result<(), StoreError> {
        self.store
            .set(&self.keys.db_location(), &serde_json::to_string(cfg)?)
    }

    pub fn tables(&self) -> Result<Vec<TableInfo>, EngineError> {
        self.engine.as_ref().ok_or(EngineError::NotLoaded)?.tables()
    }

    pub fn history(&self) -> &[HistoryEntry] {
        self.history.all()
    }

    pub fn recent_history(&self) -> &[HistoryEntry] {
        self.history.recent()
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
        if let Err(e) = self.history.save(self.store.as_ref(), &self.keys.history()) {
            tracing::warn!(error = %e, "failed to persist cleared history");
        }
    }

    fn record_history(&mut self, sql: &str, success: bool, error: Option<String>) {
        self.history.record(sql, success, error);
        if let Err(e) = self.history.save(self.store.as_ref(), &self.keys.history()) {
            tracing::warn!(error = %e, "failed to persist query history");
        }
    }

    // User helpers, scoped to this manager's application prefix. Each
    // mutation autosaves so the snapshot never lags the live state.

    pub fn register_user(&mut self, user: &NewUser) -> Result<UserRecord, EngineError> {
        self.ensure_engine()?;
        let result = {
            let engine = self.engine.as_ref().ok_or(EngineError::NotLoaded)?;
            users::ensure_users_table(engine.conn()).map_err(user_err)?;
            users::register_user(engine.conn(), self.keys.app_id(), user)
        };
        match result {
            Ok(record) => {
                self.autosave()?;
                Ok(record)
            }
            Err(e) => Err(user_err(e)),
        }
    }

    pub fn authenticate_user(
        &mut self,
        username_or_email: &str,
        password: &str,
    ) -> Result<Option<UserRecord>, EngineError> {
        self.ensure_engine()?;
        let matched = {
            let engine = self.engine.as_ref().ok_or(EngineError::NotLoaded)?;
            users::ensure_users_table(engine.conn()).map_err(user_err)?;
            users::authenticate_user(engine.conn(), self.keys.app_id(), username_or_email, password)
                .map_err(user_err)?
        };
        if matched.is_some() {
            // last_login changed.
            self.autosave()?;
        }
        Ok(matched)
    }

    pub fn list_users(&mut self) -> Result<Vec<UserRecord>, EngineError> {
        self.ensure_engine()?;
        let engine = self.engine.as_ref().ok_or(EngineError::NotLoaded)?;
        users::ensure_users_table(engine.conn()).map_err(user_err)?;
        users::list_users(engine.conn(), self.keys.app_id()).map_err(user_err)
    }

    pub fn app_status(&mut self) -> Result<AppStatus, EngineError> {
        self.ensure_engine()?;
        let engine = self.engine.as_ref().ok_or(EngineError::NotLoaded)?;
        users::ensure_users_table(engine.conn()).map_err(user_err)?;
        users::app_status(engine.conn(), self.keys.app_id()).map_err(user_err)
    }

    fn ensure_engine(&mut self) -> Result<(), EngineError> {
        if self.engine.is_none() {
            self.engine = Some(SqlEngine::new()?);
        }
        Ok(())
    }
}

fn user_err(e: UserError) -> EngineError {
    match e {
        UserError::Sqlite(e) => EngineError::Sqlite(e),
        UserError::UsernameTaken => EngineError::UsernameTaken,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datastash_core::MemoryStore;

    fn manager() -> SnapshotManager {
        SnapshotManager::new(Arc::new(MemoryStore::new()), StorageKeys::new("testapp"))
    }

    fn manager_with(store: Arc<MemoryStore>) -> SnapshotManager {
        SnapshotManager::new(store, StorageKeys::new("testapp"))
    }

    #[test]
    fn execute_autosaves_and_survives_reload() {
        let store = Arc::new(MemoryStore::new());
        let mut mgr = manager_with(store.clone());
        mgr.execute("CREATE TABLE t (v TEXT)").unwrap();
        mgr.execute("INSERT INTO t VALUES ('kept')").unwrap();

        let mut restored = manager_with(store);
        assert!(restored.load_local().unwrap());
        let out = restored.execute("SELECT v FROM t").unwrap();
        assert_eq!(out.rows.len(), 1);
        assert_eq!(out.rows[0][0], serde_json::json!("kept"));
    }

    #[test]
    fn load_local_without_snapshot_is_false() {
        let mut mgr = manager();
        assert!(!mgr.load_local().unwrap());
        assert!(!mgr.is_loaded());
    }

    #[test]
    fn corrupt_snapshot_is_ignored_not_fatal() {
        let store = Arc::new(MemoryStore::new());
        store.set("testapp_sqldb", "!!not-base64!!").unwrap();
        let mut mgr = manager_with(store.clone());
        assert!(!mgr.load_local().unwrap());

        // Valid base64 of garbage bytes is ignored too.
        store
            .set("testapp_sqldb", &BASE64.encode(b"not a database"))
            .unwrap();
        let mut mgr = manager_with(store);
        assert!(!mgr.load_local().unwrap());
    }

    #[test]
    fn failed_queries_land_in_history_without_autosave() {
        let store = Arc::new(MemoryStore::new());
        let mut mgr = manager_with(store.clone());
        assert!(mgr.execute("SELEKT broken").is_err());

        assert_eq!(mgr.history().len(), 1);
        assert!(!mgr.history()[0].success);
        assert!(store.get("testapp_sqldb").is_none(), "no snapshot for a failed query");
    }

    #[test]
    fn clear_history_empties_the_persisted_list() {
        let store = Arc::new(MemoryStore::new());
        let mut mgr = manager_with(store.clone());
        mgr.execute("CREATE TABLE t (v)").unwrap();
        assert_eq!(mgr.history().len(), 1);

        mgr.clear_history();
        assert!(mgr.history().is_empty());

        // The cleared state is what a fresh manager sees.
        let restored = manager_with(store);
        assert!(restored.history().is_empty());
    }

    #[test]
    fn history_persists_across_managers() {
        let store = Arc::new(MemoryStore::new());
        let mut mgr = manager_with(store.clone());
        mgr.execute("CREATE TABLE t (v)").unwrap();

        let restored = manager_with(store);
        assert_eq!(restored.history().len(), 1);
        assert_eq!(restored.history()[0].query, "CREATE TABLE t (v)");
    }

    #[test]
    fn export_without_database_is_not_loaded() {
        let mgr = manager();
        assert!(matches!(mgr.export_bytes(), Err(EngineError::NotLoaded)));
    }

    #[test]
    fn remote_location_round_trips_without_token() {
        let mut mgr = manager();
        let cfg = RepoSyncConfig {
            token: Some("secret".to_string()),
            ..default_remote()
        };
        mgr.set_remote_location(&cfg).unwrap();

        let loaded = mgr.remote_location().unwrap();
        assert_eq!(loaded.owner, cfg.owner);
        assert_eq!(loaded.path, cfg.path);
        assert!(loaded.token.is_none(), "tokens are never persisted");
    }

    #[test]
    fn default_remote_points_at_shared_repository() {
        let cfg = default_remote();
        assert_eq!(cfg.owner, "AIUNITES");
        assert_eq!(cfg.repo, "AIUNITES-database-sync");
        assert_eq!(cfg.path, "data/app.db");
        assert_eq!(cfg.branch, "main");
    }

    #[test]
    fn user_helpers_share_the_app_scope() {
        let mut mgr = manager();
        let record = mgr
            .register_user(&NewUser {
                username: "alice".to_string(),
                email: "alice@example.com".to_string(),
                password: "pw".to_string(),
                first_name: String::new(),
                last_name: String::new(),
            })
            .unwrap();
        assert_eq!(record.app, "testapp");

        assert!(mgr.authenticate_user("alice", "pw").unwrap().is_some());
        assert!(mgr.authenticate_user("alice", "nope").unwrap().is_none());

        let status = mgr.app_status().unwrap();
        assert_eq!(status.user_count, 1);
    }

    #[test]
    fn registration_survives_reload_through_autosave() {
        let store = Arc::new(MemoryStore::new());
        let mut mgr = manager_with(store.clone());
        mgr.register_user(&NewUser {
            username: "alice".to_string(),
            email: "a@example.com".to_string(),
            password: "pw".to_string(),
            first_name: String::new(),
            last_name: String::new(),
        })
        .unwrap();

        let mut restored = manager_with(store);
        assert!(restored.load_local().unwrap());
        assert_eq!(restored.list_users().unwrap().len(), 1);
    }
}
