// ABOUTME: Storage key derivation from a per-application prefix.
// ABOUTME: Keeps multiple logical applications from colliding in one shared backend.

/// Well-known storage keys for one application, all derived from a single
/// prefix so that several apps can share one local store or remote backend.
#[derive(Debug, Clone)]
pub struct StorageKeys {
    prefix: String,
}

impl StorageKeys {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// The application prefix itself, used to scope rows in shared tables.
    pub fn app_id(&self) -> &str {
        &self.prefix
    }

    /// Key holding the persisted SyncState (active source + configs).
    pub fn sync_state(&self) -> String {
        format!("{}_datasource_config", self.prefix)
    }

    /// Key holding the base64-encoded database snapshot.
    pub fn snapshot(&self) -> String {
        format!("{}_sqldb", self.prefix)
    }

    /// Key holding the query history list.
    pub fn history(&self) -> String {
        format!("{}_sql_history", self.prefix)
    }

    /// Key holding the snapshot manager's remote location config.
    pub fn db_location(&self) -> String {
        format!("{}_db_location", self.prefix)
    }
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self::new("datastash")
    }
}
