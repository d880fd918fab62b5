// ABOUTME: Persisted SyncState: which source is active and every source's stored config.
// ABOUTME: Configs survive source switches so a user can switch back without reconfiguring.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::source::SourceId;

/// Per-source configuration: field name to value. Values are plain strings
/// (tokens, identifiers, URLs). Ordered map for stable serialization.
pub type SourceConfig = BTreeMap<String, String>;

/// Return the value for `key` only when present and non-empty.
pub fn non_empty<'a>(config: &'a SourceConfig, key: &str) -> Option<&'a str> {
    config.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// The persisted record of adapter selection and configuration. Exactly one
/// source is active at a time; activating a source never removes another
/// source's stored config.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncState {
    pub active_source: SourceId,
    #[serde(default)]
    pub configs: HashMap<SourceId, SourceConfig>,
    pub updated_at: DateTime<Utc>,
}

impl SyncState {
    /// Fresh state: local store active, no configs.
    pub fn new() -> Self {
        Self {
            active_source: SourceId::LocalStore,
            configs: HashMap::new(),
            updated_at: Utc::now(),
        }
    }

    /// Store a config for a source and make it the active one.
    pub fn activate(&mut self, id: SourceId, config: SourceConfig) {
        self.configs.insert(id, config);
        self.active_source = id;
        self.updated_at = Utc::now();
    }

    /// The stored config for a source, or an empty config when none exists.
    /// Dispatch always proceeds; the adapter's own contract decides how a
    /// missing config fails.
    pub fn config_for(&self, id: SourceId) -> SourceConfig {
        self.configs.get(&id).cloned().unwrap_or_default()
    }

    /// Parse persisted JSON, falling back to defaults when the payload is
    /// absent or unreadable.
    pub fn from_json(raw: Option<&str>) -> Self {
        match raw {
            Some(text) => serde_json::from_str(text).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "sync state unreadable, using defaults");
                Self::new()
            }),
            None => Self::new(),
        }
    }
}

impl Default for SyncState {
    fn default() -> Self {
        Self::new()
    }
}
