// ABOUTME: Bounded most-recent-first query history persisted in the local store.
// ABOUTME: 50 entries retained, 20 surfaced for display.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use datastash_core::{LocalStore, StoreError};

const MAX_RETAINED: usize = 50;
const MAX_DISPLAYED: usize = 20;

/// One executed query and how it went.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub query: String,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Most-recent-first list of executed queries, capped at 50 retained.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct QueryHistory {
    entries: Vec<HistoryEntry>,
}

impl QueryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore history from the local store; unreadable payloads start
    /// empty rather than failing.
    pub fn load(store: &dyn LocalStore, key: &str) -> Self {
        match store.get(key) {
            Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
                tracing::warn!(error = %e, "query history unreadable, starting empty");
                Self::new()
            }),
            None => Self::new(),
        }
    }

    pub fn save(&self, store: &dyn LocalStore, key: &str) -> Result<(), StoreError> {
        store.set(key, &serde_json::to_string(self)?)
    }

    /// Record a query at the front and drop anything past the cap.
    pub fn record(&mut self, query: &str, success: bool, error: Option<String>) {
        self.entries.insert(
            0,
            HistoryEntry {
                query: query.to_string(),
                success,
                error,
                timestamp: Utc::now(),
            },
        );
        self.entries.truncate(MAX_RETAINED);
    }

    /// The slice shown to users: at most 20 most recent entries.
    pub fn recent(&self) -> &[HistoryEntry] {
        &self.entries[..self.entries.len().min(MAX_DISPLAYED)]
    }

    pub fn all(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
