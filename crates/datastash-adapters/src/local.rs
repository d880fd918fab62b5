// ABOUTME: Adapter over the local durable store: JSON values in, JSON values out.
// ABOUTME: The default backend; always reachable, fails only on storage quota.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use datastash_core::{LocalStore, SourceId, StoreError};

use crate::backend::{ProbeOutcome, StorageBackend};

/// Backend over the local key-value tier. Reads parse the stored JSON
/// string; unparseable or absent entries read as `None`.
pub struct LocalBackend {
    store: Arc<dyn LocalStore>,
}

impl LocalBackend {
    pub fn new(store: Arc<dyn LocalStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn source(&self) -> SourceId {
        SourceId::LocalStore
    }

    async fn read(&self, key: &str) -> Option<Value> {
        let raw = self.store.get(key)?;
        match serde_json::from_str(&raw) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(key, error = %e, "local entry is not valid JSON");
                None
            }
        }
    }

    async fn write(&self, key: &str, value: &Value) -> bool {
        let serialized = match serde_json::to_string(value) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(key, error = %e, "value not serializable");
                return false;
            }
        };

        match self.store.set(key, &serialized) {
            Ok(()) => true,
            Err(StoreError::QuotaExceeded) => {
                tracing::warn!(key, "local write rejected: quota exceeded");
                false
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "local write failed");
                false
            }
        }
    }

    async fn probe(&self) -> Result<ProbeOutcome, StoreError> {
        Ok(ProbeOutcome::ok("local storage is always available"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use datastash_core::MemoryStore;
    use serde_json::json;

    fn backend() -> LocalBackend {
        LocalBackend::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn write_then_read_round_trips() {
        let b = backend();
        let value = json!([{"id": 1, "name": "a"}]);

        assert!(b.write("users", &value).await);
        assert_eq!(b.read("users").await, Some(value));
    }

    #[tokio::test]
    async fn absent_key_reads_none() {
        let b = backend();
        assert_eq!(b.read("missing").await, None);
    }

    #[tokio::test]
    async fn corrupt_entry_reads_none() {
        let store = Arc::new(MemoryStore::new());
        store.set("users", "{broken").unwrap();

        let b = LocalBackend::new(store);
        assert_eq!(b.read("users").await, None);
    }

    #[tokio::test]
    async fn probe_always_succeeds() {
        let outcome = backend().probe().await.unwrap();
        assert!(outcome.success);
    }
}
