// ABOUTME: Defines the StorageBackend trait that all backend adapters implement.
// ABOUTME: Read resolves to None on any failure; write returns a bool; probes return an outcome.

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use datastash_core::{SourceId, StoreError};

/// Result of a connectivity probe against a candidate configuration.
/// Probe failures are data, not errors — only a missing required config
/// field surfaces as `Err` before any network call.
#[derive(Debug, Clone, Serialize)]
pub struct ProbeOutcome {
    pub success: bool,
    pub message: String,
}

impl ProbeOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// The uniform contract every backend adapter implements.
///
/// A read failure (network, parse, or missing config) resolves to `None`,
/// indistinguishable from "key never written" — callers must treat `None`
/// as no data. A write failure returns `false` and logs the cause; callers
/// must not assume persistence succeeded on `false`.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Which source kind this adapter serves.
    fn source(&self) -> SourceId;

    /// Fetch the value stored under `key`, or `None`.
    async fn read(&self, key: &str) -> Option<Value>;

    /// Persist `value` under `key`. Returns whether the write is believed
    /// to have succeeded under this backend's own guarantee.
    async fn write(&self, key: &str, value: &Value) -> bool;

    /// Lightweight reachability check for a candidate configuration.
    async fn probe(&self) -> Result<ProbeOutcome, StoreError>;
}

/// Map a reqwest failure to the shared error taxonomy.
pub(crate) fn network_err(e: reqwest::Error) -> StoreError {
    StoreError::Network(e.to_string())
}
