// ABOUTME: Shared error taxonomy for the storage layer.
// ABOUTME: Distinguishes config, network, precondition, quota, and deserialization failures.

use thiserror::Error;

/// Errors that can surface from storage operations. Adapter `read`/`write`
/// swallow these at the adapter boundary (returning `None`/`false`); only
/// user-invoked actions (probe, push, pull) propagate them.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A required configuration field is absent or empty. Surfaced before
    /// any network call is made.
    #[error("missing required config field: {0}")]
    ConfigMissing(String),

    /// The request failed at the transport level or returned a non-2xx
    /// status.
    #[error("network failure: {0}")]
    Network(String),

    /// An optimistic write carried a content hash that no longer matches
    /// the remote. The caller needs a fresh fetch; this is not transient
    /// and is never retried automatically.
    #[error("remote content changed since last fetch")]
    PreconditionMismatch,

    /// The local durable store cannot accept more data.
    #[error("local storage quota exceeded")]
    QuotaExceeded,

    /// Bytes that were expected to be a valid snapshot are not.
    #[error("invalid snapshot: {0}")]
    Deserialization(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let errors = vec![
            StoreError::ConfigMissing("api_url".to_string()),
            StoreError::Network("connection refused".to_string()),
            StoreError::PreconditionMismatch,
            StoreError::QuotaExceeded,
            StoreError::Deserialization("not a database".to_string()),
        ];

        for err in &errors {
            assert!(!err.to_string().is_empty());
        }

        assert!(
            StoreError::ConfigMissing("api_url".to_string())
                .to_string()
                .contains("api_url")
        );
    }
}
