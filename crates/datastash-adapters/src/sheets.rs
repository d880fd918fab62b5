// ABOUTME: Spreadsheet-form adapter: JSON reads from a script endpoint, form posts for writes.
// ABOUTME: Writes are fire-and-forget; the submission protocol returns no confirmation.

use async_trait::async_trait;
use serde_json::Value;

use datastash_core::{SourceConfig, SourceId, StoreError, non_empty};

use crate::backend::{ProbeOutcome, StorageBackend, network_err};

/// Backend over a spreadsheet published through a script endpoint (reads)
/// and a form submission URL (writes).
pub struct SheetFormBackend {
    client: reqwest::Client,
    api_url: Option<String>,
    form_url: Option<String>,
}

impl SheetFormBackend {
    pub fn from_config(client: reqwest::Client, config: &SourceConfig) -> Self {
        Self {
            client,
            api_url: non_empty(config, "api_url").map(String::from),
            form_url: non_empty(config, "form_url").map(String::from),
        }
    }
}

#[async_trait]
impl StorageBackend for SheetFormBackend {
    fn source(&self) -> SourceId {
        SourceId::SpreadsheetForm
    }

    async fn read(&self, key: &str) -> Option<Value> {
        let api_url = self.api_url.as_deref()?;

        let result = self
            .client
            .get(api_url)
            .query(&[("action", "get"), ("key", key)])
            .send()
            .await;

        match result {
            Ok(resp) => match resp.json::<Value>().await {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(key, error = %e, "sheet read returned non-JSON");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(key, error = %e, "sheet read failed");
                None
            }
        }
    }

    /// Best-effort write: the form protocol returns no body and no usable
    /// status, so success means only that the request went out. Callers
    /// must not assert a read-back round-trip against this backend.
    async fn write(&self, _key: &str, value: &Value) -> bool {
        let Some(form_url) = self.form_url.as_deref() else {
            tracing::warn!("sheet write skipped: form_url not configured");
            return false;
        };

        let payload = match serde_json::to_string(value) {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(error = %e, "value not serializable");
                return false;
            }
        };

        match self
            .client
            .post(form_url)
            .form(&[("entry.0", payload.as_str())])
            .send()
            .await
        {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "sheet form submission failed");
                false
            }
        }
    }

    async fn probe(&self) -> Result<ProbeOutcome, StoreError> {
        let api_url = self
            .api_url
            .as_deref()
            .ok_or_else(|| StoreError::ConfigMissing("api_url".to_string()))?;

        let resp = self.client.get(api_url).send().await.map_err(network_err)?;
        if resp.status().is_success() {
            Ok(ProbeOutcome::ok("connected to spreadsheet endpoint"))
        } else {
            Ok(ProbeOutcome::failed(format!("failed: {}", resp.status())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cfg(pairs: &[(&str, &str)]) -> SourceConfig {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[tokio::test]
    async fn read_without_api_url_is_none() {
        let b = SheetFormBackend::from_config(reqwest::Client::new(), &cfg(&[]));
        assert_eq!(b.read("users").await, None);
    }

    #[tokio::test]
    async fn write_without_form_url_fails() {
        let b = SheetFormBackend::from_config(reqwest::Client::new(), &cfg(&[]));
        assert!(!b.write("users", &serde_json::json!([])).await);
    }

    #[tokio::test]
    async fn probe_without_api_url_is_config_missing() {
        let b = SheetFormBackend::from_config(
            reqwest::Client::new(),
            &cfg(&[("form_url", "https://example.com/form")]),
        );
        let err = b.probe().await.unwrap_err();
        assert!(matches!(err, StoreError::ConfigMissing(f) if f == "api_url"));
    }

    #[test]
    fn blank_config_values_are_ignored() {
        let b = SheetFormBackend::from_config(
            reqwest::Client::new(),
            &cfg(&[("api_url", "  "), ("form_url", "")]),
        );
        assert!(b.api_url.is_none());
        assert!(b.form_url.is_none());
    }
}
