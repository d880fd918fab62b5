// ABOUTME: Hosted-bin adapter: versioned JSON bins behind a static master key.
// ABOUTME: Reads take the latest version's record field; writes replace the bin wholesale.

use async_trait::async_trait;
use serde_json::Value;

use datastash_core::{SourceConfig, SourceId, StoreError, non_empty};

use crate::backend::{ProbeOutcome, StorageBackend, network_err};

const DEFAULT_API_BASE: &str = "https://api.jsonbin.io/v3";
const KEY_HEADER: &str = "X-Master-Key";

/// Backend over a hosted JSON bin service.
pub struct HostedBinBackend {
    client: reqwest::Client,
    api_base: String,
    bin_id: Option<String>,
    api_key: Option<String>,
}

impl HostedBinBackend {
    pub fn from_config(client: reqwest::Client, config: &SourceConfig) -> Self {
        Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
            bin_id: non_empty(config, "bin_id").map(String::from),
            api_key: non_empty(config, "api_key").map(String::from),
        }
    }

    /// Point the adapter at a different API host (used by tests).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    fn creds(&self) -> Option<(&str, &str)> {
        Some((self.bin_id.as_deref()?, self.api_key.as_deref()?))
    }
}

/// Pull the stored record out of a bin read response.
pub fn extract_record(body: &Value) -> Option<Value> {
    body.get("record").cloned()
}

#[async_trait]
impl StorageBackend for HostedBinBackend {
    fn source(&self) -> SourceId {
        SourceId::HostedBin
    }

    async fn read(&self, key: &str) -> Option<Value> {
        let (bin_id, api_key) = self.creds()?;
        let url = format!("{}/b/{}/latest", self.api_base, bin_id);

        let result = self
            .client
            .get(url)
            .header(KEY_HEADER, api_key)
            .send()
            .await;

        match result {
            Ok(resp) => match resp.json::<Value>().await {
                Ok(body) => extract_record(&body),
                Err(e) => {
                    tracing::warn!(key, error = %e, "bin response was not JSON");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(key, error = %e, "bin read failed");
                None
            }
        }
    }

    async fn write(&self, key: &str, value: &Value) -> bool {
        let Some((bin_id, api_key)) = self.creds() else {
            tracing::warn!(key, "bin write skipped: bin_id and api_key are required");
            return false;
        };
        let url = format!("{}/b/{}", self.api_base, bin_id);

        match self
            .client
            .put(url)
            .header(KEY_HEADER, api_key)
            .json(value)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                tracing::warn!(key, status = %resp.status(), "bin update rejected");
                false
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "bin write failed");
                false
            }
        }
    }

    async fn probe(&self) -> Result<ProbeOutcome, StoreError> {
        let bin_id = self
            .bin_id
            .as_deref()
            .ok_or_else(|| StoreError::ConfigMissing("bin_id".to_string()))?;
        let api_key = self
            .api_key
            .as_deref()
            .ok_or_else(|| StoreError::ConfigMissing("api_key".to_string()))?;

        let url = format!("{}/b/{}", self.api_base, bin_id);
        let resp = self
            .client
            .get(url)
            .header(KEY_HEADER, api_key)
            .send()
            .await
            .map_err(network_err)?;

        if resp.status().is_success() {
            Ok(ProbeOutcome::ok("connected to bin"))
        } else {
            Ok(ProbeOutcome::failed(format!("failed: {}", resp.status())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn cfg(pairs: &[(&str, &str)]) -> SourceConfig {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn extract_record_takes_record_field() {
        let body = json!({"record": {"users": []}, "metadata": {"id": "x"}});
        assert_eq!(extract_record(&body), Some(json!({"users": []})));
        assert_eq!(extract_record(&json!({"metadata": {}})), None);
    }

    #[tokio::test]
    async fn read_without_credentials_is_none() {
        let b = HostedBinBackend::from_config(reqwest::Client::new(), &cfg(&[("bin_id", "b1")]));
        assert_eq!(b.read("users").await, None);
    }

    #[tokio::test]
    async fn write_without_credentials_fails() {
        let b = HostedBinBackend::from_config(reqwest::Client::new(), &cfg(&[]));
        assert!(!b.write("users", &json!([])).await);
    }

    #[tokio::test]
    async fn probe_reports_first_missing_field() {
        let b = HostedBinBackend::from_config(reqwest::Client::new(), &cfg(&[]));
        let err = b.probe().await.unwrap_err();
        assert!(matches!(err, StoreError::ConfigMissing(f) if f == "bin_id"));

        let b = HostedBinBackend::from_config(reqwest::Client::new(), &cfg(&[("bin_id", "b1")]));
        let err = b.probe().await.unwrap_err();
        assert!(matches!(err, StoreError::ConfigMissing(f) if f == "api_key"));
    }
}
