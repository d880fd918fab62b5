// ABOUTME: Hosted-endpoint adapter: plain unauthenticated GET/POST of a JSON document.
// ABOUTME: The simplest remote backend; the endpoint id scopes the URL and nothing else.

use async_trait::async_trait;
use serde_json::Value;

use datastash_core::{SourceConfig, SourceId, StoreError, non_empty};

use crate::backend::{ProbeOutcome, StorageBackend, network_err};

const DEFAULT_API_BASE: &str = "https://api.npoint.io";

/// Backend over an identifier-scoped hosted JSON endpoint.
pub struct HostedEndpointBackend {
    client: reqwest::Client,
    api_base: String,
    endpoint_id: Option<String>,
}

impl HostedEndpointBackend {
    pub fn from_config(client: reqwest::Client, config: &SourceConfig) -> Self {
        Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
            endpoint_id: non_empty(config, "endpoint_id").map(String::from),
        }
    }

    /// Point the adapter at a different API host (used by tests).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    fn url(&self, endpoint_id: &str) -> String {
        format!("{}/{}", self.api_base, endpoint_id)
    }
}

#[async_trait]
impl StorageBackend for HostedEndpointBackend {
    fn source(&self) -> SourceId {
        SourceId::HostedEndpoint
    }

    async fn read(&self, key: &str) -> Option<Value> {
        let endpoint_id = self.endpoint_id.as_deref()?;

        match self.client.get(self.url(endpoint_id)).send().await {
            Ok(resp) => match resp.json::<Value>().await {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(key, error = %e, "endpoint response was not JSON");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(key, error = %e, "endpoint read failed");
                None
            }
        }
    }

    async fn write(&self, key: &str, value: &Value) -> bool {
        let Some(endpoint_id) = self.endpoint_id.as_deref() else {
            tracing::warn!(key, "endpoint write skipped: endpoint_id not configured");
            return false;
        };

        match self
            .client
            .post(self.url(endpoint_id))
            .json(value)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                tracing::warn!(key, status = %resp.status(), "endpoint update rejected");
                false
            }
            Err(e) => {
                tracing::warn!(key, error = %e, "endpoint write failed");
                false
            }
        }
    }

    async fn probe(&self) -> Result<ProbeOutcome, StoreError> {
        let endpoint_id = self
            .endpoint_id
            .as_deref()
            .ok_or_else(|| StoreError::ConfigMissing("endpoint_id".to_string()))?;

        let resp = self
            .client
            .get(self.url(endpoint_id))
            .send()
            .await
            .map_err(network_err)?;

        if resp.status().is_success() {
            Ok(ProbeOutcome::ok("connected to endpoint"))
        } else {
            Ok(ProbeOutcome::failed(format!("failed: {}", resp.status())))
        }
    }
}
