// ABOUTME: Gist adapter: reads a named file out of a gist, writes via partial update.
// ABOUTME: Reads work on public gists without a token; writes require one.

use async_trait::async_trait;
use serde_json::{Value, json};

use datastash_core::{SourceConfig, SourceId, StoreError, non_empty};

use crate::backend::{ProbeOutcome, StorageBackend, network_err};

const DEFAULT_API_BASE: &str = "https://api.github.com";

/// Backend storing all data as one JSON file inside a gist.
pub struct GistBackend {
    client: reqwest::Client,
    api_base: String,
    gist_id: Option<String>,
    filename: String,
    token: Option<String>,
}

impl GistBackend {
    pub fn from_config(client: reqwest::Client, config: &SourceConfig) -> Self {
        Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
            gist_id: non_empty(config, "gist_id").map(String::from),
            filename: non_empty(config, "filename")
                .unwrap_or("data.json")
                .to_string(),
            token: non_empty(config, "token").map(String::from),
        }
    }

    /// Point the adapter at a different API host (used by tests).
    pub fn with_api_base(mut self, base: impl Into<String>) -> Self {
        self.api_base = base.into();
        self
    }

    fn gist_url(&self, gist_id: &str) -> String {
        format!("{}/gists/{}", self.api_base, gist_id)
    }

    fn authorize(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.header("Authorization", format!("token {}", token)),
            None => req,
        }
    }
}

/// Extract and parse the named file's content from a gist response body.
pub fn parse_gist_file(gist: &Value, filename: &str) -> Option<Value> {
    let content = gist
        .get("files")
        .and_then(|f| f.get(filename))
        .and_then(|f| f.get("content"))
        .and_then(|c| c.as_str())?;
    serde_json::from_str(content).ok()
}

/// Build the PATCH body replacing one file's content wholesale.
pub fn build_gist_patch(filename: &str, value: &Value) -> Value {
    let pretty = serde_json::to_string_pretty(value).unwrap_or_else(|_| "null".to_string());
    json!({ "files": { filename: { "content": pretty } } })
}

#[async_trait]
impl StorageBackend for GistBackend {
    fn source(&self) -> SourceId {
        SourceId::Gist
    }

    async fn read(&self, key: &str) -> Option<Value> {
        let gist_id = self.gist_id.as_deref()?;

        let result = self
            .authorize(self.client.get(self.gist_url(gist_id)))
            .send()
            .await;

        match result {
            Ok(resp) => match resp.json::<Value>().await {
                Ok(gist) => parse_gist_file(&gist, &self.filename),
                Err(e) => {
                    tracing::warn!(key, error = %e, "gist response was not JSON");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(key, error = %e, "gist read failed");
                None
            }
        }
    }

    async fn write(&self, _key: &str, value: &Value) -> bool {
        let (Some(gist_id), Some(_)) = (self.gist_id.as_deref(), self.token.as_deref()) else {
            tracing::warn!("gist write skipped: gist_id and token are required");
            return false;
        };

        let body = build_gist_patch(&self.filename, value);

        match self
            .authorize(self.client.patch(self.gist_url(gist_id)))
            .json(&body)
            .send()
            .await
        {
            Ok(resp) if resp.status().is_success() => true,
            Ok(resp) => {
                tracing::warn!(status = %resp.status(), "gist update rejected");
                false
            }
            Err(e) => {
                tracing::warn!(error = %e, "gist write failed");
                false
            }
        }
    }

    async fn probe(&self) -> Result<ProbeOutcome, StoreError> {
        let gist_id = self
            .gist_id
            .as_deref()
            .ok_or_else(|| StoreError::ConfigMissing("gist_id".to_string()))?;

        let resp = self
            .authorize(self.client.get(self.gist_url(gist_id)))
            .send()
            .await
            .map_err(network_err)?;

        if resp.status().is_success() {
            Ok(ProbeOutcome::ok("connected to gist"))
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
    fn parse_extracts_named_file() {
        let gist = json!({
            "files": {
                "data.json": { "content": "{\"users\": [1, 2]}" },
                "notes.md": { "content": "not json" }
            }
        });

        let value = parse_gist_file(&gist, "data.json").unwrap();
        assert_eq!(value, json!({"users": [1, 2]}));
    }

    #[test]
    fn parse_missing_file_is_none() {
        let gist = json!({"files": {}});
        assert_eq!(parse_gist_file(&gist, "data.json"), None);
    }

    #[test]
    fn parse_non_json_content_is_none() {
        let gist = json!({"files": {"data.json": {"content": "{oops"}}});
        assert_eq!(parse_gist_file(&gist, "data.json"), None);
    }

    #[test]
    fn patch_body_pretty_prints_content() {
        let body = build_gist_patch("data.json", &json!({"a": 1}));
        let content = body["files"]["data.json"]["content"].as_str().unwrap();
        assert!(content.contains('\n'), "content should be pretty-printed");
        let back: Value = serde_json::from_str(content).unwrap();
        assert_eq!(back, json!({"a": 1}));
    }

    #[tokio::test]
    async fn read_without_gist_id_is_none() {
        let b = GistBackend::from_config(reqwest::Client::new(), &cfg(&[]));
        assert_eq!(b.read("users").await, None);
    }

    #[tokio::test]
    async fn write_without_token_fails() {
        let b = GistBackend::from_config(reqwest::Client::new(), &cfg(&[("gist_id", "abc")]));
        assert!(!b.write("users", &json!([])).await);
    }

    #[tokio::test]
    async fn probe_without_gist_id_is_config_missing() {
        let b = GistBackend::from_config(reqwest::Client::new(), &cfg(&[]));
        let err = b.probe().await.unwrap_err();
        assert!(matches!(err, StoreError::ConfigMissing(f) if f == "gist_id"));
    }

    #[test]
    fn filename_defaults_when_absent() {
        let b = GistBackend::from_config(reqwest::Client::new(), &cfg(&[("gist_id", "abc")]));
        assert_eq!(b.filename, "data.json");
    }
}
