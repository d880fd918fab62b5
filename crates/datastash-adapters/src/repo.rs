// ABOUTME: Repo-file protocol client and adapter: raw reads, two-phase optimistic writes.
// ABOUTME: The content SHA from the contents API is the precondition guarding every update.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use datastash_core::{SourceConfig, SourceId, StoreError, non_empty};

use crate::backend::{ProbeOutcome, StorageBackend, network_err};

const DEFAULT_API_BASE: &str = "https://api.github.com";
const DEFAULT_RAW_BASE: &str = "https://raw.githubusercontent.com";

/// Location of one file in a version-controlled remote repository.
/// Serialized when persisted as the snapshot manager's remote location;
/// the token is never written out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoSyncConfig {
    pub owner: String,
    pub repo: String,
    pub path: String,
    pub branch: String,
    #[serde(default, skip_serializing)]
    pub token: Option<String>,
}

impl RepoSyncConfig {
    /// Build from a stored source config, insisting on the fields a write
    /// cannot do without. `path` and `branch` carry the conventional
    /// defaults when unset.
    pub fn from_config(config: &SourceConfig) -> Result<Self, StoreError> {
        let owner = non_empty(config, "owner")
            .ok_or_else(|| StoreError::ConfigMissing("owner".to_string()))?;
        let repo = non_empty(config, "repo")
            .ok_or_else(|| StoreError::ConfigMissing("repo".to_string()))?;

        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            path: non_empty(config, "path").unwrap_or("data/database.json").to_string(),
            branch: non_empty(config, "branch").unwrap_or("main").to_string(),
            token: non_empty(config, "token").map(String::from),
        })
    }
}

/// A file fetched through the contents API: decoded bytes plus the content
/// SHA needed to update it.
#[derive(Debug, Clone)]
pub struct RemoteFile {
    pub content: Vec<u8>,
    pub sha: String,
}

/// Decode the base64 `content` field of a contents API response. The
/// remote wraps the payload with newlines; strip them before decoding.
pub fn decode_content_field(raw: &str) -> Result<Vec<u8>, StoreError> {
    let stripped: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    BASE64
        .decode(stripped.as_bytes())
        .map_err(|e| StoreError::Deserialization(format!("content field is not base64: {}", e)))
}

/// Build the PUT body for a create-or-update. `sha` is omitted on create
/// and required on update; the remote rejects a mismatch.
pub fn build_put_body(message: &str, content_b64: &str, sha: Option<&str>, branch: &str) -> Value {
    let mut body = json!({
        "message": message,
        "content": content_b64,
        "branch": branch,
    });
    if let Some(sha) = sha {
        body["sha"] = Value::String(sha.to_string());
    }
    body
}

/// Client for the repo-file remote protocol. Shared between the repo-file
/// adapter and the snapshot manager's push/pull path.
#[derive(Debug, Clone)]
pub struct RepoFileClient {
    client: reqwest::Client,
    api_base: String,
    raw_base: String,
}

impl RepoFileClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            api_base: DEFAULT_API_BASE.to_string(),
            raw_base: DEFAULT_RAW_BASE.to_string(),
        }
    }

    /// Point the client at different hosts (used by tests).
    pub fn with_bases(mut self, api_base: impl Into<String>, raw_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self.raw_base = raw_base.into();
        self
    }

    fn contents_url(&self, cfg: &RepoSyncConfig) -> String {
        format!(
            "{}/repos/{}/{}/contents/{}",
            self.api_base, cfg.owner, cfg.repo, cfg.path
        )
    }

    fn authorize(
        &self,
        req: reqwest::RequestBuilder,
        cfg: &RepoSyncConfig,
    ) -> reqwest::RequestBuilder {
        match &cfg.token {
            Some(token) => req.header("Authorization", format!("token {}", token)),
            None => req,
        }
    }

    /// Fetch the file's bytes and content SHA. `Ok(None)` means the file
    /// does not exist yet.
    pub async fn fetch_file(&self, cfg: &RepoSyncConfig) -> Result<Option<RemoteFile>, StoreError> {
        let resp = self
            .authorize(self.client.get(self.contents_url(cfg)), cfg)
            .query(&[("ref", cfg.branch.as_str())])
            .send()
            .await
            .map_err(network_err)?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            return Err(StoreError::Network(format!(
                "contents fetch failed: {}",
                resp.status()
            )));
        }

        let body: Value = resp.json().await.map_err(network_err)?;
        let sha = body
            .get("sha")
            .and_then(|s| s.as_str())
            .ok_or_else(|| StoreError::Deserialization("response missing sha".to_string()))?
            .to_string();
        let content_raw = body
            .get("content")
            .and_then(|c| c.as_str())
            .ok_or_else(|| StoreError::Deserialization("response missing content".to_string()))?;

        Ok(Some(RemoteFile {
            content: decode_content_field(content_raw)?,
            sha,
        }))
    }

    /// Create or update the file. Passing the SHA of the version last seen
    /// makes this an optimistic write: the remote rejects a stale SHA and
    /// we surface `PreconditionMismatch` without retrying.
    pub async fn put_file(
        &self,
        cfg: &RepoSyncConfig,
        content: &[u8],
        sha: Option<&str>,
        message: &str,
    ) -> Result<(), StoreError> {
        let body = build_put_body(message, &BASE64.encode(content), sha, &cfg.branch);

        let resp = self
            .authorize(self.client.put(self.contents_url(cfg)), cfg)
            .json(&body)
            .send()
            .await
            .map_err(network_err)?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        // The remote signals a stale or missing precondition SHA with a
        // conflict or unprocessable status.
        if status == reqwest::StatusCode::CONFLICT
            || status == reqwest::StatusCode::UNPROCESSABLE_ENTITY
        {
            return Err(StoreError::PreconditionMismatch);
        }
        Err(StoreError::Network(format!("file update failed: {}", status)))
    }

    /// Fetch the file's raw content at `{owner}/{repo}/{branch}/{path}`,
    /// bypassing the contents API (no SHA, no base64, no auth).
    pub async fn fetch_raw(&self, cfg: &RepoSyncConfig) -> Result<Vec<u8>, StoreError> {
        let url = format!(
            "{}/{}/{}/{}/{}",
            self.raw_base, cfg.owner, cfg.repo, cfg.branch, cfg.path
        );
        let resp = self.client.get(url).send().await.map_err(network_err)?;
        if !resp.status().is_success() {
            return Err(StoreError::Network(format!(
                "raw fetch failed: {}",
                resp.status()
            )));
        }
        Ok(resp.bytes().await.map_err(network_err)?.to_vec())
    }

    /// Reachability probe against the repository itself.
    pub async fn probe_repo(&self, cfg: &RepoSyncConfig) -> Result<ProbeOutcome, StoreError> {
        let url = format!("{}/repos/{}/{}", self.api_base, cfg.owner, cfg.repo);
        let resp = self
            .authorize(self.client.get(url), cfg)
            .send()
            .await
            .map_err(network_err)?;

        if resp.status().is_success() {
            Ok(ProbeOutcome::ok("connected to repository"))
        } else {
            Ok(ProbeOutcome::failed(format!("failed: {}", resp.status())))
        }
    }
}

/// Backend storing all data as one JSON file in a repository.
pub struct RepoFileBackend {
    client: RepoFileClient,
    config: Result<RepoSyncConfig, StoreError>,
}

impl RepoFileBackend {
    pub fn from_config(client: reqwest::Client, config: &SourceConfig) -> Self {
        Self {
            client: RepoFileClient::new(client),
            config: RepoSyncConfig::from_config(config),
        }
    }

    pub fn with_client(mut self, client: RepoFileClient) -> Self {
        self.client = client;
        self
    }
}

#[async_trait]
impl StorageBackend for RepoFileBackend {
    fn source(&self) -> SourceId {
        SourceId::RepoFile
    }

    async fn read(&self, key: &str) -> Option<Value> {
        let cfg = self.config.as_ref().ok()?;

        match self.client.fetch_raw(cfg).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(value) => Some(value),
                Err(e) => {
                    tracing::warn!(key, error = %e, "repo file is not valid JSON");
                    None
                }
            },
            Err(e) => {
                tracing::warn!(key, error = %e, "repo read failed");
                None
            }
        }
    }

    /// Two-phase optimistic write: fetch the current SHA (absent when the
    /// file does not exist), then PUT with that SHA as precondition. A
    /// stale-SHA rejection is a write failure, not retried here.
    async fn write(&self, key: &str, value: &Value) -> bool {
        let Ok(cfg) = self.config.as_ref() else {
            tracing::warn!(key, "repo write skipped: incomplete config");
            return false;
        };
        if cfg.token.is_none() {
            tracing::warn!(key, "repo write skipped: token is required");
            return false;
        }

        let sha = match self.client.fetch_file(cfg).await {
            Ok(file) => file.map(|f| f.sha),
            Err(e) => {
                tracing::warn!(key, error = %e, "repo write aborted: sha fetch failed");
                return false;
            }
        };

        let pretty = match serde_json::to_vec_pretty(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(key, error = %e, "value not serializable");
                return false;
            }
        };

        let message = format!("Update {}", cfg.path);
        match self
            .client
            .put_file(cfg, &pretty, sha.as_deref(), &message)
            .await
        {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(key, error = %e, "repo write failed");
                false
            }
        }
    }

    async fn probe(&self) -> Result<ProbeOutcome, StoreError> {
        let cfg = match &self.config {
            Ok(cfg) => cfg,
            Err(StoreError::ConfigMissing(field)) => {
                return Err(StoreError::ConfigMissing(field.clone()));
            }
            Err(e) => return Err(StoreError::Network(e.to_string())),
        };
        self.client.probe_repo(cfg).await
    }
}
