//! Transfer engine: ships a bundle's files into a project/folder hierarchy
//! on the Modeler API. Uploads run strictly sequentially to respect the
//! target's rate limit; each file gets a bounded retry budget with linear
//! backoff, and one exhausted file never aborts the batch.

use crate::core::bundle::Bundle;
use crate::core::config::ModelerConfig;
use crate::core::error::AppError;
use crate::core::types::{ErrorCategory, FileKind, TransferStatus};
use chrono::Utc;
use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::env;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{info, warn};

/// ASCII set for encoding path segments (slashes included).
const PATH_SEGMENT_ENCODE_SET: &AsciiSet = &CONTROLS.add(b' ').add(b'/').add(b'?').add(b'#');

fn encode_segment(segment: &str) -> String {
    utf8_percent_encode(segment, PATH_SEGMENT_ENCODE_SET).to_string()
}

fn join_path(base: &str, segments: &[&str]) -> String {
    let mut url = base.trim_end_matches('/').to_string();
    for segment in segments {
        if !segment.is_empty() {
            url.push('/');
            url.push_str(segment);
        }
    }
    url
}

/// One file queued for upload.
#[derive(Debug, Clone)]
pub struct TransferFile {
    pub name: String,
    pub content: String,
    pub kind: FileKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedFile {
    pub name: String,
    pub remote_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedFile {
    pub name: String,
    pub error: String,
}

/// Outcome of shipping one bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferResult {
    pub project_id: String,
    pub folder_id: String,
    pub uploaded: Vec<UploadedFile>,
    pub failed: Vec<FailedFile>,
    pub status: TransferStatus,
}

#[derive(Debug)]
struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// Authenticated client for the Modeler REST API. The token cache is a
/// mutex held across refresh, so concurrent callers share one in-flight
/// token request instead of issuing duplicates.
#[derive(Debug)]
pub struct ModelerClient {
    http: reqwest::Client,
    config: ModelerConfig,
    token: Mutex<Option<CachedToken>>,
}

impl ModelerClient {
    pub fn new(config: ModelerConfig) -> Self {
        ModelerClient {
            http: reqwest::Client::new(),
            config,
            token: Mutex::new(None),
        }
    }

    /// Cached bearer token, refreshed when missing or expired.
    async fn bearer_token(&self) -> Result<String, AppError> {
        let mut guard = self.token.lock().await;
        if let Some(cached) = guard.as_ref() {
            if cached.expires_at > Instant::now() {
                return Ok(cached.token.clone());
            }
        }
        let fresh = self.authenticate().await?;
        let token = fresh.token.clone();
        *guard = Some(fresh);
        Ok(token)
    }

    /// Drop the cached token; the next call re-authenticates.
    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    /// Exchange client credentials for a bearer token. The expiry is
    /// shortened by the configured margin so a token never expires
    /// mid-request.
    async fn authenticate(&self) -> Result<CachedToken, AppError> {
        let client_id = env::var(&self.config.client_id_env).map_err(|_| {
            AppError::new(
                ErrorCategory::AuthenticationError,
                format!("{} is not set", self.config.client_id_env),
            )
        })?;
        let client_secret = env::var(&self.config.client_secret_env).map_err(|_| {
            AppError::new(
                ErrorCategory::AuthenticationError,
                format!("{} is not set", self.config.client_secret_env),
            )
        })?;

        let response = self
            .http
            .post(&self.config.token_url)
            .json(&json!({
                "grant_type": "client_credentials",
                "audience": self.config.audience,
                "client_id": client_id,
                "client_secret": client_secret,
            }))
            .send()
            .await
            .map_err(|e| {
                AppError::new(
                    ErrorCategory::AuthenticationError,
                    format!("token request failed: {}", e),
                )
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::new(
                ErrorCategory::AuthenticationError,
                format!("token endpoint returned {}: {}", status, body),
            ));
        }

        let payload: Value = response.json().await.map_err(|e| {
            AppError::new(
                ErrorCategory::AuthenticationError,
                format!("token response is not JSON: {}", e),
            )
        })?;
        let token = payload["access_token"]
            .as_str()
            .ok_or_else(|| {
                AppError::new(
                    ErrorCategory::AuthenticationError,
                    "token response has no access_token",
                )
            })?
            .to_string();
        let expires_in = payload["expires_in"].as_u64().unwrap_or(300);
        let lifetime = expires_in.saturating_sub(self.config.token_margin_secs).max(1);

        Ok(CachedToken {
            token,
            expires_at: Instant::now() + Duration::from_secs(lifetime),
        })
    }

    async fn post_json(&self, segments: &[&str], body: Value) -> Result<Value, AppError> {
        let url = join_path(&self.config.base_url, segments);
        let token = self.bearer_token().await?;
        let response = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                AppError::new(
                    ErrorCategory::UploadError,
                    format!("request to {} failed: {}", url, e),
                )
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            // Cached token outlived its server-side expiry.
            self.invalidate_token().await;
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::new(
                ErrorCategory::UploadError,
                format!("{} returned {}: {}", url, status.as_u16(), text),
            )
            .with_context("status", status.as_u16().to_string()));
        }

        response.json().await.map_err(|e| {
            AppError::new(
                ErrorCategory::UploadError,
                format!("{} returned invalid JSON: {}", url, e),
            )
        })
    }

    /// Reuse the first project with the exact name, creating one when none
    /// exists. Not a true get-or-create transaction; the benign race of
    /// two concurrent creators is accepted.
    pub async fn resolve_or_create_project(&self, name: &str) -> Result<String, AppError> {
        let found = self
            .post_json(
                &["api", "v1", "projects", "search"],
                json!({ "filter": { "name": name } }),
            )
            .await?;
        if let Some(id) = found["items"]
            .as_array()
            .and_then(|items| items.first())
            .and_then(|item| item["id"].as_str())
        {
            return Ok(id.to_string());
        }

        let created = self
            .post_json(&["api", "v1", "projects"], json!({ "name": name }))
            .await?;
        created["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                AppError::new(
                    ErrorCategory::UploadError,
                    "project create response has no id",
                )
            })
    }

    pub async fn create_folder(&self, project_id: &str, name: &str) -> Result<String, AppError> {
        let project_segment = encode_segment(project_id);
        let created = self
            .post_json(
                &["api", "v1", "projects", &project_segment, "folders"],
                json!({ "name": name }),
            )
            .await?;
        created["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                AppError::new(
                    ErrorCategory::UploadError,
                    "folder create response has no id",
                )
            })
    }

    /// Single-file upload. Any non-2xx response surfaces as `UploadError`
    /// carrying the status and body.
    pub async fn upload_file(
        &self,
        project_id: &str,
        parent_id: Option<&str>,
        file: &TransferFile,
    ) -> Result<String, AppError> {
        let mut body = json!({
            "name": file.name,
            "projectId": project_id,
            "content": file.content,
            "fileType": file.kind.to_string(),
        });
        if let Some(parent) = parent_id {
            body["folderId"] = Value::String(parent.to_string());
        }

        let created = self.post_json(&["api", "v1", "files"], body).await?;
        created["id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| {
                AppError::new(
                    ErrorCategory::UploadError,
                    format!("upload response for '{}' has no id", file.name),
                )
            })
    }
}

#[derive(Debug)]
pub struct TransferEngine {
    client: ModelerClient,
    config: ModelerConfig,
}

impl TransferEngine {
    /// Build an engine for the configured target, rejecting an unparsable
    /// base URL up front rather than on the first request.
    pub fn new(config: ModelerConfig) -> Result<Self, AppError> {
        url::Url::parse(&config.base_url).map_err(|e| {
            AppError::new(
                ErrorCategory::ValidationError,
                format!("invalid modeler base URL '{}': {}", config.base_url, e),
            )
        })?;
        Ok(TransferEngine {
            client: ModelerClient::new(config.clone()),
            config,
        })
    }

    /// Flatten a bundle into the upload list: main process first, then
    /// subprocesses, then forms. The manifest travels only in the export
    /// archive; the Modeler API accepts bpmn and form kinds only.
    pub fn files_for(bundle: &Bundle) -> Vec<TransferFile> {
        let mut files = Vec::new();
        files.push(TransferFile {
            name: bundle.main_file.clone(),
            content: bundle.main_xml.clone(),
            kind: FileKind::Bpmn,
        });
        for subprocess in &bundle.subprocess_files {
            files.push(TransferFile {
                name: subprocess.filename.clone(),
                content: subprocess.xml.clone(),
                kind: FileKind::Bpmn,
            });
        }
        for form in &bundle.forms {
            files.push(TransferFile {
                name: form.filename.clone(),
                content: form.content.to_string(),
                kind: FileKind::Form,
            });
        }
        files
    }

    /// Ship a bundle: authenticate, resolve the target project, create a
    /// timestamped folder, upload everything. Failures before the first
    /// upload surface as errors; per-file failures are collected into the
    /// result instead.
    pub async fn transfer(&self, bundle: &Bundle) -> Result<TransferResult, AppError> {
        // Surface credential problems before touching the project API.
        // Repeated credential failures are not transient, so the bounded
        // attempt budget applies here exactly as it does per upload.
        self.with_retry("authenticate", || self.client.bearer_token())
            .await?;

        let project_name = self
            .config
            .project_name
            .clone()
            .unwrap_or_else(|| bundle.service_name.clone());
        let project_id = self
            .with_retry("resolve project", || {
                self.client.resolve_or_create_project(&project_name)
            })
            .await?;

        // The timestamp keeps repeated transfers of one service from
        // colliding; earlier folders become orphaned but harmless.
        let folder_name = format!(
            "{} {}",
            bundle.service_name,
            Utc::now().format("%Y-%m-%d %H:%M:%S")
        );
        let folder_id = self
            .with_retry("create folder", || {
                self.client.create_folder(&project_id, &folder_name)
            })
            .await?;

        let files = Self::files_for(bundle);
        let (uploaded, failed) = self.upload_all(&project_id, Some(&folder_id), &files).await;

        let status = if failed.is_empty() {
            TransferStatus::Complete
        } else {
            TransferStatus::Partial
        };
        info!(
            "transfer of '{}' finished: {} uploaded, {} failed",
            bundle.service_name,
            uploaded.len(),
            failed.len()
        );

        Ok(TransferResult {
            project_id,
            folder_id,
            uploaded,
            failed,
            status,
        })
    }

    /// Sequential upload with per-file retry. A file that exhausts its
    /// budget is recorded with its last error and the batch moves on.
    pub async fn upload_all(
        &self,
        project_id: &str,
        parent_id: Option<&str>,
        files: &[TransferFile],
    ) -> (Vec<UploadedFile>, Vec<FailedFile>) {
        let mut uploaded = Vec::new();
        let mut failed = Vec::new();

        for file in files {
            match self
                .with_retry(&file.name, || {
                    self.client.upload_file(project_id, parent_id, file)
                })
                .await
            {
                Ok(remote_id) => {
                    uploaded.push(UploadedFile {
                        name: file.name.clone(),
                        remote_id,
                    });
                    // Fixed pacing between requests for the target's rate
                    // limit.
                    tokio::time::sleep(Duration::from_millis(self.config.pacing_ms)).await;
                }
                Err(e) => {
                    warn!("giving up on '{}': {}", file.name, e);
                    failed.push(FailedFile {
                        name: file.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        (uploaded, failed)
    }

    /// Bounded retry with linearly increasing backoff: delay grows with
    /// the attempt index.
    async fn with_retry<T, F, Fut>(&self, label: &str, operation: F) -> Result<T, AppError>
    where
        F: Fn() -> Fut,
        Fut: std::future::Future<Output = Result<T, AppError>>,
    {
        let attempts = self.config.max_attempts.max(1);
        let mut last_error = None;
        for attempt in 1..=attempts {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => {
                    if attempt < attempts {
                        let delay = Duration::from_millis(
                            self.config.backoff_unit_ms * u64::from(attempt),
                        );
                        warn!(
                            "attempt {}/{} for '{}' failed ({}), retrying in {:?}",
                            attempt, attempts, label, e, delay
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.expect("at least one attempt runs"))
    }
}
