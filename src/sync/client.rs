use std::path::{Path, PathBuf};
use std::sync::Mutex;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use thiserror::Error;

use crate::storage::backup::{backup_snapshot_file, prune_backups, MAX_BACKUPS};

use super::config::HTTP_TIMEOUT_SECS;

/// HTTP client for the snapshot document store.
///
/// Remembers the validator (ETag) of the last seen remote document so pulls
/// can be conditional. Performs no retries; callers decide what a failure
/// means.
pub struct SyncClient {
    client: Client,
    base_url: String,
    token: String,
    user: String,
    last_etag: Mutex<Option<String>>,
}

#[derive(Error, Debug)]
pub enum SyncClientError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Authentication failed")]
    AuthFailed,
    #[error("Server error: {status} - {message}")]
    Server { status: u16, message: String },
    #[error("Push not confirmed by server")]
    NotConfirmed,
    #[error("No sync server configured")]
    NotConfigured,
    #[error("Local file not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// What a pull did to the local file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PullOutcome {
    /// Remote body changed; the local file was backed up and overwritten.
    Updated,
    /// Remote matched the known validator; nothing was touched.
    Unchanged,
    /// Nothing stored for this user yet (the server's zero validator);
    /// nothing was touched.
    Empty,
}

#[derive(Deserialize)]
struct PushResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    etag: Option<String>,
}

impl SyncClient {
    pub fn new(base_url: &str, token: &str, user: &str) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(HTTP_TIMEOUT_SECS))
            .connect_timeout(std::time::Duration::from_secs(10))
            .build()
            .unwrap_or_else(|e| {
                log::warn!("Sync: HTTP client build failed ({e}), using defaults");
                Client::new()
            });

        let user = user.trim();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            user: if user.is_empty() { "default" } else { user }.to_string(),
            last_etag: Mutex::new(None),
        }
    }

    /// True when a usable server address is configured. Gate for every
    /// pull/push attempt; never errors.
    pub fn available(&self) -> bool {
        self.base_url.starts_with("http://") || self.base_url.starts_with("https://")
    }

    fn storage_url(&self) -> String {
        format!("{}/storage", self.base_url)
    }

    /// Validator of the last document seen on the server, if any.
    pub fn last_validator(&self) -> Option<String> {
        self.last_etag.lock().unwrap().clone()
    }

    fn remember_etag(&self, etag: &str) {
        *self.last_etag.lock().unwrap() = Some(etag.trim_matches('"').to_string());
    }

    /// Fetch the remote document into `path`.
    ///
    /// Conditional on the remembered validator: a not-modified answer is a
    /// success with no local mutation. On a body change the existing local
    /// file is first backed up (best-effort), then overwritten.
    pub async fn pull_to_file(&self, path: &Path) -> Result<PullOutcome, SyncClientError> {
        if !self.available() {
            return Err(SyncClientError::NotConfigured);
        }

        let mut request = self
            .client
            .get(self.storage_url())
            .query(&[("user", self.user.as_str())]);
        if !self.token.is_empty() {
            request = request.header("X-Token", &self.token);
        }
        if let Some(etag) = self.last_validator() {
            request = request.header("If-None-Match", format!("\"{etag}\""));
        }

        let response = request.send().await?;
        match response.status() {
            StatusCode::NOT_MODIFIED => return Ok(PullOutcome::Unchanged),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(SyncClientError::AuthFailed);
            }
            status if !status.is_success() => {
                return Err(SyncClientError::Server {
                    status: status.as_u16(),
                    message: response.text().await.unwrap_or_default(),
                });
            }
            _ => {}
        }

        let etag = response
            .headers()
            .get("etag")
            .and_then(|v| v.to_str().ok())
            .map(|s| s.trim_matches('"').to_string());

        // The store answers with a zero validator while it holds nothing for
        // this user. That is not a document; overwriting the local file with
        // it would wipe local state.
        if etag.as_deref() == Some("0") {
            self.remember_etag("0");
            return Ok(PullOutcome::Empty);
        }

        let body = response.bytes().await?;

        match backup_snapshot_file(path) {
            Ok(Some(_)) => {
                if let Err(e) = prune_backups(path, MAX_BACKUPS) {
                    log::debug!("Sync: backup pruning failed: {}", e);
                }
            }
            Ok(None) => {}
            Err(e) => log::warn!("Sync: backup before overwrite failed: {}", e),
        }

        std::fs::write(path, &body)?;
        if let Some(etag) = etag {
            self.remember_etag(&etag);
        }
        Ok(PullOutcome::Updated)
    }

    /// Send the local file as the new remote document. Returns the server's
    /// validator for it. The file must exist and parse as JSON; otherwise
    /// the remote document is left untouched.
    pub async fn push_from_file(&self, path: &Path) -> Result<String, SyncClientError> {
        if !self.available() {
            return Err(SyncClientError::NotConfigured);
        }
        if !path.exists() {
            return Err(SyncClientError::FileNotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        let document: serde_json::Value = serde_json::from_str(&content)?;

        let mut request = self
            .client
            .post(self.storage_url())
            .query(&[("user", self.user.as_str())])
            .json(&document);
        if !self.token.is_empty() {
            request = request.header("X-Token", &self.token);
        }

        let response = request.send().await?;
        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                return Err(SyncClientError::AuthFailed);
            }
            status if !status.is_success() => {
                return Err(SyncClientError::Server {
                    status: status.as_u16(),
                    message: response.text().await.unwrap_or_default(),
                });
            }
            _ => {}
        }

        let confirmation: PushResponse = response.json().await?;
        if !confirmation.ok {
            return Err(SyncClientError::NotConfirmed);
        }
        let etag = confirmation.etag.unwrap_or_default();
        if !etag.is_empty() {
            self.remember_etag(&etag);
        }
        Ok(etag)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_is_normalized() {
        let client = SyncClient::new("http://example.net:8080///", "", "alice");
        assert_eq!(client.storage_url(), "http://example.net:8080/storage");
        assert!(client.available());
    }

    #[test]
    fn unconfigured_or_bogus_address_is_unavailable() {
        assert!(!SyncClient::new("", "", "alice").available());
        assert!(!SyncClient::new("ftp://example.net", "", "alice").available());
    }

    #[test]
    fn blank_user_falls_back_to_default() {
        let client = SyncClient::new("http://example.net", "", "  ");
        assert_eq!(client.user, "default");
    }

    #[test]
    fn validator_memory_strips_quotes() {
        let client = SyncClient::new("http://example.net", "", "alice");
        assert_eq!(client.last_validator(), None);
        client.remember_etag("\"abc123\"");
        assert_eq!(client.last_validator().as_deref(), Some("abc123"));
    }

    #[tokio::test]
    async fn pull_without_configuration_fails_cleanly() {
        let client = SyncClient::new("", "", "alice");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        assert!(matches!(
            client.pull_to_file(&path).await,
            Err(SyncClientError::NotConfigured)
        ));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn push_of_missing_file_fails_cleanly() {
        let client = SyncClient::new("http://example.net", "", "alice");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        assert!(matches!(
            client.push_from_file(&path).await,
            Err(SyncClientError::FileNotFound(_))
        ));
    }

    #[tokio::test]
    async fn push_of_invalid_json_fails_before_any_network() {
        let client = SyncClient::new("http://example.net", "", "alice");
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("storage.json");
        std::fs::write(&path, "{broken").unwrap();
        assert!(matches!(
            client.push_from_file(&path).await,
            Err(SyncClientError::Json(_))
        ));
    }
}
