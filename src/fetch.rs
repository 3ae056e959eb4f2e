//! Artifact fetching abstraction.
//!
//! The retrieval manager reads artifacts through the [`ArtifactFetcher`]
//! trait so the same manager serves a local artifact directory ([`FsFetcher`])
//! or a deployed static host ([`HttpFetcher`]). HTTP fetches carry a request
//! timeout; expiry surfaces as a fetch failure rather than hanging the
//! manager.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;
use url::Url;

/// A failed artifact fetch.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("fetch timed out: {0}")]
    Timeout(String),

    #[error("fetch failed for {path}: {reason}")]
    Failed { path: String, reason: String },
}

/// Reads artifact bytes by relative path (e.g. `rag-index/manifest.json`).
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, FetchError>;
}

/// Fetches artifacts from a local directory (the build output).
pub struct FsFetcher {
    base: PathBuf,
}

impl FsFetcher {
    pub fn new(base: impl Into<PathBuf>) -> Self {
        FsFetcher { base: base.into() }
    }
}

#[async_trait]
impl ArtifactFetcher for FsFetcher {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        let full = self.base.join(path);
        match tokio::fs::read(&full).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                Err(FetchError::NotFound(path.to_string()))
            }
            Err(err) => Err(FetchError::Failed {
                path: path.to_string(),
                reason: err.to_string(),
            }),
        }
    }
}

/// Fetches artifacts over HTTP(S) from a base URL.
pub struct HttpFetcher {
    client: reqwest::Client,
    base: Url,
}

impl HttpFetcher {
    /// Build a fetcher rooted at `base` with a per-request `timeout`.
    pub fn new(mut base: Url, timeout: Duration) -> Result<Self> {
        // A base without a trailing slash would drop its last path segment
        // on join.
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(HttpFetcher { client, base })
    }
}

#[async_trait]
impl ArtifactFetcher for HttpFetcher {
    async fn fetch(&self, path: &str) -> Result<Vec<u8>, FetchError> {
        let url = self.base.join(path).map_err(|err| FetchError::Failed {
            path: path.to_string(),
            reason: err.to_string(),
        })?;

        let response = self.client.get(url).send().await.map_err(|err| {
            if err.is_timeout() {
                FetchError::Timeout(path.to_string())
            } else {
                FetchError::Failed {
                    path: path.to_string(),
                    reason: err.to_string(),
                }
            }
        })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(path.to_string()));
        }
        if !response.status().is_success() {
            return Err(FetchError::Failed {
                path: path.to_string(),
                reason: format!("status {}", response.status()),
            });
        }

        let bytes = response.bytes().await.map_err(|err| FetchError::Failed {
            path: path.to_string(),
            reason: err.to_string(),
        })?;
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fs_fetcher_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("rag-index")).unwrap();
        std::fs::write(dir.path().join("rag-index/manifest.json"), b"{}").unwrap();

        let fetcher = FsFetcher::new(dir.path());
        let bytes = fetcher.fetch("rag-index/manifest.json").await.unwrap();
        assert_eq!(bytes, b"{}");
    }

    #[tokio::test]
    async fn test_fs_fetcher_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FsFetcher::new(dir.path());
        let err = fetcher.fetch("rag-index/missing.json").await.unwrap_err();
        assert!(matches!(err, FetchError::NotFound(_)));
    }
}
