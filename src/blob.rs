//! Blob storage for investigation archives

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::BlobConfig;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("invalid blob key '{0}'")]
    InvalidKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("blob server returned {status} for {url}")]
    Status { status: u16, url: String },

    #[error("upload rejected: {0}")]
    Rejected(String),
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `bytes` under `key` and return a URL for it
    async fn upload(&self, key: &str, bytes: Vec<u8>, content_type: &str)
        -> Result<String, BlobError>;
}

/// Build the configured backend
pub fn from_config(config: &BlobConfig) -> Result<Box<dyn BlobStore>, BlobError> {
    match config.backend.as_str() {
        "http" => {
            let endpoint = config
                .endpoint
                .clone()
                .ok_or_else(|| BlobError::Rejected("http backend needs an endpoint".into()))?;
            let bucket = config
                .bucket
                .clone()
                .ok_or_else(|| BlobError::Rejected("http backend needs a bucket".into()))?;
            Ok(Box::new(HttpBlobStore::new(endpoint, bucket)))
        }
        _ => Ok(Box::new(FsBlobStore::new(&config.root))),
    }
}

/// Relative keys only, no parent traversal
fn checked_key(key: &str) -> Result<&Path, BlobError> {
    let path = Path::new(key);
    let valid = !key.is_empty()
        && path
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
    if valid {
        Ok(path)
    } else {
        Err(BlobError::InvalidKey(key.to_string()))
    }
}

/// Writes blobs under a root directory
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, BlobError> {
        let target = self.root.join(checked_key(key)?);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, &bytes).await?;
        let absolute = tokio::fs::canonicalize(&target).await.unwrap_or(target);
        debug!(key, content_type, size = bytes.len(), "Blob written");
        Ok(format!("file://{}", absolute.display()))
    }
}

/// S3-style `PUT {endpoint}/{bucket}/{key}`
pub struct HttpBlobStore {
    http: reqwest::Client,
    endpoint: String,
    bucket: String,
}

impl HttpBlobStore {
    pub fn new(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            bucket: bucket.into(),
        }
    }

    pub fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.endpoint, self.bucket, key)
    }
}

#[async_trait]
impl BlobStore for HttpBlobStore {
    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, BlobError> {
        checked_key(key)?;
        let url = self.object_url(key);
        let response = self
            .http
            .put(&url)
            .header(reqwest::header::CONTENT_TYPE, content_type)
            .body(bytes)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(BlobError::Status {
                status: response.status().as_u16(),
                url,
            });
        }
        info!("Uploaded {key} to {url}");
        Ok(url)
    }
}

/// In-process blob store; can be switched to reject every upload
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
    failing: AtomicBool,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let store = Self::default();
        store.set_failing(true);
        store
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn get(&self, key: &str) -> Option<(Vec<u8>, String)> {
        self.objects.lock().ok()?.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<_> = self
            .objects
            .lock()
            .map(|o| o.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(
        &self,
        key: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String, BlobError> {
        checked_key(key)?;
        if self.failing.load(Ordering::SeqCst) {
            return Err(BlobError::Rejected("memory blob store is failing".into()));
        }
        if let Ok(mut objects) = self.objects.lock() {
            objects.insert(key.to_string(), (bytes, content_type.to_string()));
        }
        Ok(format!("memory://{key}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fs_upload_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        let url = store
            .upload("issues/issue-1/results.json", b"{}".to_vec(), "application/json")
            .await
            .unwrap();

        assert!(url.starts_with("file://"));
        let written = std::fs::read(dir.path().join("issues/issue-1/results.json")).unwrap();
        assert_eq!(written, b"{}");
    }

    #[tokio::test]
    async fn test_rejects_traversal_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsBlobStore::new(dir.path());
        for key in ["../escape", "/abs/path", ""] {
            assert!(matches!(
                store.upload(key, Vec::new(), "text/plain").await,
                Err(BlobError::InvalidKey(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_memory_store_failure_switch() {
        let store = MemoryBlobStore::new();
        assert_eq!(
            store.upload("a/b", b"x".to_vec(), "text/plain").await.unwrap(),
            "memory://a/b"
        );
        store.set_failing(true);
        assert!(store.upload("a/c", b"y".to_vec(), "text/plain").await.is_err());
        assert_eq!(store.keys(), vec!["a/b"]);
    }

    #[test]
    fn test_http_object_url() {
        let store = HttpBlobStore::new("http://localhost:9000/", "issues");
        assert_eq!(
            store.object_url("issues/issue-3/results.json"),
            "http://localhost:9000/issues/issues/issue-3/results.json"
        );
    }
}
