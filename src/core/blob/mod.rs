//! Blob store collaborator: path-addressed put/get plus a retrievable
//! reference. No directory semantics beyond path prefixes.

use crate::core::error::AppError;
use crate::core::types::ErrorCategory;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use tokio::sync::RwLock;

#[async_trait]
pub trait BlobStore: Send + Sync {
    async fn put(&self, path: &str, content: &[u8], content_type: &str) -> Result<(), AppError>;

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, AppError>;

    /// Retrievable reference to a stored blob (a link or a direct path).
    async fn link(&self, path: &str) -> Result<String, AppError>;
}

/// Filesystem-backed blob store rooted at a configured directory.
pub struct LocalBlobStore {
    root: PathBuf,
    bucket: String,
}

impl LocalBlobStore {
    pub fn new(root: PathBuf, bucket: &str) -> Self {
        LocalBlobStore {
            root,
            bucket: bucket.to_string(),
        }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        if self.bucket.is_empty() {
            self.root.join(path)
        } else {
            self.root.join(&self.bucket).join(path)
        }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, path: &str, content: &[u8], _content_type: &str) -> Result<(), AppError> {
        let target = self.resolve(path);
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::new(
                    ErrorCategory::StorageError,
                    format!("failed to create {}: {}", parent.display(), e),
                )
            })?;
        }
        fs::write(&target, content).map_err(|e| {
            AppError::new(
                ErrorCategory::StorageError,
                format!("failed to write {}: {}", target.display(), e),
            )
        })
    }

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, AppError> {
        let target = self.resolve(path);
        if !target.exists() {
            return Ok(None);
        }
        fs::read(&target).map(Some).map_err(|e| {
            AppError::new(
                ErrorCategory::StorageError,
                format!("failed to read {}: {}", target.display(), e),
            )
        })
    }

    async fn link(&self, path: &str) -> Result<String, AppError> {
        Ok(format!("file://{}", self.resolve(path).display()))
    }
}

/// In-memory blob store for tests. `fail_on` makes one path error to
/// exercise abort-on-first-failure semantics.
#[derive(Default)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
    fail_on: Option<String>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(path: &str) -> Self {
        MemoryBlobStore {
            blobs: RwLock::new(HashMap::new()),
            fail_on: Some(path.to_string()),
        }
    }

    pub async fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.blobs.read().await.keys().cloned().collect();
        paths.sort();
        paths
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, path: &str, content: &[u8], _content_type: &str) -> Result<(), AppError> {
        if self.fail_on.as_deref() == Some(path) {
            return Err(AppError::new(
                ErrorCategory::StorageError,
                format!("injected failure writing '{}'", path),
            ));
        }
        self.blobs
            .write()
            .await
            .insert(path.to_string(), content.to_vec());
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<Vec<u8>>, AppError> {
        Ok(self.blobs.read().await.get(path).cloned())
    }

    async fn link(&self, path: &str) -> Result<String, AppError> {
        Ok(format!("mem://{}", path))
    }
}
