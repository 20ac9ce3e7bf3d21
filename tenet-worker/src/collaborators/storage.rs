//! Blob storage collaborator
//!
//! Stores uploaded documents and exported reports. Paths returned by
//! `upload` are opaque to callers.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("invalid storage path: {0}")]
    InvalidPath(String),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Repository-style trait for blob storage
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Stores `bytes` under the job and returns the storage path
    ///
    /// # Arguments
    /// * `job_id` - The job the object belongs to
    /// * `filename` - Original filename; sanitized before use
    /// * `bytes` - Object content
    /// * `content_type` - MIME type of the content
    async fn upload(
        &self,
        job_id: Uuid,
        filename: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, StorageError>;

    /// Reads the object at a path previously returned by `upload`
    async fn download(&self, path: &str) -> Result<Vec<u8>, StorageError>;
}

/// Storage on the local filesystem under a root directory
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> Result<PathBuf, StorageError> {
        let relative = Path::new(path);
        let safe = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_)));
        if path.is_empty() || !safe {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl BlobStorage for LocalStorage {
    async fn upload(
        &self,
        job_id: Uuid,
        filename: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<String, StorageError> {
        let path = object_path(job_id, filename);
        let target = self.resolve(&path)?;

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(&target, bytes).await?;

        tracing::debug!(
            "Stored {} bytes ({}) at {}",
            bytes.len(),
            content_type,
            target.display()
        );

        Ok(path)
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        let target = self.resolve(path)?;

        match tokio::fs::read(&target).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(StorageError::NotFound(path.to_string()))
            }
            Err(e) => Err(StorageError::Io(e)),
        }
    }
}

/// Process-local storage for tests and throwaway runs
#[derive(Default)]
pub struct MemoryStorage {
    objects: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(path)
    }
}

#[async_trait]
impl BlobStorage for MemoryStorage {
    async fn upload(
        &self,
        job_id: Uuid,
        filename: &str,
        bytes: &[u8],
        _content_type: &str,
    ) -> Result<String, StorageError> {
        let path = object_path(job_id, filename);
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.clone(), bytes.to_vec());
        Ok(path)
    }

    async fn download(&self, path: &str) -> Result<Vec<u8>, StorageError> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(path.to_string()))
    }
}

fn object_path(job_id: Uuid, filename: &str) -> String {
    format!("{}/{}", job_id, sanitize_filename(filename))
}

/// Keeps `[A-Za-z0-9._-]`, replaces everything else, and never yields a dot-only name
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    if cleaned.chars().all(|c| c == '.') {
        "document".to_string()
    } else {
        cleaned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("lease 2024.pdf"), "lease_2024.pdf");
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename(".."), "document");
        assert_eq!(sanitize_filename(""), "document");
    }

    #[tokio::test]
    async fn test_local_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());
        let job_id = Uuid::new_v4();

        let path = storage
            .upload(job_id, "terms.txt", b"hello", "text/plain")
            .await
            .unwrap();

        assert_eq!(path, format!("{}/terms.txt", job_id));
        assert_eq!(storage.download(&path).await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_local_missing_and_escaping_paths() {
        let dir = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(dir.path());

        assert!(matches!(
            storage.download("nope/file.pdf").await,
            Err(StorageError::NotFound(_))
        ));
        assert!(matches!(
            storage.download("../outside").await,
            Err(StorageError::InvalidPath(_))
        ));
        assert!(matches!(
            storage.download("/etc/passwd").await,
            Err(StorageError::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_storage() {
        let storage = MemoryStorage::new();
        let path = storage
            .upload(Uuid::new_v4(), "a.pdf", b"%PDF", "application/pdf")
            .await
            .unwrap();

        assert!(storage.contains(&path));
        assert_eq!(storage.download(&path).await.unwrap(), b"%PDF");
        assert!(storage.download("missing").await.is_err());
    }
}
