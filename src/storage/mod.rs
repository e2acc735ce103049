//! Object storage collaborators.
//!
//! Buckets and keys follow object-store conventions (`bucket` + `documents/report.pdf`). The
//! filesystem adapter maps a bucket to a directory under its root and keeps no metadata, so
//! content types are inferred from key extensions.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;

/// Content type written with every pipeline result.
pub const TEXT_PLAIN: &str = "text/plain";

/// Errors raised by object stores.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No object exists at the requested location.
    #[error("object not found: {bucket}/{key}")]
    NotFound {
        /// Bucket that was searched.
        bucket: String,
        /// Key that was requested.
        key: String,
    },
    /// Bucket or key would escape the store root.
    #[error("invalid object location: {0}")]
    InvalidLocation(String),
    /// Underlying filesystem failure.
    #[error("storage io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Object bytes plus their declared content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    /// Raw object contents.
    pub body: Vec<u8>,
    /// MIME type declared for the object.
    pub content_type: String,
}

/// Read/write access to a bucketed object store.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch an object and its content type.
    async fn get_object(&self, bucket: &str, key: &str) -> Result<StoredObject, StorageError>;

    /// Create or overwrite an object.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError>;
}

/// Filesystem-backed store rooted at a directory.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    /// Store objects under `root/<bucket>/<key>`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, bucket: &str, key: &str) -> Result<PathBuf, StorageError> {
        let mut path = self.root.clone();
        for part in [bucket, key] {
            let relative = Path::new(part);
            let safe = !part.is_empty()
                && relative
                    .components()
                    .all(|component| matches!(component, Component::Normal(_)));
            if !safe {
                return Err(StorageError::InvalidLocation(format!("{bucket}/{key}")));
            }
            path.push(relative);
        }
        Ok(path)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<StoredObject, StorageError> {
        let path = self.resolve(bucket, key)?;
        let body = match tokio::fs::read(&path).await {
            Ok(body) => body,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                });
            }
            Err(error) => return Err(error.into()),
        };
        tracing::debug!(bucket, key, bytes = body.len(), "Read object");
        Ok(StoredObject {
            body,
            content_type: content_type_for_key(key).to_string(),
        })
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let path = self.resolve(bucket, key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = body.len();
        tokio::fs::write(&path, body).await?;
        tracing::debug!(bucket, key, bytes, content_type, "Wrote object");
        Ok(())
    }
}

/// In-process store, handy for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryObjectStore {
    objects: Mutex<HashMap<(String, String), StoredObject>>,
    writes: Mutex<usize>,
}

impl MemoryObjectStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed an object without counting it as a pipeline write.
    pub fn insert(&self, bucket: &str, key: &str, body: impl Into<Vec<u8>>, content_type: &str) {
        self.lock_objects().insert(
            (bucket.to_string(), key.to_string()),
            StoredObject {
                body: body.into(),
                content_type: content_type.to_string(),
            },
        );
    }

    /// Current contents of an object, if present.
    pub fn object(&self, bucket: &str, key: &str) -> Option<StoredObject> {
        self.lock_objects()
            .get(&(bucket.to_string(), key.to_string()))
            .cloned()
    }

    /// Number of `put_object` calls served so far.
    pub fn write_count(&self) -> usize {
        *self.writes.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn lock_objects(&self) -> std::sync::MutexGuard<'_, HashMap<(String, String), StoredObject>> {
        self.objects
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn get_object(&self, bucket: &str, key: &str) -> Result<StoredObject, StorageError> {
        self.object(bucket, key).ok_or_else(|| StorageError::NotFound {
            bucket: bucket.to_string(),
            key: key.to_string(),
        })
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: Vec<u8>,
        content_type: &str,
    ) -> Result<(), StorageError> {
        self.insert(bucket, key, body, content_type);
        *self.writes.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) += 1;
        Ok(())
    }
}

/// Best-effort MIME type for a key, based on its extension.
pub fn content_type_for_key(key: &str) -> &'static str {
    let extension = Path::new(key)
        .extension()
        .and_then(|extension| extension.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("pdf") => "application/pdf",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("txt" | "text" | "log") => TEXT_PLAIN,
        Some("md" | "markdown") => "text/markdown",
        Some("csv") => "text/csv",
        Some("html" | "htm") => "text/html",
        Some("json") => "application/json",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_types_follow_extensions() {
        assert_eq!(content_type_for_key("documents/scan.PDF"), "application/pdf");
        assert_eq!(content_type_for_key("documents/photo.jpeg"), "image/jpeg");
        assert_eq!(content_type_for_key("documents/notes.txt"), TEXT_PLAIN);
        assert_eq!(content_type_for_key("documents/blob"), "application/octet-stream");
    }

    #[tokio::test]
    async fn local_store_round_trips_objects() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalObjectStore::new(dir.path());

        store
            .put_object("bucket", "masked/report.txt", b"hello".to_vec(), TEXT_PLAIN)
            .await
            .expect("write");
        let object = store
            .get_object("bucket", "masked/report.txt")
            .await
            .expect("read");

        assert_eq!(object.body, b"hello");
        assert_eq!(object.content_type, TEXT_PLAIN);
        assert!(dir.path().join("bucket/masked/report.txt").exists());
    }

    #[tokio::test]
    async fn local_store_reports_missing_objects() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalObjectStore::new(dir.path());

        let error = store
            .get_object("bucket", "documents/none.txt")
            .await
            .expect_err("missing");
        assert!(matches!(error, StorageError::NotFound { .. }));
    }

    #[tokio::test]
    async fn local_store_rejects_traversal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalObjectStore::new(dir.path());

        let error = store
            .get_object("bucket", "../secrets.txt")
            .await
            .expect_err("traversal");
        assert!(matches!(error, StorageError::InvalidLocation(_)));
    }

    #[tokio::test]
    async fn memory_store_counts_writes_only() {
        let store = MemoryObjectStore::new();
        store.insert("bucket", "documents/a.txt", "seed", TEXT_PLAIN);
        assert_eq!(store.write_count(), 0);

        store
            .put_object("bucket", "masked/a.txt", b"out".to_vec(), TEXT_PLAIN)
            .await
            .expect("write");

        assert_eq!(store.write_count(), 1);
        assert_eq!(
            store.object("bucket", "masked/a.txt").map(|object| object.body),
            Some(b"out".to_vec())
        );
    }
}
