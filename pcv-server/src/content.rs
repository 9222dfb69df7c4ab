//! Raw upload storage
//!
//! Uploads are stored out of band and referenced by an opaque
//! [`ContentHandle`]. The verification job only ever sees the handle and asks
//! the store for the bytes when it runs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

/// Opaque reference to stored raw bytes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHandle(Uuid);

impl ContentHandle {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a handle received from a client or the job table
    pub fn parse(raw: &str) -> Result<Self, ContentError> {
        Uuid::parse_str(raw)
            .map(Self)
            .map_err(|_| ContentError::InvalidHandle(raw.to_string()))
    }
}

impl Default for ContentHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContentHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

/// Content store errors
#[derive(Debug, Error)]
pub enum ContentError {
    /// Handle is not something this store could have issued
    #[error("Invalid content handle: {0}")]
    InvalidHandle(String),

    #[error("Content not found: {0}")]
    NotFound(ContentHandle),

    #[error("Content store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Storage for raw uploads
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Store `bytes` and return a handle to them
    async fn put(&self, bytes: Vec<u8>) -> Result<ContentHandle, ContentError>;

    /// Fetch the bytes behind `handle`
    async fn fetch(&self, handle: &ContentHandle) -> Result<Vec<u8>, ContentError>;
}

/// Content store backed by a flat directory of blob files
#[derive(Debug, Clone)]
pub struct FsContentStore {
    dir: PathBuf,
}

impl FsContentStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn blob_path(&self, handle: &ContentHandle) -> PathBuf {
        self.dir.join(handle.to_string())
    }
}

#[async_trait]
impl ContentStore for FsContentStore {
    async fn put(&self, bytes: Vec<u8>) -> Result<ContentHandle, ContentError> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let handle = ContentHandle::new();
        let final_path = self.blob_path(&handle);
        let partial_path = final_path.with_extension("partial");

        // Write then rename so a reader never sees a half-written blob
        tokio::fs::write(&partial_path, &bytes).await?;
        tokio::fs::rename(&partial_path, &final_path).await?;

        debug!(handle = %handle, bytes = bytes.len(), "Stored content blob");
        Ok(handle)
    }

    async fn fetch(&self, handle: &ContentHandle) -> Result<Vec<u8>, ContentError> {
        match tokio::fs::read(self.blob_path(handle)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(ContentError::NotFound(*handle))
            }
            Err(e) => Err(ContentError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_then_fetch() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsContentStore::new(temp_dir.path().join("blobs"));

        let handle = store.put(b"x|y,p|q".to_vec()).await.unwrap();
        let bytes = store.fetch(&handle).await.unwrap();

        assert_eq!(bytes, b"x|y,p|q");
    }

    #[tokio::test]
    async fn test_fetch_unknown_handle() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsContentStore::new(temp_dir.path());

        let result = store.fetch(&ContentHandle::new()).await;

        assert!(matches!(result, Err(ContentError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_no_partial_files_left_behind() {
        let temp_dir = TempDir::new().unwrap();
        let store = FsContentStore::new(temp_dir.path());

        store.put(b"abc".to_vec()).await.unwrap();

        let names: Vec<String> = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(!names[0].ends_with(".partial"));
    }

    #[test]
    fn test_handle_parse_rejects_paths() {
        for raw in ["../etc/passwd", "", "not-a-uuid", "blobs/123"] {
            assert!(
                matches!(ContentHandle::parse(raw), Err(ContentError::InvalidHandle(_))),
                "{:?} should be rejected",
                raw
            );
        }
    }

    #[test]
    fn test_handle_display_parses_back() {
        let handle = ContentHandle::new();
        assert_eq!(ContentHandle::parse(&handle.to_string()).unwrap(), handle);
    }
}
