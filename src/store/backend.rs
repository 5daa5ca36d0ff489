//! Blob backends
//!
//! The store never interprets the blob beyond JSON; a backend only moves the
//! serialized document in and out of its medium.

use async_trait::async_trait;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::io::AsyncWriteExt;

use super::error::StoreError;

/// Persistence medium for the serialized document
#[async_trait]
pub trait BlobBackend: Send + Sync {
    /// Backend name for logging
    fn name(&self) -> &'static str;

    /// Read the whole blob. `None` when nothing was ever saved.
    async fn load(&self) -> Result<Option<String>, StoreError>;

    /// Replace the whole blob
    async fn save(&self, blob: &str) -> Result<(), StoreError>;
}

/// File-backed blob
///
/// Protocol (same as the snapshot writers):
/// 1. Write `<file>.tmp` next to the target and `sync_all` it
/// 2. Atomically rename over the target
/// 3. On any failure remove the tmp file; the target keeps the previous blob
pub struct FileBackend {
    path: PathBuf,
}

impl FileBackend {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "store".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl BlobBackend for FileBackend {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn load(&self) -> Result<Option<String>, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(blob) => Ok(Some(blob)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::Io(e)),
        }
    }

    async fn save(&self, blob: &str) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent).await?;
        }

        let tmp = self.tmp_path();
        if let Err(e) = write_synced(&tmp, blob).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StoreError::Io(e));
        }
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(StoreError::Io(e));
        }
        Ok(())
    }
}

async fn write_synced(path: &Path, blob: &str) -> io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(blob.as_bytes()).await?;
    file.sync_all().await
}

/// Ephemeral blob held in memory
#[derive(Default)]
pub struct MemoryBackend {
    blob: Mutex<Option<String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing serialized document
    pub fn with_blob(blob: impl Into<String>) -> Self {
        Self {
            blob: Mutex::new(Some(blob.into())),
        }
    }

    /// Current blob contents
    pub fn contents(&self) -> Option<String> {
        self.blob
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

#[async_trait]
impl BlobBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn load(&self) -> Result<Option<String>, StoreError> {
        Ok(self.contents())
    }

    async fn save(&self, blob: &str) -> Result<(), StoreError> {
        *self
            .blob
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(blob.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_backend_round_trip() {
        let dir = format!("target/test_blob_{}", std::process::id());
        let _ = std::fs::remove_dir_all(&dir);
        let backend = FileBackend::new(format!("{}/nested/db.json", dir));

        assert!(backend.load().await.unwrap().is_none());

        backend.save("{\"users\":[]}").await.unwrap();
        assert_eq!(
            backend.load().await.unwrap().as_deref(),
            Some("{\"users\":[]}")
        );
        assert!(!backend.tmp_path().exists());

        backend.save("{}").await.unwrap();
        assert_eq!(backend.load().await.unwrap().as_deref(), Some("{}"));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_failed_rename_removes_tmp_and_keeps_target() {
        let dir = format!("target/test_blob_rename_{}", std::process::id());
        let _ = std::fs::remove_dir_all(&dir);
        // The target is a non-empty directory, so renaming a file over it fails
        let target = format!("{}/db.json", dir);
        std::fs::create_dir_all(format!("{}/occupied", target)).unwrap();

        let backend = FileBackend::new(&target);
        let err = backend.save("{}").await.unwrap_err();
        assert!(matches!(err, StoreError::Io(_)));
        assert!(!backend.tmp_path().exists());
        assert!(backend.path().is_dir());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_memory_backend() {
        let backend = MemoryBackend::new();
        assert!(backend.load().await.unwrap().is_none());
        backend.save("{}").await.unwrap();
        assert_eq!(backend.contents().as_deref(), Some("{}"));
    }
}
