//! Durable blob storage for archived upload bytes.
//!
//! The pipeline archives every upload's raw bytes before any processing and
//! deletes the archive again when a later stage fails, so no blob ever
//! outlives a failed ingestion. [`LocalBlobStore`] writes under a root
//! directory; [`InMemoryBlobStore`] backs tests.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

/// Write-once archive for raw upload bytes.
#[async_trait]
pub trait BlobStorage: Send + Sync {
    /// Store `bytes` under `path` and return an opaque URL for the blob.
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<String>;

    /// Remove a previously stored blob. Used to roll back failed ingestions;
    /// deleting a missing blob is not an error.
    async fn delete(&self, path: &str) -> Result<()>;
}

/// Blob store writing files beneath a local root directory.
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, path: &str) -> PathBuf {
        // Blob paths are generated by the pipeline, but never let a stray
        // component escape the root.
        let sanitized: PathBuf = std::path::Path::new(path)
            .components()
            .filter(|c| matches!(c, std::path::Component::Normal(_)))
            .collect();
        self.root.join(sanitized)
    }
}

#[async_trait]
impl BlobStorage for LocalBlobStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<String> {
        let full = self.resolve(path);
        if let Some(parent) = full.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&full, bytes)
            .await
            .with_context(|| format!("failed to write {}", full.display()))?;
        Ok(format!("file://{}", full.display()))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let full = self.resolve(path);
        match tokio::fs::remove_file(&full).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("failed to delete {}", full.display())),
        }
    }
}

/// In-memory blob store for tests.
#[derive(Default)]
pub struct InMemoryBlobStore {
    blobs: RwLock<HashMap<String, Vec<u8>>>,
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.blobs.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, path: &str) -> bool {
        self.blobs.read().unwrap().contains_key(path)
    }
}

#[async_trait]
impl BlobStorage for InMemoryBlobStore {
    async fn put(&self, path: &str, bytes: &[u8]) -> Result<String> {
        self.blobs
            .write()
            .unwrap()
            .insert(path.to_string(), bytes.to_vec());
        Ok(format!("memory://{}", path))
    }

    async fn delete(&self, path: &str) -> Result<()> {
        self.blobs.write().unwrap().remove(path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn local_store_roundtrip() {
        let tmp = TempDir::new().unwrap();
        let store = LocalBlobStore::new(tmp.path());

        let url = store.put("ws1/u1/report.pdf", b"raw bytes").await.unwrap();
        assert!(url.starts_with("file://"));
        let on_disk = tmp.path().join("ws1/u1/report.pdf");
        assert_eq!(std::fs::read(&on_disk).unwrap(), b"raw bytes");

        store.delete("ws1/u1/report.pdf").await.unwrap();
        assert!(!on_disk.exists());
    }

    #[tokio::test]
    async fn local_store_delete_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let store = LocalBlobStore::new(tmp.path());
        store.delete("never/written").await.unwrap();
    }

    #[tokio::test]
    async fn local_store_strips_parent_components() {
        let tmp = TempDir::new().unwrap();
        let store = LocalBlobStore::new(tmp.path());
        let url = store.put("../escape.txt", b"x").await.unwrap();
        assert!(tmp.path().join("escape.txt").exists());
        assert!(url.contains(&tmp.path().display().to_string()));
    }

    #[tokio::test]
    async fn memory_store_tracks_blobs() {
        let store = InMemoryBlobStore::new();
        assert!(store.is_empty());
        store.put("a/b", b"data").await.unwrap();
        assert!(store.contains("a/b"));
        store.delete("a/b").await.unwrap();
        assert!(store.is_empty());
    }
}
