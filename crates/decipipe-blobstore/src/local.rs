// crates/decipipe-blobstore/src/local.rs
// ============================================================================
// Module: Local Filesystem Blob Store
// Description: BlobStore backed by a root directory, one file per key.
// Purpose: Zero-dependency backend for tests and local/dev runs.
// Dependencies: tokio::fs
// ============================================================================

use std::path::Path;
use std::path::PathBuf;

use async_trait::async_trait;

use crate::BlobMetadata;
use crate::BlobStore;
use crate::BlobStoreError;

/// Stores each blob key as a file under `root`, preserving the key's `/`
/// separators as directory structure (so `decisions/2026/07/28/evt.json`
/// becomes `root/decisions/2026/07/28/evt.json`).
pub struct LocalFsBlobStore {
    root: PathBuf,
}

impl LocalFsBlobStore {
    /// Creates the store, ensuring `root` exists (the store creates its
    /// backing container on startup rather than lazily on first write).
    ///
    /// # Errors
    ///
    /// Returns [`BlobStoreError::Io`] if `root` cannot be created.
    pub async fn new(root: impl Into<PathBuf>) -> Result<Self, BlobStoreError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|err| BlobStoreError::Io(err.to_string()))?;
        Ok(Self { root })
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, BlobStoreError> {
        if key.contains("..") {
            return Err(BlobStoreError::Invalid(format!("blob key escapes root: {key}")));
        }
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl BlobStore for LocalFsBlobStore {
    async fn put(&self, key: &str, payload: Vec<u8>, _metadata: BlobMetadata) -> Result<(), BlobStoreError> {
        let path = self.path_for(key)?;
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|err| BlobStoreError::Io(err.to_string()))?;
        }
        write_atomically(&path, &payload).await
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BlobStoreError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(BlobStoreError::Io(err.to_string())),
        }
    }
}

/// Writes via a temp file in the same directory, then renames, so a
/// concurrent `get` never observes a partially written blob.
async fn write_atomically(path: &Path, payload: &[u8]) -> Result<(), BlobStoreError> {
    let Some(parent) = path.parent() else {
        return Err(BlobStoreError::Invalid("blob key has no parent directory".to_string()));
    };
    let mut temp_path = parent.join(format!(".tmp-{:x}", rand_suffix()));
    temp_path.set_extension("part");
    tokio::fs::write(&temp_path, payload).await.map_err(|err| BlobStoreError::Io(err.to_string()))?;
    let result = tokio::fs::rename(&temp_path, path).await.map_err(|err| BlobStoreError::Io(err.to_string()));
    if result.is_err() {
        let _ = tokio::fs::remove_file(&temp_path).await;
    }
    result
}

fn rand_suffix() -> u64 {
    use std::sync::atomic::AtomicU64;
    use std::sync::atomic::Ordering;
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    COUNTER.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    #![allow(
        clippy::expect_used,
        clippy::unwrap_used,
        reason = "Test assertions use expect/unwrap for clarity."
    )]

    use tempfile::tempdir;

    use super::*;

    #[tokio::test]
    async fn put_then_get_roundtrips() {
        let dir = tempdir().unwrap();
        let store = LocalFsBlobStore::new(dir.path()).await.unwrap();
        store
            .put("decisions/2026/07/28/evt-1.json", b"{\"ok\":true}".to_vec(), BlobMetadata::default())
            .await
            .unwrap();
        let fetched = store.get("decisions/2026/07/28/evt-1.json").await.unwrap();
        assert_eq!(fetched, Some(b"{\"ok\":true}".to_vec()));
    }

    #[tokio::test]
    async fn get_missing_key_is_none_not_error() {
        let dir = tempdir().unwrap();
        let store = LocalFsBlobStore::new(dir.path()).await.unwrap();
        assert_eq!(store.get("runs/2026/07/28/missing.json").await.unwrap(), None);
    }

    #[tokio::test]
    async fn put_is_idempotent() {
        let dir = tempdir().unwrap();
        let store = LocalFsBlobStore::new(dir.path()).await.unwrap();
        let key = "steps/2026/07/28/step-1.json";
        store.put(key, b"first".to_vec(), BlobMetadata::default()).await.unwrap();
        store.put(key, b"second".to_vec(), BlobMetadata::default()).await.unwrap();
        assert_eq!(store.get(key).await.unwrap(), Some(b"first".to_vec()));
    }

    #[tokio::test]
    async fn rejects_keys_that_escape_root() {
        let dir = tempdir().unwrap();
        let store = LocalFsBlobStore::new(dir.path()).await.unwrap();
        let result = store.put("../escape.json", b"x".to_vec(), BlobMetadata::default()).await;
        assert!(result.is_err());
    }
}
