//! Local filesystem storage implementation.
//!
//! Every key maps to a file under the root directory. File operations go
//! through `tokio::fs`, which runs them on tokio's blocking pool, so a slow
//! disk never stalls the scheduler tick.
//!
//! ## Storage Layout
//!
//! ```text
//! {root}/
//! ├── config.toml           # Watcher configuration
//! ├── snapshot/             # Last known listings
//! │   └── {id}.json
//! └── hits/                 # Outbox entries
//!     └── {secs}-{seq}-{id}.json
//! ```

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::{AppError, Result};
use crate::storage::ObjectStore;

/// Extension of in-flight writes; never listed.
const TMP_EXTENSION: &str = "tmp";

/// Local filesystem storage backend.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root_dir: PathBuf,
}

impl LocalStorage {
    /// Create a new LocalStorage rooted at the given directory.
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Root directory of this store.
    pub fn root(&self) -> &Path {
        &self.root_dir
    }

    /// Get the full path for a relative key.
    fn path(&self, key: &str) -> PathBuf {
        self.root_dir.join(key)
    }

    /// Ensure parent directory exists.
    async fn ensure_dir(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Write bytes atomically (write to temp, then rename).
    async fn write_bytes(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.path(key);
        self.ensure_dir(&path).await?;

        let tmp = path.with_extension(TMP_EXTENSION);
        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(bytes).await?;
        file.flush().await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    /// Read bytes, returning None if file doesn't exist.
    async fn read_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.path(key);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Turn a path below the root back into a `/`-separated key.
    fn key_for(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root_dir).ok()?;
        let parts: Vec<&str> = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<_>>()?;
        Some(parts.join("/"))
    }

    /// Directory to start listing from for a key prefix.
    fn listing_root(&self, prefix: &str) -> PathBuf {
        match prefix.rfind('/') {
            Some(idx) => self.path(&prefix[..idx]),
            None => self.root_dir.clone(),
        }
    }
}

#[async_trait]
impl ObjectStore for LocalStorage {
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut pending = vec![self.listing_root(prefix)];

        while let Some(dir) = pending.pop() {
            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(AppError::Io(e)),
            };

            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }
                if path.extension().is_some_and(|ext| ext == TMP_EXTENSION) {
                    continue;
                }
                if let Some(key) = self.key_for(&path) {
                    if key.starts_with(prefix) {
                        keys.push(key);
                    }
                }
            }
        }

        Ok(keys)
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.read_bytes(key).await
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.write_bytes(key, &bytes).await
    }

    async fn delete(&self, key: &str) -> Result<()> {
        match tokio::fs::remove_file(self.path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_write_and_read() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        storage.write_bytes("test.txt", b"hello").await.unwrap();
        let data = storage.read_bytes("test.txt").await.unwrap();
        assert_eq!(data, Some(b"hello".to_vec()));
    }

    #[tokio::test]
    async fn test_read_nonexistent() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        let data = storage.read_bytes("nope.txt").await.unwrap();
        assert!(data.is_none());
    }

    #[tokio::test]
    async fn test_list_keys_nested() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        storage.put("hits/2.json", b"{}".to_vec()).await.unwrap();
        storage.put("hits/1.json", b"{}".to_vec()).await.unwrap();
        storage.put("snapshot/1.json", b"{}".to_vec()).await.unwrap();

        let mut keys = storage.list_keys("hits/").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["hits/1.json", "hits/2.json"]);

        let all = storage.list_keys("").await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn test_list_missing_dir_is_empty() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        assert!(storage.list_keys("hits/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let tmp = TempDir::new().unwrap();
        let storage = LocalStorage::new(tmp.path());

        storage.put("hits/1.json", b"{}".to_vec()).await.unwrap();
        storage.delete("hits/1.json").await.unwrap();
        storage.delete("hits/1.json").await.unwrap();
        assert!(storage.get("hits/1.json").await.unwrap().is_none());
    }
}
