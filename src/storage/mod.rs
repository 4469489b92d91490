//! Storage abstractions for snapshot and outbox persistence.
//!
//! Both the snapshot and the hit outbox are built on a passive key/value
//! object store that only knows list-by-prefix, get, put and delete:
//!
//! ```text
//! {root}/
//! ├── snapshot/                 # One object per listing id
//! │   ├── 2874512460.json
//! │   └── 3341019724.json
//! └── hits/                     # Outbox, sorted by key
//!     ├── 001760781600-000000-2874512460.json
//!     └── 001760781600-000001-3341019724.json
//! ```

pub mod local;
pub mod memory;
pub mod outbox;
#[cfg(feature = "s3")]
pub mod s3;
pub mod snapshot;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{StorageBackend, StorageConfig};

// Re-export for convenience
pub use local::LocalStorage;
pub use memory::MemoryStorage;
pub use outbox::{HitOutbox, OutboxEntry};
pub use snapshot::SnapshotStore;

/// Minimal object store contract shared by every backend.
///
/// Keys are `/`-separated relative paths.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// All keys starting with `prefix`, in no particular order.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>>;

    /// Object bytes, or `None` if the key does not exist.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Create or replace an object.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()>;

    /// Remove an object. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Build the object store selected in the configuration.
pub async fn open_store(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    match config.backend {
        StorageBackend::Local => Ok(Arc::new(LocalStorage::new(&config.root))),
        StorageBackend::Memory => Ok(Arc::new(MemoryStorage::new())),
        #[cfg(feature = "s3")]
        StorageBackend::S3 => {
            let bucket = config
                .bucket
                .clone()
                .ok_or_else(|| AppError::config("storage.bucket is required for s3"))?;
            Ok(Arc::new(
                s3::S3Storage::from_env(bucket, config.prefix.clone()).await?,
            ))
        }
        #[cfg(not(feature = "s3"))]
        StorageBackend::S3 => Err(AppError::config(
            "s3 backend requires building with the 's3' feature",
        )),
    }
}

/// Make an id safe to embed in an object key.
pub(crate) fn sanitize_key(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Join a prefix and a relative name with exactly one `/`.
pub(crate) fn join_key(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}
