//! In-process object store.
//!
//! An ordered map behind a mutex. Used for tests and dry runs; nothing
//! survives a restart.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::storage::ObjectStore;

/// Embedded ordered-map backend.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn objects(&self) -> Result<MutexGuard<'_, BTreeMap<String, Vec<u8>>>> {
        self.objects
            .lock()
            .map_err(|_| AppError::storage("memory store lock poisoned"))
    }
}

#[async_trait]
impl ObjectStore for MemoryStorage {
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let objects = self.objects()?;
        Ok(objects
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.objects()?.get(key).cloned())
    }

    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        self.objects()?.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.objects()?.remove(key);
        Ok(())
    }
}
