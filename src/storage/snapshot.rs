//! Snapshot of the last persisted listings.
//!
//! One JSON object per listing id under `{prefix}/{id}.json`. Upserts replace
//! whole listings; nested structures are never merged.

use std::collections::HashMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::error::Result;
use crate::models::Listing;
use crate::storage::{ObjectStore, join_key, sanitize_key};

const EXTENSION: &str = ".json";

/// Durable mapping from listing id to the last persisted listing.
#[derive(Clone)]
pub struct SnapshotStore {
    store: Arc<dyn ObjectStore>,
    prefix: String,
    max_concurrent: usize,
}

impl SnapshotStore {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            max_concurrent: 8,
        }
    }

    /// Bound the number of concurrent object reads in [`Self::read_all`].
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    fn key(&self, id: &str) -> String {
        join_key(&self.prefix, &format!("{}{EXTENSION}", sanitize_key(id)))
    }

    fn list_prefix(&self) -> String {
        join_key(&self.prefix, "")
    }

    async fn keys(&self) -> Result<Vec<String>> {
        let keys = self.store.list_keys(&self.list_prefix()).await?;
        Ok(keys
            .into_iter()
            .filter(|key| key.ends_with(EXTENSION))
            .collect())
    }

    /// Ids of all stored listings (as they appear in object keys).
    pub async fn ids(&self) -> Result<Vec<String>> {
        let prefix = self.list_prefix();
        Ok(self
            .keys()
            .await?
            .into_iter()
            .filter_map(|key| {
                key.strip_prefix(&prefix)
                    .and_then(|rest| rest.strip_suffix(EXTENSION))
                    .map(str::to_string)
            })
            .collect())
    }

    /// Number of stored listings.
    pub async fn len(&self) -> Result<usize> {
        Ok(self.keys().await?.len())
    }

    /// Load every stored listing keyed by id.
    ///
    /// Any store failure fails the whole read. Objects that no longer parse
    /// are skipped with a warning, which makes their listing look new again.
    pub async fn read_all(&self) -> Result<HashMap<String, Listing>> {
        let keys = self.keys().await?;
        let store = &self.store;

        let mut reads = stream::iter(keys)
            .map(|key| async move {
                let result = store.get(&key).await;
                (key, result)
            })
            .buffer_unordered(self.max_concurrent);

        let mut listings = HashMap::new();
        while let Some((key, result)) = reads.next().await {
            let Some(bytes) = result? else {
                continue;
            };
            match serde_json::from_slice::<Listing>(&bytes) {
                Ok(listing) => {
                    listings.insert(listing.id.clone(), listing);
                }
                Err(e) => log::warn!("Skipping unreadable snapshot object {}: {}", key, e),
            }
        }

        Ok(listings)
    }

    /// Insert or replace the given listings. Returns the number written.
    pub async fn upsert(&self, listings: &[Listing]) -> Result<usize> {
        let mut writes = stream::iter(listings)
            .map(|listing| async move {
                let bytes = serde_json::to_vec(listing)?;
                self.store.put(&self.key(&listing.id), bytes).await
            })
            .buffer_unordered(self.max_concurrent);

        let mut written = 0;
        let mut first_error = None;
        while let Some(result) = writes.next().await {
            match result {
                Ok(()) => written += 1,
                Err(e) => {
                    log::error!("Snapshot write failed: {}", e);
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(written),
        }
    }
}
