//! Hit outbox: an approximately FIFO queue on top of an object store.
//!
//! Entry keys look like `{prefix}/{secs:012}-{seq:06}-{id}.json`. The
//! timestamp is fixed-width and never decreases, also across restarts on the
//! same store. `seq` counts enqueues within the same second, so lexicographic
//! key order is enqueue order.
//!
//! `peek_oldest` and `delete` are separate calls. A consumer that crashes
//! between them sees the entry again (at-least-once delivery).
//!
//! Entries that no longer parse are moved under `{prefix}-dead/` by
//! `peek_oldest`, so they neither block the queue nor count as pending.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::error::{AppError, Result};
use crate::models::Listing;
use crate::storage::{ObjectStore, join_key, sanitize_key};

/// An entry returned by [`HitOutbox::peek_oldest`].
#[derive(Debug, Clone, PartialEq)]
pub struct OutboxEntry {
    /// Full store key; pass it back to [`HitOutbox::delete`]
    pub key: String,
    pub listing: Listing,
}

#[derive(Debug)]
struct KeyClock {
    last_secs: i64,
    seq: u32,
    /// Whether `last_secs`/`seq` already account for keys left by earlier runs
    seeded: bool,
}

/// Durable queue of filter-matched listings.
pub struct HitOutbox {
    store: Arc<dyn ObjectStore>,
    prefix: String,
    clock: Mutex<KeyClock>,
}

impl HitOutbox {
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            clock: Mutex::new(KeyClock {
                last_secs: i64::MIN,
                seq: 0,
                seeded: false,
            }),
        }
    }

    fn list_prefix(&self) -> String {
        join_key(&self.prefix, "")
    }

    fn dead_prefix(&self) -> String {
        format!("{}-dead", self.prefix.trim_end_matches('/'))
    }

    fn clock(&self) -> Result<MutexGuard<'_, KeyClock>> {
        self.clock
            .lock()
            .map_err(|_| AppError::storage("outbox clock lock poisoned"))
    }

    /// `(secs, seq)` encoded in an entry key.
    fn key_position(&self, key: &str) -> Option<(i64, u32)> {
        let name = key.strip_prefix(&self.list_prefix())?;
        let mut parts = name.splitn(3, '-');
        let secs = parts.next()?.parse().ok()?;
        let seq = parts.next()?.parse().ok()?;
        Some((secs, seq))
    }

    /// Make the clock start after every entry already in the store.
    async fn seed_clock(&self) -> Result<()> {
        let seeded = self.clock()?.seeded;
        if seeded {
            return Ok(());
        }

        let keys = self.store.list_keys(&self.list_prefix()).await?;
        let latest = keys.iter().filter_map(|key| self.key_position(key)).max();

        let mut clock = self.clock()?;
        if let Some((secs, seq)) = latest {
            if (secs, seq) > (clock.last_secs, clock.seq) {
                log::debug!("Outbox clock resumes after {}-{}", secs, seq);
                clock.last_secs = secs;
                clock.seq = seq;
            }
        }
        clock.seeded = true;
        Ok(())
    }

    fn next_key(&self, id: &str, now: DateTime<Utc>) -> Result<String> {
        let mut clock = self.clock()?;

        let secs = now.timestamp().max(clock.last_secs);
        if secs == clock.last_secs {
            clock.seq += 1;
        } else {
            clock.last_secs = secs;
            clock.seq = 0;
        }

        Ok(join_key(
            &self.prefix,
            &format!("{:012}-{:06}-{}.json", secs, clock.seq, sanitize_key(id)),
        ))
    }

    /// Persist a listing as a new entry. Returns its key.
    pub async fn enqueue(&self, listing: &Listing) -> Result<String> {
        self.enqueue_at(listing, Utc::now()).await
    }

    /// Like [`Self::enqueue`] with an explicit enqueue time.
    pub async fn enqueue_at(&self, listing: &Listing, now: DateTime<Utc>) -> Result<String> {
        self.seed_clock().await?;
        let key = self.next_key(&listing.id, now)?;
        let bytes = serde_json::to_vec(listing)?;
        self.store.put(&key, bytes).await?;
        log::debug!("Enqueued hit {} as {}", listing.id, key);
        Ok(key)
    }

    /// The entry with the smallest key, or `None` when the outbox is empty.
    pub async fn peek_oldest(&self) -> Result<Option<OutboxEntry>> {
        let mut keys = self.store.list_keys(&self.list_prefix()).await?;
        keys.sort();

        for key in keys {
            // Deleted between list and get.
            let Some(bytes) = self.store.get(&key).await? else {
                continue;
            };
            match serde_json::from_slice::<Listing>(&bytes) {
                Ok(listing) => return Ok(Some(OutboxEntry { key, listing })),
                Err(e) => {
                    log::warn!("Moving unreadable outbox entry {} aside: {}", key, e);
                    self.move_to_dead(&key, bytes).await?;
                }
            }
        }

        Ok(None)
    }

    async fn move_to_dead(&self, key: &str, bytes: Vec<u8>) -> Result<()> {
        let name = key.strip_prefix(&self.list_prefix()).unwrap_or(key);
        self.store
            .put(&join_key(&self.dead_prefix(), name), bytes)
            .await?;
        self.store.delete(key).await
    }

    /// Remove an entry. Deleting an absent key is not an error.
    pub async fn delete(&self, key: &str) -> Result<()> {
        self.store.delete(key).await
    }

    /// Number of outstanding entries.
    pub async fn count(&self) -> Result<usize> {
        Ok(self.store.list_keys(&self.list_prefix()).await?.len())
    }

    /// Number of entries moved aside as unreadable.
    pub async fn dead_count(&self) -> Result<usize> {
        let prefix = join_key(&self.dead_prefix(), "");
        Ok(self.store.list_keys(&prefix).await?.len())
    }
}
