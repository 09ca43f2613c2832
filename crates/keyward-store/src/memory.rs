//! In-process key/value store backed by [`DashMap`].
//!
//! Lives as long as the process does. Expiry is lazy: an entry past its
//! deadline is evicted by the first `get` that sees it, or in bulk by
//! [`MemoryStore::purge_expired`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::{debug, trace};

use crate::clock::{Clock, duration_ms};
use crate::error::StoreResult;
use crate::kv::{KeyValueStore, validate_key};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: i64,
}

/// Concurrent in-memory store with per-entry TTL.
///
/// Cheap to clone; clones share the same map.
#[derive(Clone)]
pub struct MemoryStore {
    entries: Arc<DashMap<String, Entry>>,
    clock: Arc<dyn Clock>,
}

impl MemoryStore {
    /// Create an empty store that reads time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Arc::new(DashMap::new()),
            clock,
        }
    }

    /// Number of entries held, including ones that expired but were not yet
    /// evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether `key` is physically present, ignoring expiry.
    pub fn contains_raw(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries.clear();
        debug!("memory store cleared");
    }

    /// Evict every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now_ms();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        let removed = before.saturating_sub(self.entries.len());
        debug!(removed, "purged expired memory entries");
        removed
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        validate_key(key)?;
        let expires_at = self.clock.now_ms().saturating_add(duration_ms(ttl));
        self.entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at,
            },
        );
        trace!(key, expires_at, "memory set");
        Ok(())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        validate_key(key)?;
        let now = self.clock.now_ms();

        // Evict under the shard lock so a concurrent `set` is not clobbered.
        let evicted = self
            .entries
            .remove_if(key, |_, entry| entry.expires_at <= now)
            .is_some();
        if evicted {
            debug!(key, "evicted expired memory entry");
            return Ok(None);
        }

        Ok(self.entries.get(key).map(|entry| entry.value.clone()))
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        validate_key(key)?;
        self.entries.remove(key);
        trace!(key, "memory delete");
        Ok(())
    }
}
