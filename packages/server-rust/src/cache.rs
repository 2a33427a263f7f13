//! Key-value cache store with per-entry TTL.
//!
//! The edge treats the store as an external, concurrently accessed service:
//! two requests may miss the same key and both write it, last write wins.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use edgeroute_core::CacheKey;
use tokio::time::Instant;
use tracing::debug;

/// External key-value store used to cache path resolutions.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Returns the value stored under `key`, or `None` if absent or expired.
    async fn get(&self, key: &CacheKey) -> anyhow::Result<Option<String>>;

    /// Stores `value` under `key` for `ttl`, replacing any previous value.
    async fn put(&self, key: &CacheKey, value: String, ttl: Duration) -> anyhow::Result<()>;
}

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// Entries kept by [`MemoryCacheStore::new`].
pub const DEFAULT_CACHE_CAPACITY: usize = 100_000;

/// Share of live entries evicted at once when the store is full of them.
const EVICTION_DIVISOR: usize = 10;

/// In-process [`CacheStore`] backed by [`DashMap`].
///
/// Holds at most `capacity` entries. An expired entry is dropped when read,
/// and all expired entries are dropped once the store fills up. If it is
/// still full, the entries closest to expiry make room.
#[derive(Debug)]
pub struct MemoryCacheStore {
    entries: DashMap<String, Entry>,
    capacity: usize,
}

impl Default for MemoryCacheStore {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }
}

impl MemoryCacheStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding at most `capacity` entries (at least one).
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Number of stored entries, including expired ones not yet reclaimed.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Synchronous variant of [`CacheStore::put`], used for seeding.
    pub fn insert(&self, key: &CacheKey, value: impl Into<String>, ttl: Duration) {
        let now = Instant::now();
        if self.entries.len() >= self.capacity && !self.entries.contains_key(key.as_str()) {
            self.make_room(now);
        }
        self.entries.insert(
            key.as_str().to_string(),
            Entry {
                value: value.into(),
                expires_at: now + ttl,
            },
        );
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| entry.expires_at > now);
        before.saturating_sub(self.entries.len())
    }

    fn make_room(&self, now: Instant) {
        self.entries.retain(|_, entry| entry.expires_at > now);
        if self.entries.len() < self.capacity {
            return;
        }

        let mut by_expiry: Vec<(Instant, String)> = self
            .entries
            .iter()
            .map(|entry| (entry.expires_at, entry.key().clone()))
            .collect();
        by_expiry.sort_unstable();
        let evict = (self.capacity / EVICTION_DIVISOR).max(1);
        for (_, key) in by_expiry.into_iter().take(evict) {
            self.entries.remove(&key);
        }
        debug!(evicted = evict, capacity = self.capacity, "cache full, evicted live entries");
    }

    /// Returns the raw stored value even if it is expired.
    #[must_use]
    pub fn peek(&self, key: &CacheKey) -> Option<String> {
        self.entries.get(key.as_str()).map(|e| e.value.clone())
    }
}

#[async_trait]
impl CacheStore for MemoryCacheStore {
    async fn get(&self, key: &CacheKey) -> anyhow::Result<Option<String>> {
        let now = Instant::now();
        let hit = self
            .entries
            .get(key.as_str())
            .map(|entry| (entry.expires_at > now).then(|| entry.value.clone()));

        match hit {
            Some(Some(value)) => Ok(Some(value)),
            Some(None) => {
                self.entries
                    .remove_if(key.as_str(), |_, entry| entry.expires_at <= now);
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &CacheKey, value: String, ttl: Duration) -> anyhow::Result<()> {
        self.insert(key, value, ttl);
        Ok(())
    }
}
