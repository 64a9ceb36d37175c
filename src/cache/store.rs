//! Cache Store Module
//!
//! Unsynchronized cache engine combining HashMap storage with LRU tracking and
//! TTL expiration. [`BoundedTtlCache`](crate::cache::BoundedTtlCache) wraps it
//! in a lock.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use tracing::trace;

use crate::cache::{CacheEntry, CacheStats, LruTracker};

// == Cache Store ==
/// Cache storage with LRU eviction and TTL support.
#[derive(Debug)]
pub struct CacheStore<V> {
    /// Key-value storage
    entries: HashMap<String, CacheEntry<V>>,
    /// LRU access tracker
    lru: LruTracker,
    /// Performance statistics
    stats: CacheStats,
    /// Maximum number of entries allowed, None = unbounded
    max_entries: Option<usize>,
    /// TTL applied to entries written without an explicit TTL
    default_ttl: Option<Duration>,
    /// Whether reads restart an entry's expiry clock
    refresh_on_access: bool,
}

impl<V: Clone> CacheStore<V> {
    // == Constructor ==
    /// Creates a new CacheStore.
    ///
    /// # Arguments
    /// * `max_entries` - Maximum number of entries, None for no bound
    /// * `initial_capacity` - Number of entries to pre-allocate
    /// * `default_ttl` - TTL for entries written without an explicit TTL
    /// * `refresh_on_access` - Restart the expiry clock on every hit
    pub fn new(
        max_entries: Option<usize>,
        initial_capacity: usize,
        default_ttl: Option<Duration>,
        refresh_on_access: bool,
    ) -> Self {
        let capacity = match max_entries {
            Some(max) => initial_capacity.min(max),
            None => initial_capacity,
        };
        Self {
            entries: HashMap::with_capacity(capacity),
            lru: LruTracker::new(),
            stats: CacheStats::new(),
            max_entries,
            default_ttl,
            refresh_on_access,
        }
    }

    // == Set ==
    /// Stores a key-value pair, overwriting any existing entry and resetting
    /// its expiry clock.
    ///
    /// If the cache is at capacity, expired entries are dropped first and then
    /// the least recently used entry is evicted.
    ///
    /// # Arguments
    /// * `key` - The key to store
    /// * `value` - The value to store
    /// * `ttl` - Optional TTL (uses the store's default TTL if None)
    pub fn set(&mut self, key: &str, value: V, ttl: Option<Duration>) {
        if self.max_entries == Some(0) {
            return;
        }

        let is_overwrite = self.entries.contains_key(key);

        if !is_overwrite && self.is_full() {
            self.cleanup_expired();
            while self.is_full() {
                match self.lru.evict_oldest() {
                    Some(evicted_key) => {
                        trace!(key = %evicted_key, "evicting least recently used entry");
                        self.entries.remove(&evicted_key);
                        self.stats.record_eviction();
                    }
                    None => break,
                }
            }
        }

        let entry = CacheEntry::new(value, ttl.or(self.default_ttl));
        self.entries.insert(key.to_string(), entry);
        self.lru.touch(key);
        self.stats.set_total_entries(self.entries.len());
    }

    fn is_full(&self) -> bool {
        matches!(self.max_entries, Some(max) if self.entries.len() >= max)
    }

    // == Get ==
    /// Retrieves a live value by key, recording a hit or a miss.
    ///
    /// Expired entries are removed and counted as misses.
    pub fn get(&mut self, key: &str) -> Option<V> {
        let value = self.lookup(key);
        match value {
            Some(_) => self.stats.record_hit(),
            None => self.stats.record_miss(),
        }
        value
    }

    fn lookup(&mut self, key: &str) -> Option<V> {
        let now = Instant::now();
        let expired = self.entries.get(key)?.is_expired_at(now);

        if expired {
            self.remove_entry(key);
            self.stats.record_expirations(1);
            return None;
        }

        let refresh = self.refresh_on_access;
        let entry = self.entries.get_mut(key)?;
        if refresh {
            entry.refresh();
        }
        let value = entry.value.clone();
        self.lru.touch(key);
        Some(value)
    }

    // == Delete ==
    /// Removes an entry by key. Returns whether an entry was present.
    pub fn delete(&mut self, key: &str) -> bool {
        self.remove_entry(key)
    }

    fn remove_entry(&mut self, key: &str) -> bool {
        let removed = self.entries.remove(key).is_some();
        if removed {
            self.lru.remove(key);
            self.stats.set_total_entries(self.entries.len());
        }
        removed
    }

    // == Clear ==
    /// Removes every entry. Counters are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.lru.clear();
        self.stats.set_total_entries(0);
    }

    // == Snapshots ==
    /// Returns clones of every live value.
    pub fn values(&self) -> Vec<V> {
        let now = Instant::now();
        self.entries
            .values()
            .filter(|entry| !entry.is_expired_at(now))
            .map(|entry| entry.value.clone())
            .collect()
    }

    /// Returns every live entry as a `(key, value)` pair.
    pub fn entries(&self) -> Vec<(String, V)> {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .map(|(key, entry)| (key.clone(), entry.value.clone()))
            .collect()
    }

    /// Returns the keys of every live entry.
    pub fn keys(&self) -> Vec<String> {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|(_, entry)| !entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect()
    }

    // == Stats ==
    /// Returns current cache statistics.
    pub fn stats(&self) -> CacheStats {
        let mut stats = self.stats.clone();
        stats.set_total_entries(self.len());
        stats
    }

    // == Cleanup Expired ==
    /// Removes all expired entries from the cache.
    ///
    /// Returns the number of entries removed.
    pub fn cleanup_expired(&mut self) -> usize {
        let now = Instant::now();
        let expired_keys: Vec<String> = self
            .entries
            .iter()
            .filter(|(_, entry)| entry.is_expired_at(now))
            .map(|(key, _)| key.clone())
            .collect();

        let count = expired_keys.len();
        for key in expired_keys {
            self.entries.remove(&key);
            self.lru.remove(&key);
        }

        self.stats.record_expirations(count);
        self.stats.set_total_entries(self.entries.len());
        count
    }

    // == Length ==
    /// Returns the number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .values()
            .filter(|entry| !entry.is_expired_at(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
