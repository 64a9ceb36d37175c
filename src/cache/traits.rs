//! The uniform key/value contract every cache implementation honours.

use serde::Serialize;

use crate::cache::CacheStats;

/// Which implementation a builder produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheKind {
    /// Capacity- and time-bounded local store
    Bounded,
    /// Always-miss cache used when caching is disabled
    NoOp,
}

/// A region-scoped mapping from string keys to values of type `V`.
///
/// All methods are safe to call from many threads at once. Compound
/// sequences such as [`Cache::get_with`] are *not* atomic: two concurrent
/// misses on one key may both run the loader, and the last write wins.
/// Callers that need single-flight loading must coordinate themselves (the
/// [`SoftCache`](crate::cache::SoftCache) provides it per key).
///
/// Misses are never errors; reads return `Option<V>`.
pub trait Cache<V>: Send + Sync {
    /// Name of the region this cache belongs to.
    fn region(&self) -> &str;

    /// Implementation backing this cache.
    fn kind(&self) -> CacheKind;

    /// Returns the stored value if present and live.
    ///
    /// Never runs a loader and never returns the configured default.
    fn get_if_present(&self, key: &str) -> Option<V>;

    /// Returns the stored value, or the configured default when there is
    /// none. The default is not stored.
    fn get(&self, key: &str) -> Option<V>;

    /// Returns the stored value, or runs `loader` on a miss.
    ///
    /// A `Some` result from the loader is stored under `key` and returned; a
    /// `None` result falls back to the configured default, which is not
    /// stored.
    fn get_with(&self, key: &str, loader: &dyn Fn(&str) -> Option<V>) -> Option<V>;

    /// Snapshot of every live value. Weakly consistent with concurrent writers.
    fn get_all(&self) -> Vec<V>;

    /// Snapshot of every live key.
    fn keys(&self) -> Vec<String>;

    /// Snapshot of every live `(key, value)` pair. Does not count as a read.
    fn entries(&self) -> Vec<(String, V)>;

    /// Stores `value` under `key`, replacing any existing entry and
    /// restarting its expiry clock.
    fn put(&self, key: &str, value: V);

    /// Stores `value` with a per-entry TTL that overrides the region's
    /// expiry policy. A TTL of zero seconds stores nothing.
    fn put_with_ttl(&self, key: &str, value: V, ttl_seconds: u64);

    /// Removes the entry for `key`, if any.
    fn invalidate(&self, key: &str);

    /// Removes every entry of this region.
    fn invalidate_all(&self);

    /// Number of live entries.
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Hit, miss, eviction and expiration counters for this region.
    fn stats(&self) -> CacheStats;

    /// Drops entries whose TTL elapsed. Returns how many were dropped.
    fn cleanup_expired(&self) -> usize;

    /// Whether this cache stores anything at all.
    fn is_enabled(&self) -> bool {
        self.kind() != CacheKind::NoOp
    }
}
