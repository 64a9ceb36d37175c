//! Soft Cache Module
//!
//! A string-keyed cache for values that are expensive but safely re-derivable.
//! Each entry holds a reclaimable handle that a memory-pressure hook may clear
//! at any time; a cleared handle looks exactly like a value that was never
//! computed, so the next read recomputes it.
//!
//! Rust has no garbage collector to clear handles on its own. Reclamation is
//! explicit instead: [`SoftCache::reclaim`], [`SoftCache::reclaim_all`], or an
//! optional bound on the number of live values after which the oldest handles
//! are cleared.

use std::collections::VecDeque;
use std::sync::{Arc, OnceLock};

use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

// == Reclaimable Handle ==
/// A value slot the memory-pressure hook may clear.
#[derive(Debug)]
pub struct ReclaimableHandle<V> {
    slot: RwLock<Option<V>>,
}

impl<V: Clone> ReclaimableHandle<V> {
    fn new(value: V) -> Self {
        Self {
            slot: RwLock::new(Some(value)),
        }
    }

    /// Returns the value unless it was reclaimed.
    pub fn get(&self) -> Option<V> {
        self.slot.read().clone()
    }

    /// Drops the value. Readers will recompute it.
    pub fn clear(&self) {
        self.slot.write().take();
    }

    pub fn is_cleared(&self) -> bool {
        self.slot.read().is_none()
    }
}

/// Memoizing wrapper around one `on_miss` call: the computation runs at most
/// once per wrapper no matter how often it is queried.
struct Memo<V> {
    cell: OnceLock<V>,
}

impl<V: Clone> Memo<V> {
    fn new() -> Self {
        Self {
            cell: OnceLock::new(),
        }
    }

    fn get(&self, on_miss: &dyn Fn() -> V) -> V {
        self.cell.get_or_init(on_miss).clone()
    }
}

// == Soft Cache ==
/// GC-cooperative secondary cache keyed by string.
///
/// For a given key `on_miss` runs at most once per generation (the span
/// between two reclamations of its handle) and at least once for a
/// generation that has no live value. The map only holds the handles, so a
/// reclaimed value is dropped as soon as readers release their copies.
///
/// `on_miss` runs while the map shard that owns `key` is write-locked. It
/// must not call back into this cache: any key stored in the same shard
/// would deadlock.
pub struct SoftCache<V> {
    entries: DashMap<String, Arc<ReclaimableHandle<V>>>,
    /// Keys in the order their current generation was created
    generations: Mutex<VecDeque<(String, Arc<ReclaimableHandle<V>>)>>,
    /// Live values allowed before the oldest handles are reclaimed
    max_live: Option<usize>,
}

impl<V> Default for SoftCache<V>
where
    V: Clone + Send + Sync,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<V> SoftCache<V>
where
    V: Clone + Send + Sync,
{
    /// Creates a soft cache with no bound on live values.
    pub fn new() -> Self {
        Self {
            entries: DashMap::new(),
            generations: Mutex::new(VecDeque::new()),
            max_live: None,
        }
    }

    /// Creates a soft cache that reclaims the oldest handles once more than
    /// `max_live` values are live.
    pub fn with_max_live(max_live: usize) -> Self {
        Self {
            max_live: Some(max_live),
            ..Self::new()
        }
    }

    // == Get ==
    /// Returns the cached value for `key`, computing it with `on_miss` when
    /// there is no live value.
    ///
    /// A `None` key bypasses the cache and always computes a fresh value.
    pub fn get(&self, key: Option<&str>, on_miss: impl Fn() -> V) -> V {
        let Some(key) = key else {
            return on_miss();
        };

        // lives only for this call, so it never pins the value
        let memo = Memo::new();
        let mut created = false;
        let handle = {
            let mut entry = self
                .entries
                .entry(key.to_string())
                .or_insert_with(|| {
                    created = true;
                    Arc::new(ReclaimableHandle::new(memo.get(&on_miss)))
                });

            if !created && entry.is_cleared() {
                trace!(key, "soft cache handle was reclaimed, recomputing");
                *entry = Arc::new(ReclaimableHandle::new(memo.get(&on_miss)));
                created = true;
            }
            Arc::clone(entry.value())
        };

        if created {
            self.track(key, &handle);
        }

        match handle.get() {
            Some(value) => value,
            // reclaimed since the remap; reuses this call's computation if any
            None => memo.get(&on_miss),
        }
    }

    fn track(&self, key: &str, handle: &Arc<ReclaimableHandle<V>>) {
        let Some(max_live) = self.max_live else {
            return;
        };

        let mut generations = self.generations.lock();
        generations.retain(|(_, handle)| !handle.is_cleared());
        generations.push_back((key.to_string(), Arc::clone(handle)));

        while generations.len() > max_live {
            if let Some((oldest, handle)) = generations.pop_front() {
                debug!(key = %oldest, "soft cache over its live bound, reclaiming");
                handle.clear();
            }
        }
    }

    // == Reclamation ==
    /// Clears the handle of `key`, as the memory manager would under pressure.
    pub fn reclaim(&self, key: &str) {
        if let Some(handle) = self.entries.get(key) {
            handle.clear();
        }
    }

    /// Clears every handle.
    pub fn reclaim_all(&self) {
        let mut cleared = 0usize;
        for handle in self.entries.iter() {
            if !handle.is_cleared() {
                handle.clear();
                cleared += 1;
            }
        }
        self.generations.lock().clear();
        debug!(cleared, "soft cache reclaimed all handles");
    }

    /// Drops every entry, live or reclaimed.
    pub fn clear(&self) {
        self.entries.clear();
        self.generations.lock().clear();
    }

    /// Number of keys whose handle still holds a value.
    pub fn live_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|handle| !handle.is_cleared())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_none_key_bypasses_cache() {
        let cache = SoftCache::new();
        let calls = AtomicUsize::new(0);
        let on_miss = || calls.fetch_add(1, Ordering::SeqCst);

        assert_eq!(cache.get(None, on_miss), 0);
        assert_eq!(cache.get(None, on_miss), 1);
        assert_eq!(cache.live_count(), 0);
    }

    #[test]
    fn test_value_is_computed_once() {
        let cache = SoftCache::new();
        let calls = AtomicUsize::new(0);
        let on_miss = || {
            calls.fetch_add(1, Ordering::SeqCst);
            "grid".to_string()
        };

        assert_eq!(cache.get(Some("k"), on_miss), "grid");
        assert_eq!(cache.get(Some("k"), on_miss), "grid");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.live_count(), 1);
    }

    #[test]
    fn test_reclaimed_value_is_recomputed() {
        let cache = SoftCache::new();
        let calls = AtomicUsize::new(0);
        let on_miss = || calls.fetch_add(1, Ordering::SeqCst) + 100;

        assert_eq!(cache.get(Some("k"), on_miss), 100);
        cache.reclaim("k");
        assert_eq!(cache.live_count(), 0);

        assert_eq!(cache.get(Some("k"), on_miss), 101);
        assert_eq!(cache.get(Some("k"), on_miss), 101);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_reclaim_all() {
        let cache = SoftCache::new();
        cache.get(Some("a"), || 1);
        cache.get(Some("b"), || 2);
        assert_eq!(cache.live_count(), 2);

        cache.reclaim_all();
        assert_eq!(cache.live_count(), 0);
        assert_eq!(cache.get(Some("a"), || 10), 10);
    }

    #[test]
    fn test_max_live_reclaims_oldest() {
        let cache = SoftCache::with_max_live(2);
        cache.get(Some("a"), || 1);
        cache.get(Some("b"), || 2);
        cache.get(Some("c"), || 3);

        assert_eq!(cache.live_count(), 2);
        // "a" was the oldest generation and has been reclaimed
        assert_eq!(cache.get(Some("a"), || 11), 11);
        assert_eq!(cache.get(Some("c"), || 33), 3);
    }

    #[test]
    fn test_concurrent_misses_compute_once() {
        let cache = Arc::new(SoftCache::new());
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    cache.get(Some("shared"), || {
                        calls.fetch_add(1, Ordering::SeqCst);
                        thread::sleep(Duration::from_millis(50));
                        42u64
                    })
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), 42);
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_memo_runs_once() {
        let memo = Memo::new();
        let calls = AtomicUsize::new(0);
        let on_miss = || calls.fetch_add(1, Ordering::SeqCst);

        assert_eq!(memo.get(&on_miss), 0);
        assert_eq!(memo.get(&on_miss), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reclaim_releases_value() {
        let cache = SoftCache::new();
        let payload = Arc::new(vec![0u8; 1024]);

        let value = cache.get(Some("k"), || Arc::clone(&payload));
        drop(value);
        assert_eq!(Arc::strong_count(&payload), 2);

        cache.reclaim("k");
        assert_eq!(Arc::strong_count(&payload), 1);
    }

    #[test]
    fn test_reclaim_all_and_bound_release_values() {
        let cache = SoftCache::with_max_live(1);
        let first = Arc::new("first".to_string());
        let second = Arc::new("second".to_string());

        cache.get(Some("a"), || Arc::clone(&first));
        cache.get(Some("b"), || Arc::clone(&second));
        // "a" went over the bound
        assert_eq!(Arc::strong_count(&first), 1);
        assert_eq!(Arc::strong_count(&second), 2);

        cache.reclaim_all();
        assert_eq!(Arc::strong_count(&second), 1);
    }

    #[test]
    fn test_clear_drops_entries() {
        let cache = SoftCache::new();
        cache.get(Some("a"), || 1);
        cache.clear();
        assert_eq!(cache.live_count(), 0);
        assert_eq!(cache.get(Some("a"), || 2), 2);
    }
}
