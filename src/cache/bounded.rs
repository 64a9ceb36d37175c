//! Capacity- and time-bounded local cache.

use std::time::Duration;

use parking_lot::Mutex;
use tracing::trace;

use crate::cache::{Cache, CacheConfiguration, CacheKind, CacheStats, CacheStore};

// == Bounded TTL Cache ==
/// The primary [`Cache`] implementation: a [`CacheStore`] behind a mutex.
///
/// With [`ExpiryPolicy::AfterAccess`](crate::cache::ExpiryPolicy::AfterAccess)
/// every hit restarts the entry's expiry clock; with `AfterWrite` only writes
/// do. When the size bound is reached the least recently used entry is
/// evicted.
///
/// `get_with` releases the lock while the loader runs, so concurrent misses
/// on the same key may each run the loader; the last store wins.
#[derive(Debug)]
pub struct BoundedTtlCache<V> {
    region: String,
    default_value: Option<V>,
    store: Mutex<CacheStore<V>>,
}

impl<V: Clone> BoundedTtlCache<V> {
    pub fn new(config: CacheConfiguration<V>) -> Self {
        let store = CacheStore::new(
            config.max_entries(),
            config.initial_capacity,
            config.expiry.ttl(),
            config.expiry.refreshes_on_access(),
        );
        Self {
            region: config.region,
            default_value: config.default_value,
            store: Mutex::new(store),
        }
    }
}

impl<V> Cache<V> for BoundedTtlCache<V>
where
    V: Clone + Send + Sync,
{
    fn region(&self) -> &str {
        &self.region
    }

    fn kind(&self) -> CacheKind {
        CacheKind::Bounded
    }

    fn get_if_present(&self, key: &str) -> Option<V> {
        self.store.lock().get(key)
    }

    fn get(&self, key: &str) -> Option<V> {
        self.get_if_present(key)
            .or_else(|| self.default_value.clone())
    }

    fn get_with(&self, key: &str, loader: &dyn Fn(&str) -> Option<V>) -> Option<V> {
        if let Some(value) = self.get_if_present(key) {
            return Some(value);
        }

        trace!(region = %self.region, key, "cache miss, running loader");
        match loader(key) {
            Some(value) => {
                self.store.lock().set(key, value.clone(), None);
                Some(value)
            }
            None => self.default_value.clone(),
        }
    }

    fn get_all(&self) -> Vec<V> {
        self.store.lock().values()
    }

    fn keys(&self) -> Vec<String> {
        self.store.lock().keys()
    }

    fn entries(&self) -> Vec<(String, V)> {
        self.store.lock().entries()
    }

    fn put(&self, key: &str, value: V) {
        self.store.lock().set(key, value, None);
    }

    fn put_with_ttl(&self, key: &str, value: V, ttl_seconds: u64) {
        if ttl_seconds == 0 {
            return;
        }
        self.store
            .lock()
            .set(key, value, Some(Duration::from_secs(ttl_seconds)));
    }

    fn invalidate(&self, key: &str) {
        self.store.lock().delete(key);
    }

    fn invalidate_all(&self) {
        self.store.lock().clear();
    }

    fn len(&self) -> usize {
        self.store.lock().len()
    }

    fn stats(&self) -> CacheStats {
        self.store.lock().stats()
    }

    fn cleanup_expired(&self) -> usize {
        self.store.lock().cleanup_expired()
    }
}

// == Unit Tests ==
#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheBuilder;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread::{self, sleep};

    fn cache(max: i64) -> Arc<dyn Cache<String>> {
        CacheBuilder::new()
            .for_region("test")
            .unwrap()
            .with_maximum_size(max)
            .unwrap()
            .build()
    }

    #[test]
    fn test_put_then_get_if_present() {
        let cache = cache(10);
        cache.put("k", "v".to_string());
        assert_eq!(cache.get_if_present("k"), Some("v".to_string()));
    }

    #[test]
    fn test_get_if_present_ignores_default() {
        let cache = CacheBuilder::new()
            .with_default_value(0u32)
            .build();

        assert_eq!(cache.get_if_present("missing"), None);
        assert_eq!(cache.get("missing"), Some(0));
        // the default is not stored by the read
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn test_get_with_stores_loader_result() {
        let cache = cache(10);
        let calls = AtomicUsize::new(0);
        let loader = |key: &str| {
            calls.fetch_add(1, Ordering::SeqCst);
            Some(format!("loaded-{key}"))
        };

        assert_eq!(cache.get_with("a", &loader), Some("loaded-a".to_string()));
        assert_eq!(cache.get_with("a", &loader), Some("loaded-a".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cache.get_if_present("a"), Some("loaded-a".to_string()));
    }

    #[test]
    fn test_get_with_none_returns_default_without_storing() {
        let cache = CacheBuilder::new()
            .with_default_value("fallback".to_string())
            .build();

        assert_eq!(
            cache.get_with("a", &|_| None),
            Some("fallback".to_string())
        );
        assert_eq!(cache.get_if_present("a"), None);
    }

    #[test]
    fn test_put_overwrites() {
        let cache = cache(10);
        cache.put("k", "v1".to_string());
        cache.put("k", "v2".to_string());
        assert_eq!(cache.get("k"), Some("v2".to_string()));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidate() {
        let cache = cache(10);
        cache.put("a", "1".to_string());
        cache.put("b", "2".to_string());

        cache.invalidate("a");
        cache.invalidate("missing");
        assert_eq!(cache.get_if_present("a"), None);
        assert_eq!(cache.len(), 1);

        cache.invalidate_all();
        assert!(cache.is_empty());
        assert!(cache.get_all().is_empty());
    }

    #[test]
    fn test_capacity_is_maintained() {
        let cache = cache(3);
        for i in 0..10 {
            cache.put(&format!("k{i}"), i.to_string());
            assert!(cache.len() <= 3);
        }
        assert_eq!(cache.stats().evictions, 7);
    }

    #[test]
    fn test_expire_after_write() {
        let cache = CacheBuilder::new()
            .expire_after_write(Duration::from_secs(1))
            .build();

        cache.put("k", 1u8);
        sleep(Duration::from_millis(500));
        assert_eq!(cache.get_if_present("k"), Some(1));

        sleep(Duration::from_millis(1_000));
        assert_eq!(cache.get_if_present("k"), None);
    }

    #[test]
    fn test_expire_after_write_not_extended_by_reads() {
        let cache = CacheBuilder::new()
            .expire_after_write(Duration::from_secs(1))
            .build();

        cache.put("k", 1u8);
        sleep(Duration::from_millis(600));
        assert_eq!(cache.get_if_present("k"), Some(1));
        sleep(Duration::from_millis(600));
        assert_eq!(cache.get_if_present("k"), None);
    }

    #[test]
    fn test_expire_after_access_extended_by_reads() {
        let cache = CacheBuilder::new()
            .expire_after_access(Duration::from_secs(1))
            .build();

        cache.put("k", 1u8);
        for _ in 0..3 {
            sleep(Duration::from_millis(600));
            assert_eq!(cache.get_if_present("k"), Some(1));
        }

        sleep(Duration::from_millis(1_200));
        assert_eq!(cache.get_if_present("k"), None);
    }

    #[test]
    fn test_put_with_ttl() {
        let cache = cache(10);
        cache.put_with_ttl("short", "a".to_string(), 1);
        cache.put_with_ttl("never", "b".to_string(), 0);

        assert_eq!(cache.get_if_present("short"), Some("a".to_string()));
        assert_eq!(cache.get_if_present("never"), None);

        sleep(Duration::from_millis(1_100));
        assert_eq!(cache.get_if_present("short"), None);
        assert_eq!(cache.cleanup_expired(), 0);
    }

    #[test]
    fn test_stats_counts_reads() {
        let cache = cache(10);
        cache.put("a", "1".to_string());
        cache.get("a");
        cache.get("b");
        cache.get_if_present("c");

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 2);
        assert_eq!(stats.total_entries, 1);
    }

    #[test]
    fn test_get_with_is_not_single_flight() {
        let cache: Arc<dyn Cache<u32>> = CacheBuilder::new().build();
        let calls = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(4));

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let cache = Arc::clone(&cache);
                let calls = Arc::clone(&calls);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    cache.get_with("k", &|_| {
                        calls.fetch_add(1, Ordering::SeqCst);
                        // hold every loader open until all threads have missed
                        barrier.wait();
                        Some(7)
                    })
                })
            })
            .collect();

        for handle in handles {
            assert_eq!(handle.join().unwrap(), Some(7));
        }
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(cache.get_if_present("k"), Some(7));
    }
}
