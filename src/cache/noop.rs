//! Always-miss cache used when caching is disabled.

use crate::cache::{Cache, CacheConfiguration, CacheKind, CacheStats};

/// A [`Cache`] that never stores anything.
///
/// Reads return the configured default, `get_with` runs the loader on every
/// call without storing its result.
#[derive(Debug)]
pub struct NoOpCache<V> {
    region: String,
    default_value: Option<V>,
}

impl<V> NoOpCache<V> {
    pub fn new(config: CacheConfiguration<V>) -> Self {
        Self {
            region: config.region,
            default_value: config.default_value,
        }
    }
}

impl<V> Cache<V> for NoOpCache<V>
where
    V: Clone + Send + Sync,
{
    fn region(&self) -> &str {
        &self.region
    }

    fn kind(&self) -> CacheKind {
        CacheKind::NoOp
    }

    fn get_if_present(&self, _key: &str) -> Option<V> {
        None
    }

    fn get(&self, _key: &str) -> Option<V> {
        self.default_value.clone()
    }

    fn get_with(&self, key: &str, loader: &dyn Fn(&str) -> Option<V>) -> Option<V> {
        loader(key).or_else(|| self.default_value.clone())
    }

    fn get_all(&self) -> Vec<V> {
        Vec::new()
    }

    fn keys(&self) -> Vec<String> {
        Vec::new()
    }

    fn entries(&self) -> Vec<(String, V)> {
        Vec::new()
    }

    fn put(&self, _key: &str, _value: V) {}

    fn put_with_ttl(&self, _key: &str, _value: V, _ttl_seconds: u64) {}

    fn invalidate(&self, _key: &str) {}

    fn invalidate_all(&self) {}

    fn len(&self) -> usize {
        0
    }

    fn stats(&self) -> CacheStats {
        CacheStats::new()
    }

    fn cleanup_expired(&self) -> usize {
        0
    }
}
