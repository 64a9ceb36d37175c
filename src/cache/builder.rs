//! Cache Builder Module
//!
//! Fluent, validated configuration that decides at `build()` time whether a
//! live or a disabled cache is produced.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::debug;

use crate::cache::{BoundedTtlCache, Cache, NoOpCache};
use crate::error::{CacheError, Result};

/// Region used when none is configured.
pub const DEFAULT_REGION: &str = "default";

/// Initial capacity used when none is configured.
pub const DEFAULT_INITIAL_CAPACITY: usize = 16;

/// Maximum size meaning "no bound".
pub const UNBOUNDED: i64 = -1;

// == Expiry Policy ==
/// How entries of a region expire. The variants are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "type", content = "seconds", rename_all = "snake_case")]
pub enum ExpiryPolicy {
    /// Entries never expire
    #[default]
    None,
    /// Entries expire this many seconds after their last write
    AfterWrite(u64),
    /// Entries expire this many seconds after their last read or write
    AfterAccess(u64),
}

impl ExpiryPolicy {
    /// TTL applied to entries written without an explicit TTL.
    pub fn ttl(&self) -> Option<Duration> {
        match *self {
            ExpiryPolicy::None => None,
            ExpiryPolicy::AfterWrite(secs) | ExpiryPolicy::AfterAccess(secs) => {
                Some(Duration::from_secs(secs))
            }
        }
    }

    /// Whether a read restarts the expiry clock.
    pub fn refreshes_on_access(&self) -> bool {
        matches!(self, ExpiryPolicy::AfterAccess(_))
    }
}

// == Cache Configuration ==
/// Validated settings of one cache region.
#[derive(Debug, Clone)]
pub struct CacheConfiguration<V> {
    /// Maximum number of entries, -1 = unbounded, 0 = disabled
    pub maximum_size: i64,
    /// Number of entries to pre-allocate
    pub initial_capacity: usize,
    /// Region name
    pub region: String,
    /// Expiry policy of the region
    pub expiry: ExpiryPolicy,
    /// Value returned by reads on a miss, never stored by those reads
    pub default_value: Option<V>,
    /// Forces a NoOp cache regardless of size
    pub disabled: bool,
}

impl<V> Default for CacheConfiguration<V> {
    fn default() -> Self {
        Self {
            maximum_size: UNBOUNDED,
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            region: DEFAULT_REGION.to_string(),
            expiry: ExpiryPolicy::None,
            default_value: None,
            disabled: false,
        }
    }
}

impl<V> CacheConfiguration<V> {
    /// Whether `build()` will produce a NoOp cache.
    pub fn is_disabled(&self) -> bool {
        self.disabled || self.maximum_size == 0
    }

    /// Size bound as an entry count, None when unbounded.
    pub fn max_entries(&self) -> Option<usize> {
        usize::try_from(self.maximum_size).ok()
    }
}

// == Cache Builder ==
/// Fluent builder for [`Cache`] instances.
///
/// Validation happens at the offending call, not at `build()`:
///
/// ```
/// use std::time::Duration;
/// use region_cache::cache::{Cache, CacheBuilder};
///
/// # fn main() -> region_cache::error::Result<()> {
/// let cache = CacheBuilder::<u32>::new()
///     .for_region("periodCache")?
///     .expire_after_access(Duration::from_secs(12 * 3600))
///     .with_initial_capacity(10_000)?
///     .with_maximum_size(30_000)?
///     .build();
///
/// cache.put("202401", 7);
/// assert_eq!(cache.get_if_present("202401"), Some(7));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct CacheBuilder<V> {
    config: CacheConfiguration<V>,
}

impl<V> Default for CacheBuilder<V> {
    fn default() -> Self {
        Self {
            config: CacheConfiguration::default(),
        }
    }
}

impl<V> CacheBuilder<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Bounds the number of entries. Zero disables the cache.
    ///
    /// # Errors
    /// `InvalidArgument` if `maximum_size` is negative.
    pub fn with_maximum_size(mut self, maximum_size: i64) -> Result<Self> {
        if maximum_size < 0 {
            return Err(CacheError::invalid(format!(
                "maximum size must be >= 0, got {maximum_size}"
            )));
        }
        self.config.maximum_size = maximum_size;
        Ok(self)
    }

    /// Sets the number of entries to pre-allocate.
    ///
    /// # Errors
    /// `InvalidArgument` if `initial_capacity` is negative.
    pub fn with_initial_capacity(mut self, initial_capacity: i64) -> Result<Self> {
        let capacity = usize::try_from(initial_capacity).map_err(|_| {
            CacheError::invalid(format!(
                "initial capacity must be >= 0, got {initial_capacity}"
            ))
        })?;
        self.config.initial_capacity = capacity;
        Ok(self)
    }

    /// Names the region this cache belongs to.
    ///
    /// # Errors
    /// `InvalidArgument` if `region` is blank.
    pub fn for_region(mut self, region: impl Into<String>) -> Result<Self> {
        let region = region.into();
        if region.trim().is_empty() {
            return Err(CacheError::invalid("region name must not be blank"));
        }
        self.config.region = region;
        Ok(self)
    }

    /// Entries expire `duration` (truncated to whole seconds) after their last write.
    pub fn expire_after_write(mut self, duration: Duration) -> Self {
        self.config.expiry = ExpiryPolicy::AfterWrite(duration.as_secs());
        self
    }

    /// Entries expire `duration` (truncated to whole seconds) after their
    /// last read or write.
    pub fn expire_after_access(mut self, duration: Duration) -> Self {
        self.config.expiry = ExpiryPolicy::AfterAccess(duration.as_secs());
        self
    }

    /// Value returned by `get`/`get_with` on a miss. Never stored by those reads.
    pub fn with_default_value(mut self, value: V) -> Self {
        self.config.default_value = Some(value);
        self
    }

    /// Forces a NoOp cache regardless of the configured size.
    pub fn disabled(mut self) -> Self {
        self.config.disabled = true;
        self
    }

    /// Current configuration, for inspection before building.
    pub fn configuration(&self) -> &CacheConfiguration<V> {
        &self.config
    }

    // == Build ==
    /// Produces a [`NoOpCache`] when the size is zero or the builder was
    /// disabled, a [`BoundedTtlCache`] otherwise.
    pub fn build(self) -> Arc<dyn Cache<V>> {
        if self.config.is_disabled() {
            debug!(region = %self.config.region, "building disabled cache");
            Arc::new(NoOpCache::new(self.config))
        } else {
            debug!(
                region = %self.config.region,
                maximum_size = self.config.maximum_size,
                expiry = ?self.config.expiry,
                "building bounded cache"
            );
            Arc::new(BoundedTtlCache::new(self.config))
        }
    }
}
