//! Cache Module
//!
//! Region-scoped key/value caches with TTL expiration and LRU eviction, a
//! disabled implementation behind the same contract, and a soft cache for
//! values that may be reclaimed under memory pressure.

mod bounded;
mod builder;
mod entry;
mod lru;
mod noop;
mod soft;
mod stats;
mod store;
mod traits;


// Re-export public types
pub use bounded::BoundedTtlCache;
pub use builder::{
    CacheBuilder, CacheConfiguration, ExpiryPolicy, DEFAULT_INITIAL_CAPACITY, DEFAULT_REGION,
    UNBOUNDED,
};
pub use entry::CacheEntry;
pub use lru::LruTracker;
pub use noop::NoOpCache;
pub use soft::{ReclaimableHandle, SoftCache};
pub use stats::CacheStats;
pub use store::CacheStore;
pub use traits::{Cache, CacheKind};
