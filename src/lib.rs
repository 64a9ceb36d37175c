//! Region Cache - in-process caching for expensive computations
//!
//! Region-scoped caches with TTL expiry and LRU eviction behind one
//! contract, a soft cache for re-derivable values, progressive TTLs, and a
//! memoizing object-size estimator for reporting cache memory burden.

pub mod cache;
pub mod config;
pub mod error;
pub mod facade;
pub mod provider;
pub mod report;
pub mod sizeof;
pub mod tasks;
pub mod ttl;

pub use cache::{Cache, CacheBuilder, CacheKind, ExpiryPolicy, SoftCache};
pub use config::Config;
pub use error::{CacheError, Result};
pub use facade::{CacheFacade, CacheableRequest, TtlMode};
pub use provider::{CacheProvider, CacheRole};
pub use report::{human_readable_size, CacheReport};
pub use sizeof::{Introspect, Reflect, SizeEstimator};
pub use tasks::{spawn_cleanup_task, spawn_invalidation_listener, CacheEvent};
