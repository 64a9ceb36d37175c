//! Cache Provider
//!
//! Builds caches for logical roles, keeps a registry of everything it built
//! and fans process-wide operations (clear-all, expiry sweeps, reporting)
//! out to every registered region.

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cache::{Cache, CacheBuilder, CacheKind, ExpiryPolicy, UNBOUNDED};
use crate::config::Config;
use crate::error::Result;
use crate::facade::CacheFacade;
use crate::report::{human_readable_size, CacheReport, CapReport, RegionReport};
use crate::sizeof::{Introspect, SizeEstimator};

const MINUTE: u64 = 60;
const HOUR: u64 = 60 * MINUTE;

// == Cache Roles ==
/// Logical purpose of a cache. Each role carries the region name, expiry and
/// capacity appropriate to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheRole {
    UserFailedLoginAttempt,
    UserAccountRecoverAttempt,
    UserDisplayName,
    UserDataReadProgram,
    PeriodId,
    ExpressionEvaluation,
    App,
    AnalyticsResponse,
    IsDataApproved,
}

impl CacheRole {
    pub const ALL: [CacheRole; 9] = [
        CacheRole::UserFailedLoginAttempt,
        CacheRole::UserAccountRecoverAttempt,
        CacheRole::UserDisplayName,
        CacheRole::UserDataReadProgram,
        CacheRole::PeriodId,
        CacheRole::ExpressionEvaluation,
        CacheRole::App,
        CacheRole::AnalyticsResponse,
        CacheRole::IsDataApproved,
    ];

    pub fn region(&self) -> &'static str {
        match self {
            CacheRole::UserFailedLoginAttempt => "userFailedLoginAttempt",
            CacheRole::UserAccountRecoverAttempt => "userAccountRecoverAttempt",
            CacheRole::UserDisplayName => "userDisplayNameCache",
            CacheRole::UserDataReadProgram => "DTAM_canUserReadProgramCache",
            CacheRole::PeriodId => "periodCache",
            CacheRole::ExpressionEvaluation => "exprEvalCache",
            CacheRole::App => "appCache",
            CacheRole::AnalyticsResponse => "analyticsResponse",
            CacheRole::IsDataApproved => "isDataApproved",
        }
    }

    pub fn expiry(&self) -> ExpiryPolicy {
        match self {
            CacheRole::UserFailedLoginAttempt | CacheRole::UserAccountRecoverAttempt => {
                ExpiryPolicy::AfterWrite(15 * MINUTE)
            }
            CacheRole::UserDisplayName => ExpiryPolicy::AfterAccess(6 * HOUR),
            CacheRole::UserDataReadProgram => ExpiryPolicy::AfterAccess(3 * HOUR),
            CacheRole::PeriodId => ExpiryPolicy::AfterAccess(12 * HOUR),
            CacheRole::ExpressionEvaluation => ExpiryPolicy::AfterAccess(HOUR),
            CacheRole::App => ExpiryPolicy::None,
            CacheRole::AnalyticsResponse | CacheRole::IsDataApproved => {
                ExpiryPolicy::AfterWrite(12 * HOUR)
            }
        }
    }

    /// Pre-allocated entries, before the capacity factor.
    pub fn initial_capacity(&self) -> Option<i64> {
        match self {
            CacheRole::UserDataReadProgram | CacheRole::PeriodId => Some(10_000),
            CacheRole::ExpressionEvaluation => Some(200),
            _ => None,
        }
    }

    /// Size bound before the capacity factor, [`UNBOUNDED`] for none.
    pub fn maximum_size(&self) -> i64 {
        match self {
            CacheRole::UserDataReadProgram => 50_000,
            CacheRole::PeriodId => 30_000,
            CacheRole::ExpressionEvaluation => 5_000,
            CacheRole::AnalyticsResponse | CacheRole::IsDataApproved => 20_000,
            _ => UNBOUNDED,
        }
    }
}

// == Managed Cache ==
/// Type-erased view of a registered cache.
///
/// The view does not keep the cache alive: once every owner has dropped it,
/// `is_live` turns false and the other operations do nothing.
pub trait ManagedCache: Send + Sync {
    fn region(&self) -> &str;

    fn kind(&self) -> CacheKind;

    fn is_live(&self) -> bool;

    fn invalidate_all(&self);

    fn cleanup_expired(&self) -> usize;

    /// Statistics plus the estimated size of every live entry, None once the
    /// cache has been dropped.
    fn report(&self, estimator: &SizeEstimator, high_burden_threshold: u64)
        -> Option<RegionReport>;
}

struct Registered<V> {
    region: String,
    kind: CacheKind,
    cache: Weak<dyn Cache<V>>,
}

impl<V> ManagedCache for Registered<V>
where
    V: Introspect + Clone,
{
    fn region(&self) -> &str {
        &self.region
    }

    fn kind(&self) -> CacheKind {
        self.kind
    }

    fn is_live(&self) -> bool {
        self.cache.strong_count() > 0
    }

    fn invalidate_all(&self) {
        if let Some(cache) = self.cache.upgrade() {
            cache.invalidate_all();
        }
    }

    fn cleanup_expired(&self) -> usize {
        self.cache
            .upgrade()
            .map_or(0, |cache| cache.cleanup_expired())
    }

    fn report(
        &self,
        estimator: &SizeEstimator,
        high_burden_threshold: u64,
    ) -> Option<RegionReport> {
        let cache = self.cache.upgrade()?;
        let stats = cache.stats();
        let mut size_bytes = 0u64;
        let mut high_burden_entries = 0usize;
        let mut high_burden_bytes = 0u64;

        for (key, value) in cache.entries() {
            let entry_bytes = estimator.sizeof(&key) + estimator.sizeof(&value);
            size_bytes += entry_bytes;
            if entry_bytes > high_burden_threshold {
                high_burden_entries += 1;
                high_burden_bytes += entry_bytes;
            }
        }

        Some(RegionReport {
            region: self.region.clone(),
            entries: stats.total_entries,
            hits: stats.hits,
            misses: stats.misses,
            evictions: stats.evictions,
            hit_rate: stats.hit_rate(),
            size_bytes,
            size: human_readable_size(size_bytes),
            high_burden_entries,
            high_burden_bytes,
            high_burden_size: human_readable_size(high_burden_bytes),
        })
    }
}

// == Cache Provider ==
/// Hands out caches by role and owns the process-wide view of them.
///
/// The registry holds one cache per region and never keeps a cache alive on
/// its own: callers own what they create. Creating a region again replaces
/// the previous registration, and dropped caches are pruned.
pub struct CacheProvider {
    config: Config,
    estimator: SizeEstimator,
    registry: RwLock<BTreeMap<String, Arc<dyn ManagedCache>>>,
}

impl CacheProvider {
    pub fn new(config: Config) -> Self {
        let estimator = SizeEstimator::new(config.sizeof_config());
        Self {
            config,
            estimator,
            registry: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn estimator(&self) -> &SizeEstimator {
        &self.estimator
    }

    /// Builder preconfigured for `role`, with the global disabled flag and
    /// capacity factor applied.
    pub fn builder_for<V>(&self, role: CacheRole) -> Result<CacheBuilder<V>>
    where
        V: Clone + Send + Sync + 'static,
    {
        let mut builder = CacheBuilder::new().for_region(role.region())?;

        // unbounded roles keep the builder's default
        if role.maximum_size() != UNBOUNDED {
            builder = builder.with_maximum_size(self.scaled(role.maximum_size()))?;
        }
        if let Some(capacity) = role.initial_capacity() {
            builder = builder.with_initial_capacity(self.scaled(capacity))?;
        }
        builder = match role.expiry() {
            ExpiryPolicy::None => builder,
            ExpiryPolicy::AfterWrite(secs) => builder.expire_after_write(Duration::from_secs(secs)),
            ExpiryPolicy::AfterAccess(secs) => {
                builder.expire_after_access(Duration::from_secs(secs))
            }
        };
        if self.config.disabled {
            builder = builder.disabled();
        }
        Ok(builder)
    }

    /// Builds and registers the cache of `role`.
    pub fn create<V>(&self, role: CacheRole) -> Result<Arc<dyn Cache<V>>>
    where
        V: Introspect + Clone,
    {
        let cache = self.builder_for(role)?.build();
        self.register(&cache);
        Ok(cache)
    }

    /// Like [`create`](Self::create), with a value returned by reads on a miss.
    pub fn create_with_default<V>(&self, role: CacheRole, default: V) -> Result<Arc<dyn Cache<V>>>
    where
        V: Introspect + Clone,
    {
        let cache = self.builder_for(role)?.with_default_value(default).build();
        self.register(&cache);
        Ok(cache)
    }

    /// Facade over a new analytics response cache, using the configured TTL mode.
    pub fn analytics_facade<V>(&self) -> Result<CacheFacade<V>>
    where
        V: Introspect + Clone,
    {
        let cache = self.create(CacheRole::AnalyticsResponse)?;
        CacheFacade::new(cache, self.config.analytics_ttl())
    }

    /// Adds a cache built elsewhere to clear-all, sweeps and reports, replacing
    /// any earlier cache of the same region.
    pub fn register<V>(&self, cache: &Arc<dyn Cache<V>>)
    where
        V: Introspect + Clone,
    {
        let region = cache.region().to_string();
        debug!(region = %region, kind = ?cache.kind(), "registering cache");

        let registered: Arc<dyn ManagedCache> = Arc::new(Registered {
            region: region.clone(),
            kind: cache.kind(),
            cache: Arc::downgrade(cache),
        });
        let mut registry = self.registry.write();
        registry.retain(|_, managed| managed.is_live());
        if let Some(previous) = registry.insert(region, registered) {
            if previous.is_live() {
                warn!(region = previous.region(), "replacing a live cache registration");
            }
        }
    }

    /// Regions of the live registered caches, in name order.
    pub fn regions(&self) -> Vec<String> {
        self.snapshot()
            .iter()
            .map(|cache| cache.region().to_string())
            .collect()
    }

    // == Process-wide Operations ==
    /// Invalidates every registered cache.
    pub fn clear_all(&self) {
        let caches = self.snapshot();
        for cache in &caches {
            cache.invalidate_all();
        }
        info!(caches = caches.len(), "cleared all application caches");
    }

    /// Sweeps expired entries out of every registered cache.
    ///
    /// Returns the total number of entries removed.
    pub fn cleanup_expired(&self) -> usize {
        self.snapshot()
            .iter()
            .map(|cache| cache.cleanup_expired())
            .sum()
    }

    /// Statistics and estimated size of every registered region.
    pub fn report(&self) -> CacheReport {
        let threshold = self.config.high_burden_threshold;
        let regions: Vec<RegionReport> = self
            .snapshot()
            .iter()
            .filter_map(|cache| cache.report(&self.estimator, threshold))
            .collect();
        let total_bytes = regions.iter().map(|region| region.size_bytes).sum();

        CacheReport {
            regions,
            total_bytes,
            total_size: human_readable_size(total_bytes),
            cap: CapReport::evaluate(
                self.config.memory_budget_bytes(),
                self.config.cap_percentage,
                self.config.soft_cap_percentage,
                self.config.hard_cap_percentage,
                total_bytes,
            ),
        }
    }

    /// Live registrations, pruning the dead ones.
    fn snapshot(&self) -> Vec<Arc<dyn ManagedCache>> {
        let mut registry = self.registry.write();
        registry.retain(|_, managed| managed.is_live());
        registry.values().cloned().collect()
    }

    fn scaled(&self, size: i64) -> i64 {
        if size <= 0 {
            return size;
        }
        ((size as f64 * self.config.capacity_factor).round() as i64).max(1)
    }
}
