//! Cache Facade
//!
//! The get-or-fetch-and-populate pattern layered over a [`Cache`], choosing a
//! fixed or a progressive TTL for every write.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, trace};

use crate::cache::Cache;
use crate::error::{CacheError, Result};
use crate::ttl::{compute_ttl_at, CacheStrategy};

/// A request whose response can be cached.
pub trait CacheableRequest {
    /// Key the response is stored under.
    fn cache_key(&self) -> String;

    /// Latest date the response depends on, used by progressive expiry.
    fn latest_date(&self) -> Option<DateTime<Utc>>;
}

// == TTL Mode ==
/// How the facade picks the TTL of a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TtlMode {
    /// Constant TTL; zero means "no caching"
    Fixed { seconds: u64 },
    /// `factor` seconds per day of age of the request's latest date
    Progressive { factor: i64 },
    /// A named preset, evaluated at the time of each write
    Preset { strategy: CacheStrategy },
}

impl From<CacheStrategy> for TtlMode {
    fn from(strategy: CacheStrategy) -> Self {
        TtlMode::Preset { strategy }
    }
}

impl TtlMode {
    /// Whether this mode can ever produce a non-zero TTL.
    pub fn is_enabled(&self) -> bool {
        match *self {
            TtlMode::Fixed { seconds } => seconds > 0,
            TtlMode::Progressive { factor } => factor > 0,
            TtlMode::Preset { strategy } => strategy != CacheStrategy::NoCache,
        }
    }
}

// == Cache Facade ==
pub struct CacheFacade<V> {
    cache: Arc<dyn Cache<V>>,
    mode: TtlMode,
}

impl<V> CacheFacade<V>
where
    V: Clone + Send + Sync + 'static,
{
    /// # Errors
    /// `InvalidArgument` for a progressive mode with a non-positive factor.
    pub fn new(cache: Arc<dyn Cache<V>>, mode: TtlMode) -> Result<Self> {
        if let TtlMode::Progressive { factor } = mode {
            if factor <= 0 {
                return Err(CacheError::invalid(format!(
                    "progressive TTL factor must be > 0, got {factor}"
                )));
            }
        }
        Ok(Self { cache, mode })
    }

    pub fn mode(&self) -> TtlMode {
        self.mode
    }

    /// Returns the cached response of `request`, or computes it with `fetch`
    /// and stores it with the TTL of the configured mode.
    ///
    /// # Errors
    /// `InvalidArgument` in progressive mode when the request has no latest
    /// date. Errors are raised before `fetch` runs.
    pub fn get_or_fetch<R, F>(&self, request: &R, fetch: F) -> Result<V>
    where
        R: CacheableRequest + ?Sized,
        F: FnOnce(&R) -> V,
    {
        let key = request.cache_key();
        if let Some(value) = self.cache.get_if_present(&key) {
            trace!(key = %key, "facade hit");
            return Ok(value);
        }

        let ttl = self.ttl_for(request)?;
        let value = fetch(request);
        if ttl > 0 {
            self.cache.put_with_ttl(&key, value.clone(), ttl);
            debug!(key = %key, ttl, "facade stored fetched value");
        }
        Ok(value)
    }

    /// TTL in seconds that a write for `request` would get now.
    pub fn ttl_for<R>(&self, request: &R) -> Result<u64>
    where
        R: CacheableRequest + ?Sized,
    {
        self.ttl_at(request, Utc::now())
    }

    /// TTL in seconds that a write for `request` would get at `now`.
    pub fn ttl_at<R>(&self, request: &R, now: DateTime<Utc>) -> Result<u64>
    where
        R: CacheableRequest + ?Sized,
    {
        match self.mode {
            TtlMode::Fixed { seconds } => Ok(seconds),
            TtlMode::Progressive { factor } => {
                let reference = request.latest_date().ok_or_else(|| {
                    CacheError::invalid("progressive caching needs a request with a latest date")
                })?;
                compute_ttl_at(reference, factor, now)
            }
            TtlMode::Preset { strategy } => Ok(strategy.seconds_at(now)),
        }
    }

    pub fn invalidate_all(&self) {
        self.cache.invalidate_all();
    }

    /// Whether the mode yields a non-zero TTL.
    pub fn is_enabled(&self) -> bool {
        self.mode.is_enabled()
    }
}
