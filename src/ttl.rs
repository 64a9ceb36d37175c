//! Time-To-Live Policies
//!
//! Pure functions computing how long a cache write should live, either as a
//! constant or growing with the age of the data being cached.

use chrono::{DateTime, Days, Utc};
use serde::Serialize;

use crate::error::{CacheError, Result};

const SECONDS_PER_MINUTE: u64 = 60;
const SECONDS_PER_HOUR: u64 = 60 * SECONDS_PER_MINUTE;
const SECONDS_PER_DAY: u64 = 24 * SECONDS_PER_HOUR;

// == Progressive TTL ==
/// Progressive TTL in seconds for data whose latest relevant date is
/// `reference`: `factor` seconds per day of age, with a one-day floor.
///
/// # Errors
/// `InvalidArgument` if `factor` is not positive.
pub fn compute_ttl(reference: DateTime<Utc>, factor: i64) -> Result<u64> {
    compute_ttl_at(reference, factor, Utc::now())
}

/// [`compute_ttl`] against an explicit "now".
///
/// A reference date in the future counts as zero days old.
pub fn compute_ttl_at(reference: DateTime<Utc>, factor: i64, now: DateTime<Utc>) -> Result<u64> {
    if factor <= 0 {
        return Err(CacheError::invalid(format!(
            "progressive TTL factor must be > 0, got {factor}"
        )));
    }

    let days = (now - reference).num_days().max(1) as u64;
    Ok((factor as u64).saturating_mul(days))
}

// == TTL Policy ==
/// TTL applied to a single cache write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum TtlPolicy {
    /// Same TTL for every write
    Fixed { seconds: u64 },
    /// TTL grows with the age of `reference`
    Progressive { reference: DateTime<Utc>, factor: i64 },
}

impl TtlPolicy {
    /// TTL in seconds as of `now`.
    pub fn seconds_at(&self, now: DateTime<Utc>) -> Result<u64> {
        match *self {
            TtlPolicy::Fixed { seconds } => Ok(seconds),
            TtlPolicy::Progressive { reference, factor } => compute_ttl_at(reference, factor, now),
        }
    }

    pub fn seconds(&self) -> Result<u64> {
        self.seconds_at(Utc::now())
    }
}

// == Cache Strategy ==
/// Fixed TTL presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheStrategy {
    NoCache,
    OneMinute,
    FiveMinutes,
    TenMinutes,
    FifteenMinutes,
    ThirtyMinutes,
    OneHour,
    /// Until 06:00 UTC of the next day
    SixAmTomorrow,
    TwoWeeks,
}

impl CacheStrategy {
    /// TTL in seconds of this preset as of `now`.
    pub fn seconds_at(&self, now: DateTime<Utc>) -> u64 {
        match self {
            CacheStrategy::NoCache => 0,
            CacheStrategy::OneMinute => SECONDS_PER_MINUTE,
            CacheStrategy::FiveMinutes => 5 * SECONDS_PER_MINUTE,
            CacheStrategy::TenMinutes => 10 * SECONDS_PER_MINUTE,
            CacheStrategy::FifteenMinutes => 15 * SECONDS_PER_MINUTE,
            CacheStrategy::ThirtyMinutes => 30 * SECONDS_PER_MINUTE,
            CacheStrategy::OneHour => SECONDS_PER_HOUR,
            CacheStrategy::SixAmTomorrow => seconds_to_six_am_tomorrow(now),
            CacheStrategy::TwoWeeks => 14 * SECONDS_PER_DAY,
        }
    }

    pub fn seconds(&self) -> u64 {
        self.seconds_at(Utc::now())
    }
}

fn seconds_to_six_am_tomorrow(now: DateTime<Utc>) -> u64 {
    now.date_naive()
        .checked_add_days(Days::new(1))
        .and_then(|tomorrow| tomorrow.and_hms_opt(6, 0, 0))
        .map(|six_am| six_am.and_utc())
        .map_or(SECONDS_PER_DAY, |target| {
            (target - now).num_seconds().max(0) as u64
        })
}
