//! Configuration Module
//!
//! Loads cache provider, reporting and analytics caching settings from
//! environment variables.

use std::env;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{CacheError, Result};
use crate::facade::TtlMode;
use crate::sizeof::SizeofConfig;

/// How analytics responses are given a TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalyticsTtlMode {
    #[default]
    Fixed,
    Progressive,
}

impl FromStr for AnalyticsTtlMode {
    type Err = CacheError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fixed" => Ok(AnalyticsTtlMode::Fixed),
            "progressive" => Ok(AnalyticsTtlMode::Progressive),
            other => Err(CacheError::Config(format!("unknown TTL mode '{other}'"))),
        }
    }
}

/// Cache layer configuration.
///
/// All values can be configured via environment variables with sensible defaults.
#[derive(Debug, Clone, Serialize)]
pub struct Config {
    /// Every cache built by the provider is a NoOp cache
    pub disabled: bool,
    /// Multiplier applied to each role's maximum size
    pub capacity_factor: f64,
    /// Background expiry sweep interval in seconds
    pub cleanup_interval: u64,
    /// Interval of the periodic report log in seconds
    pub report_interval: u64,
    /// Memory the cap percentages refer to, in MiB
    pub memory_budget_mb: u64,
    /// Global cap as a percentage of the memory budget, 0 = no cap
    pub cap_percentage: u8,
    pub soft_cap_percentage: u8,
    pub hard_cap_percentage: u8,
    /// Entries estimated above this many bytes count as high burden
    pub high_burden_threshold: u64,
    /// Header cost and fallback constant of the size estimator
    pub object_header_size: u64,
    pub analytics_ttl_mode: AnalyticsTtlMode,
    /// Fixed analytics TTL in seconds, 0 = no caching
    pub analytics_ttl: u64,
    pub analytics_progressive_ttl_factor: i64,
}

impl Config {
    /// Creates a new Config by loading values from environment variables.
    ///
    /// Malformed values fall back to their default.
    ///
    /// # Environment Variables
    /// - `CACHE_DISABLED` - Disable every cache (default: false)
    /// - `CACHE_CAPACITY_FACTOR` - Role size multiplier (default: 1.0)
    /// - `CACHE_CLEANUP_INTERVAL` - Sweep frequency in seconds (default: 60)
    /// - `CACHE_REPORT_INTERVAL` - Report frequency in seconds (default: 300)
    /// - `CACHE_MEMORY_BUDGET_MB` - Memory budget in MiB (default: 1024)
    /// - `CACHE_CAP_PERCENTAGE` - Cap in percent of the budget (default: 0)
    /// - `CACHE_SOFT_CAP_PERCENTAGE` - Soft cap in percent of the cap (default: 50)
    /// - `CACHE_HARD_CAP_PERCENTAGE` - Hard cap in percent of the cap (default: 75)
    /// - `CACHE_HIGH_BURDEN_THRESHOLD` - High burden entry size in bytes (default: 1 MiB)
    /// - `CACHE_OBJECT_HEADER_SIZE` - Estimator object header in bytes (default: 16)
    /// - `ANALYTICS_CACHE_TTL_MODE` - `fixed` or `progressive` (default: fixed)
    /// - `ANALYTICS_CACHE_TTL` - Fixed analytics TTL in seconds (default: 0)
    /// - `ANALYTICS_CACHE_PROGRESSIVE_TTL_FACTOR` - Seconds per day of age (default: 160)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            disabled: env::var("CACHE_DISABLED")
                .ok()
                .and_then(|v| parse_bool(&v))
                .unwrap_or(defaults.disabled),
            capacity_factor: env_or("CACHE_CAPACITY_FACTOR", defaults.capacity_factor),
            cleanup_interval: env_or("CACHE_CLEANUP_INTERVAL", defaults.cleanup_interval),
            report_interval: env_or("CACHE_REPORT_INTERVAL", defaults.report_interval),
            memory_budget_mb: env_or("CACHE_MEMORY_BUDGET_MB", defaults.memory_budget_mb),
            cap_percentage: env_or("CACHE_CAP_PERCENTAGE", defaults.cap_percentage),
            soft_cap_percentage: env_or("CACHE_SOFT_CAP_PERCENTAGE", defaults.soft_cap_percentage),
            hard_cap_percentage: env_or("CACHE_HARD_CAP_PERCENTAGE", defaults.hard_cap_percentage),
            high_burden_threshold: env_or(
                "CACHE_HIGH_BURDEN_THRESHOLD",
                defaults.high_burden_threshold,
            ),
            object_header_size: env_or("CACHE_OBJECT_HEADER_SIZE", defaults.object_header_size),
            analytics_ttl_mode: env_or("ANALYTICS_CACHE_TTL_MODE", defaults.analytics_ttl_mode),
            analytics_ttl: env_or("ANALYTICS_CACHE_TTL", defaults.analytics_ttl),
            analytics_progressive_ttl_factor: env_or(
                "ANALYTICS_CACHE_PROGRESSIVE_TTL_FACTOR",
                defaults.analytics_progressive_ttl_factor,
            ),
        }
    }

    /// Checks values that parse but make no sense together.
    pub fn validate(&self) -> Result<()> {
        if !(self.capacity_factor.is_finite() && self.capacity_factor > 0.0) {
            return Err(CacheError::Config(format!(
                "capacity factor must be > 0, got {}",
                self.capacity_factor
            )));
        }
        if self.cap_percentage > 100 || self.hard_cap_percentage > 100 {
            return Err(CacheError::Config(
                "cap percentages must be <= 100".to_string(),
            ));
        }
        if self.soft_cap_percentage > self.hard_cap_percentage {
            return Err(CacheError::Config(format!(
                "soft cap {}% exceeds hard cap {}%",
                self.soft_cap_percentage, self.hard_cap_percentage
            )));
        }
        if self.cleanup_interval == 0 || self.report_interval == 0 {
            return Err(CacheError::Config(
                "task intervals must be > 0 seconds".to_string(),
            ));
        }
        if self.analytics_ttl_mode == AnalyticsTtlMode::Progressive
            && self.analytics_progressive_ttl_factor <= 0
        {
            return Err(CacheError::Config(
                "progressive TTL factor must be > 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn memory_budget_bytes(&self) -> u64 {
        self.memory_budget_mb.saturating_mul(1024 * 1024)
    }

    /// TTL mode of the analytics response facade.
    pub fn analytics_ttl(&self) -> TtlMode {
        match self.analytics_ttl_mode {
            AnalyticsTtlMode::Fixed => TtlMode::Fixed {
                seconds: self.analytics_ttl,
            },
            AnalyticsTtlMode::Progressive => TtlMode::Progressive {
                factor: self.analytics_progressive_ttl_factor,
            },
        }
    }

    pub fn sizeof_config(&self) -> SizeofConfig {
        SizeofConfig::with_object_header(self.object_header_size)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            disabled: false,
            capacity_factor: 1.0,
            cleanup_interval: 60,
            report_interval: 300,
            memory_budget_mb: 1024,
            cap_percentage: 0,
            soft_cap_percentage: 50,
            hard_cap_percentage: 75,
            high_burden_threshold: 1024 * 1024,
            object_header_size: 16,
            analytics_ttl_mode: AnalyticsTtlMode::Fixed,
            analytics_ttl: 0,
            analytics_progressive_ttl_factor: 160,
        }
    }
}

fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert!(!config.disabled);
        assert_eq!(config.capacity_factor, 1.0);
        assert_eq!(config.cleanup_interval, 60);
        assert_eq!(config.cap_percentage, 0);
        assert_eq!(config.object_header_size, 16);
        assert_eq!(config.analytics_progressive_ttl_factor, 160);
        assert_eq!(config.analytics_ttl(), TtlMode::Fixed { seconds: 0 });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_env() {
        env::set_var("CACHE_CAPACITY_FACTOR", "0.5");
        env::set_var("CACHE_CAP_PERCENTAGE", "not-a-number");
        env::set_var("ANALYTICS_CACHE_TTL_MODE", "Progressive");

        let config = Config::from_env();
        assert_eq!(config.capacity_factor, 0.5);
        assert_eq!(config.cap_percentage, 0);
        assert_eq!(config.analytics_ttl(), TtlMode::Progressive { factor: 160 });

        env::remove_var("CACHE_CAPACITY_FACTOR");
        env::remove_var("CACHE_CAP_PERCENTAGE");
        env::remove_var("ANALYTICS_CACHE_TTL_MODE");
    }

    #[test]
    fn test_validate_rejects_inverted_caps() {
        let config = Config {
            cap_percentage: 20,
            soft_cap_percentage: 80,
            hard_cap_percentage: 60,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(CacheError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_zero_factor() {
        let config = Config {
            capacity_factor: 0.0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool("0"), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn test_memory_budget_bytes() {
        let config = Config {
            memory_budget_mb: 2,
            ..Config::default()
        };
        assert_eq!(config.memory_budget_bytes(), 2 * 1024 * 1024);
    }
}
