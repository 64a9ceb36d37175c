//! Integration tests for the caching layer
//!
//! Exercise the public API end to end: provider, reporting, the analytics
//! facade, the soft cache and the size estimator on user-defined types.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use region_cache::cache::{Cache, CacheBuilder, CacheKind, SoftCache};
use region_cache::config::Config;
use region_cache::facade::{CacheableRequest, TtlMode};
use region_cache::provider::{CacheProvider, CacheRole};
use region_cache::report::CapStatus;
use region_cache::reflect_struct;
use region_cache::sizeof::{Reflect, SizeEstimator};
use region_cache::tasks::{spawn_invalidation_listener, CacheEvent};
use tokio::sync::broadcast;

// == Test Types ==
#[derive(Debug, Clone, PartialEq)]
struct Grid {
    headers: Vec<String>,
    rows: Vec<Vec<f64>>,
    title: Option<String>,
}

reflect_struct!(Grid {
    headers: Vec<String>,
    rows: Vec<Vec<f64>>,
    title: Option<String>
});

fn grid(rows: usize) -> Grid {
    Grid {
        headers: vec!["dx".to_string(), "pe".to_string()],
        rows: vec![vec![1.0, 2.0]; rows],
        title: None,
    }
}

struct AnalyticsQuery {
    id: &'static str,
    end_date: Option<DateTime<Utc>>,
}

impl CacheableRequest for AnalyticsQuery {
    fn cache_key(&self) -> String {
        format!("analytics:{}", self.id)
    }

    fn latest_date(&self) -> Option<DateTime<Utc>> {
        self.end_date
    }
}

// == Provider & Reporting ==

#[test]
fn test_report_covers_every_region() {
    let provider = CacheProvider::new(Config::default());
    let grids = provider.create::<Grid>(CacheRole::AnalyticsResponse).unwrap();
    let periods = provider.create::<i64>(CacheRole::PeriodId).unwrap();

    grids.put("q1", grid(3));
    periods.put("202401", 1);
    periods.put("202402", 2);

    let report = provider.report();
    assert_eq!(report.regions.len(), 2);

    let analytics = report.region("analyticsResponse").unwrap();
    let expected = provider.estimator().sizeof(&"q1".to_string())
        + provider.estimator().sizeof(&grid(3));
    assert_eq!(analytics.entries, 1);
    assert_eq!(analytics.size_bytes, expected);

    let period = report.region("periodCache").unwrap();
    assert_eq!(period.entries, 2);
    // two keys of six chars (58) plus two i64 values (8)
    assert_eq!(period.size_bytes, 2 * (58 + 8));

    assert_eq!(report.total_bytes, analytics.size_bytes + period.size_bytes);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["regions"].as_array().unwrap().len(), 2);
}

#[test]
fn test_cap_status_reflects_total_size() {
    // 1 MiB budget, 1% cap = 10 485 bytes, soft 50%, hard 75%
    let provider = CacheProvider::new(Config {
        memory_budget_mb: 1,
        cap_percentage: 1,
        ..Config::default()
    });
    let cache = provider.create::<Vec<i64>>(CacheRole::App).unwrap();
    assert_eq!(provider.report().cap.status, CapStatus::Ok);

    cache.put("big", vec![0; 1_000]);
    assert_eq!(provider.report().cap.status, CapStatus::HardCapExceeded);
}

#[tokio::test]
async fn test_clear_all_event_through_listener() {
    let provider = Arc::new(CacheProvider::new(Config::default()));
    let names = provider.create::<String>(CacheRole::UserDisplayName).unwrap();
    names.put("u1", "Ann".to_string());

    let (tx, rx) = broadcast::channel(4);
    let handle = spawn_invalidation_listener(Arc::clone(&provider), rx);
    tx.send(CacheEvent::ClearAll).unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(names.is_empty());
    handle.abort();
}

// == Facade ==

#[test]
fn test_analytics_facade_progressive() {
    let provider = CacheProvider::new(Config {
        analytics_ttl_mode: region_cache::config::AnalyticsTtlMode::Progressive,
        ..Config::default()
    });
    let facade = provider.analytics_facade::<Grid>().unwrap();
    assert_eq!(facade.mode(), TtlMode::Progressive { factor: 160 });

    let query = AnalyticsQuery {
        id: "last-year",
        end_date: Some(Utc::now() - chrono::Duration::days(365)),
    };
    let fetches = AtomicUsize::new(0);
    let fetch = |_: &AnalyticsQuery| {
        fetches.fetch_add(1, Ordering::SeqCst);
        grid(2)
    };

    assert_eq!(facade.get_or_fetch(&query, fetch).unwrap(), grid(2));
    assert_eq!(facade.get_or_fetch(&query, fetch).unwrap(), grid(2));
    assert_eq!(fetches.load(Ordering::SeqCst), 1);
    assert_eq!(facade.ttl_for(&query).unwrap(), 160 * 365);
}

#[test]
fn test_analytics_facade_disabled_by_default() {
    let provider = CacheProvider::new(Config::default());
    let facade = provider.analytics_facade::<Grid>().unwrap();
    assert!(!facade.is_enabled());

    let query = AnalyticsQuery {
        id: "any",
        end_date: None,
    };
    facade.get_or_fetch(&query, |_| grid(1)).unwrap();
    assert_eq!(provider.report().total_bytes, 0);
}

// == Builder ==

#[test]
fn test_builder_produces_expected_kinds() {
    let live: Arc<dyn Cache<String>> = CacheBuilder::new()
        .for_region("userDisplayNameCache")
        .unwrap()
        .expire_after_access(Duration::from_secs(6 * 3600))
        .with_maximum_size(100)
        .unwrap()
        .build();
    assert_eq!(live.kind(), CacheKind::Bounded);

    let off: Arc<dyn Cache<String>> = CacheBuilder::new()
        .with_maximum_size(0)
        .unwrap()
        .build();
    assert_eq!(off.kind(), CacheKind::NoOp);
}

#[test]
fn test_expire_after_write_one_second() {
    let cache: Arc<dyn Cache<i32>> = CacheBuilder::new()
        .expire_after_write(Duration::from_secs(1))
        .build();
    cache.put("k", 1);

    std::thread::sleep(Duration::from_millis(500));
    assert_eq!(cache.get_if_present("k"), Some(1));

    std::thread::sleep(Duration::from_millis(1_000));
    assert_eq!(cache.get_if_present("k"), None);
}

// == Soft Cache & Size Estimator ==

#[test]
fn test_soft_cache_recomputes_after_reclaim() {
    let soft = SoftCache::new();
    let computed = AtomicUsize::new(0);
    let on_miss = || {
        computed.fetch_add(1, Ordering::SeqCst);
        grid(4)
    };

    assert_eq!(soft.get(Some("grid"), on_miss), grid(4));
    assert_eq!(soft.get(Some("grid"), on_miss), grid(4));
    assert_eq!(computed.load(Ordering::SeqCst), 1);

    soft.reclaim_all();
    soft.get(Some("grid"), on_miss);
    assert_eq!(computed.load(Ordering::SeqCst), 2);
}

#[test]
fn test_sizeof_user_type() {
    let estimator = SizeEstimator::default();
    let value = grid(2);

    // header 16
    // headers: ref 4 + array 16 + 2 * (ref 4 + text 54)
    // rows: ref 4 + array 16 + 2 * (ref 4 + array 16 + 2 * 8)
    // title: ref 4, absent
    let expected = 16 + (4 + 16 + 2 * 58) + (4 + 16 + 2 * 36) + 4;
    assert_eq!(estimator.sizeof(&value), expected);
    assert_eq!(estimator.sizeof_opt(None), 0);

    let boxed: Box<dyn Reflect> = Box::new(value);
    assert_eq!(estimator.sizeof(boxed.as_ref()), expected);
}
