//! Expiry Sweep Task
//!
//! Background task that periodically drops expired entries from every cache
//! registered with a provider.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::provider::CacheProvider;

/// Spawns a background task that periodically sweeps expired entries.
///
/// Expired entries are already unobservable to readers; the sweep only
/// releases their memory and keeps reported sizes honest.
///
/// # Arguments
/// * `provider` - Provider whose registered caches are swept
/// * `cleanup_interval_secs` - Interval in seconds between sweeps
///
/// # Returns
/// A JoinHandle for the spawned task, to be aborted during shutdown.
pub fn spawn_cleanup_task(provider: Arc<CacheProvider>, cleanup_interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(cleanup_interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting expiry sweep task with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            tokio::time::sleep(interval).await;

            let removed = provider.cleanup_expired();
            if removed > 0 {
                info!("Expiry sweep: removed {} expired entries", removed);
            } else {
                debug!("Expiry sweep: no expired entries found");
            }
        }
    })
}
