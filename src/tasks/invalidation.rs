//! Invalidation Listener Task
//!
//! Delivers process-wide cache events (for example a configuration change)
//! to every cache registered with a provider.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::provider::CacheProvider;

/// Events broadcast to the invalidation listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheEvent {
    /// Invalidate every application cache
    ClearAll,
}

/// Spawns a task that applies every received [`CacheEvent`] to `provider`.
///
/// The task ends when every sender has been dropped. If the listener falls
/// behind and events were dropped, it clears all caches once, since a
/// missed event may have been a clear-all.
pub fn spawn_invalidation_listener(
    provider: Arc<CacheProvider>,
    mut events: broadcast::Receiver<CacheEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(CacheEvent::ClearAll) => {
                    info!("Received clear-all cache event");
                    provider.clear_all();
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Invalidation listener lagged, clearing all caches");
                    provider.clear_all();
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Cache event channel closed, stopping invalidation listener");
                    break;
                }
            }
        }
    })
}
