//! Region Cache - cache maintenance daemon
//!
//! Builds the application caches, keeps them swept and reports their size.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use region_cache::{
    spawn_cleanup_task, spawn_invalidation_listener, Cache, CacheEvent, CacheProvider, CacheRole,
    Config,
};

/// Main entry point.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load and validate configuration from environment variables
/// 3. Build the provider and one cache per role
/// 4. Start the expiry sweep and the invalidation listener
/// 5. Log the cache report periodically until SIGINT/SIGTERM
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "region_cache=info", can be overridden with RUST_LOG
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "region_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting region cache");

    let config = Config::from_env();
    config.validate().context("invalid cache configuration")?;
    info!(
        "Configuration loaded: disabled={}, capacity_factor={}, cleanup_interval={}s, report_interval={}s",
        config.disabled, config.capacity_factor, config.cleanup_interval, config.report_interval
    );

    let report_interval = Duration::from_secs(config.report_interval);
    let cleanup_interval = config.cleanup_interval;
    let provider = Arc::new(CacheProvider::new(config));
    let caches = create_role_caches(&provider).context("failed to build role caches")?;
    info!(regions = ?provider.regions(), "Caches initialized");

    let (events, listener_rx) = broadcast::channel(16);
    let cleanup_handle = spawn_cleanup_task(Arc::clone(&provider), cleanup_interval);
    let listener_handle = spawn_invalidation_listener(Arc::clone(&provider), listener_rx);
    info!("Background tasks started");

    let mut ticker = tokio::time::interval(report_interval);
    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let report = serde_json::to_string(&provider.report())
                    .context("failed to render cache report")?;
                info!(report = %report, "Cache report");
            }
            _ = &mut shutdown => break,
        }
    }

    if events.send(CacheEvent::ClearAll).is_err() {
        warn!("Invalidation listener already stopped");
    }
    tokio::time::sleep(Duration::from_millis(50)).await;
    info!(entries = caches.total_entries(), "Caches cleared");

    cleanup_handle.abort();
    listener_handle.abort();
    warn!("Background tasks aborted");

    info!("Region cache shutdown complete");
    Ok(())
}

/// One cache per role, owned by the daemon for its whole run. The provider
/// only tracks caches that someone still holds.
struct RoleCaches {
    login_attempts: Arc<dyn Cache<i32>>,
    recover_attempts: Arc<dyn Cache<i32>>,
    display_names: Arc<dyn Cache<String>>,
    program_access: Arc<dyn Cache<bool>>,
    periods: Arc<dyn Cache<i64>>,
    expressions: Arc<dyn Cache<f64>>,
    apps: Arc<dyn Cache<String>>,
    analytics: Arc<dyn Cache<String>>,
    data_approved: Arc<dyn Cache<bool>>,
}

impl RoleCaches {
    /// Live entries across every role.
    fn total_entries(&self) -> usize {
        self.login_attempts.len()
            + self.recover_attempts.len()
            + self.display_names.len()
            + self.program_access.len()
            + self.periods.len()
            + self.expressions.len()
            + self.apps.len()
            + self.analytics.len()
            + self.data_approved.len()
    }
}

/// Builds one cache per role so that every region shows up in reports.
fn create_role_caches(provider: &CacheProvider) -> anyhow::Result<RoleCaches> {
    Ok(RoleCaches {
        login_attempts: provider.create_with_default(CacheRole::UserFailedLoginAttempt, 0)?,
        recover_attempts: provider.create_with_default(CacheRole::UserAccountRecoverAttempt, 0)?,
        display_names: provider.create(CacheRole::UserDisplayName)?,
        program_access: provider.create(CacheRole::UserDataReadProgram)?,
        periods: provider.create(CacheRole::PeriodId)?,
        expressions: provider.create(CacheRole::ExpressionEvaluation)?,
        apps: provider.create(CacheRole::App)?,
        analytics: provider.create(CacheRole::AnalyticsResponse)?,
        data_approved: provider.create(CacheRole::IsDataApproved)?,
    })
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            warn!(error = %err, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                warn!(error = %err, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, initiating shutdown...");
        }
        _ = terminate => {
            info!("Received SIGTERM, initiating shutdown...");
        }
    }
}
