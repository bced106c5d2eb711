//! Position Monitor - alerting daemon for broker positions and grid logs
//!
//! Polls the broker bridge, tails the grid log, evaluates per-user rules and
//! delivers alerts through a rate-limited Telegram sender.

use anyhow::{Context, Result};
use monitor_lib::{
    gridlog::GridLogTailer,
    health::{components, HealthRegistry},
    observability::StructuredLogger,
    rules::AlertChecker,
    service::{AlertService, SnapshotPoller},
    source::{BridgeSource, SnapshotSource},
    NotifierClient,
};
use position_monitor::{api, config::MonitorConfig};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const MONITOR_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting position-monitor");

    let config = MonitorConfig::load()?;
    info!(
        instance = %config.instance,
        api_port = config.api_port,
        bridge = %config.bridge.base_url,
        grid_log = config.grid_log.enabled,
        "Monitor configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry.register(components::TRANSPORT).await;

    let logger = StructuredLogger::new(&config.instance);

    let notifier = Arc::new(
        NotifierClient::new(config.notifier_config()).context("Failed to start notifier")?,
    );
    match notifier.verify_connection().await {
        Ok(identity) => info!(bot = %identity.username, "Telegram bot verified"),
        Err(e) => {
            warn!(error = %e, "Telegram verification failed, alerts may not be delivered");
            health_registry
                .set_degraded(components::TRANSPORT, e.to_string())
                .await;
        }
    }

    let source: Arc<dyn SnapshotSource> = Arc::new(
        BridgeSource::new(config.bridge_config()).context("Failed to build bridge client")?,
    );
    let service_config = config.service_config();
    let (poller, snapshots) = SnapshotPoller::new(
        source,
        service_config.clone(),
        health_registry.clone(),
        logger.clone(),
    );

    let service = AlertService::new(
        service_config,
        Arc::clone(&notifier),
        AlertChecker::new(config.cooldown_config(), logger.clone()),
        config.thresholds.clone(),
        config.grid_log_config().map(|c| GridLogTailer::new(&c)),
        snapshots,
        health_registry.clone(),
    );
    logger.log_startup(MONITOR_VERSION, service.users_with_rules());

    let (shutdown_tx, _) = broadcast::channel(1);
    let poller_handle = tokio::spawn(poller.run(shutdown_tx.subscribe()));
    let service_handle = tokio::spawn(service.run(shutdown_tx.subscribe()));

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        Arc::clone(&notifier),
    ));
    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    logger.log_shutdown("SIGINT received");
    health_registry.set_ready(false).await;

    let _ = shutdown_tx.send(());
    let (poller_result, service_result) = tokio::join!(poller_handle, service_handle);
    if let Err(e) = poller_result.and(service_result) {
        warn!(error = %e, "Service task ended abnormally");
    }
    api_handle.abort();

    // Drains the sender, which may block for its shutdown timeout
    tokio::task::spawn_blocking(move || notifier.close())
        .await
        .context("Notifier shutdown task failed")?;

    info!("Shutdown complete");
    Ok(())
}
