//! Snapshot polling loop

use super::ServiceConfig;
use crate::health::{components, HealthRegistry};
use crate::models::OptionsPositionSummary;
use crate::observability::{MonitorMetrics, StructuredLogger};
use crate::source::SnapshotSource;
use chrono::{DateTime, Local};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

/// Latest per-user summaries as fetched from the source
#[derive(Debug, Clone, Default)]
pub struct PositionSnapshot {
    pub summaries: Vec<OptionsPositionSummary>,
    /// `None` until the first successful poll
    pub fetched_at: Option<DateTime<Local>>,
}

impl PositionSnapshot {
    /// Alias of the user with this id, if present and non-empty
    pub fn alias_for(&self, user_id: &str) -> Option<&str> {
        self.summaries
            .iter()
            .find(|s| s.user_id == user_id)
            .map(|s| s.user_alias.as_str())
            .filter(|alias| !alias.is_empty())
    }
}

pub type SnapshotReceiver = watch::Receiver<Arc<PositionSnapshot>>;

/// Periodically fetches snapshots and publishes the newest one
pub struct SnapshotPoller {
    source: Arc<dyn SnapshotSource>,
    config: ServiceConfig,
    tx: watch::Sender<Arc<PositionSnapshot>>,
    health: HealthRegistry,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
    /// `None` before the first attempt so the initial state is logged once
    connected: Option<bool>,
    backoff: Duration,
}

impl SnapshotPoller {
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        config: ServiceConfig,
        health: HealthRegistry,
        logger: StructuredLogger,
    ) -> (Self, SnapshotReceiver) {
        let (tx, rx) = watch::channel(Arc::new(PositionSnapshot::default()));
        let backoff = config.initial_backoff;

        let poller = Self {
            source,
            config,
            tx,
            health,
            metrics: MonitorMetrics::new(),
            logger,
            connected: None,
            backoff,
        };
        (poller, rx)
    }

    /// Poll until shutdown is signalled
    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_ms = self.config.poll_interval.as_millis() as u64,
            "Starting snapshot poller"
        );
        self.health.register(components::BRIDGE).await;

        loop {
            let delay = self.poll_once().await;
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown.recv() => {
                    info!("Shutting down snapshot poller");
                    break;
                }
            }
        }
    }

    /// One poll attempt. Returns the delay before the next one.
    pub async fn poll_once(&mut self) -> Duration {
        // While disconnected, a cheap ping gates the full fetch
        if self.connected != Some(true) && !self.source.ping().await {
            self.on_failure("bridge did not answer ping").await;
            return self.next_backoff();
        }

        match self.source.snapshot().await {
            Ok(summaries) => {
                let users = summaries.len();
                self.on_success(users).await;
                self.metrics.set_users_monitored(users);
                self.tx.send_replace(Arc::new(PositionSnapshot {
                    summaries,
                    fetched_at: Some(Local::now()),
                }));
                debug!(users, "Published position snapshot");
                self.backoff = self.config.initial_backoff;
                self.config.poll_interval
            }
            Err(e) => {
                self.on_failure(&e.to_string()).await;
                self.next_backoff()
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected == Some(true)
    }

    async fn on_success(&mut self, users: usize) {
        if self.connected != Some(true) {
            self.logger.log_source_status(true, users);
            self.health.set_healthy(components::BRIDGE).await;
        }
        self.connected = Some(true);
    }

    async fn on_failure(&mut self, error: &str) {
        self.metrics.inc_poll_errors();
        if self.connected != Some(false) {
            self.logger.log_source_status(false, 0);
            warn!(error = %error, "Snapshot poll failed");
            self.health
                .set_degraded(components::BRIDGE, format!("Bridge unreachable: {error}"))
                .await;
        } else {
            debug!(error = %error, "Snapshot poll failed");
        }
        self.connected = Some(false);
    }

    fn next_backoff(&mut self) -> Duration {
        let delay = self.backoff;
        self.backoff = std::cmp::min(self.backoff * 2, self.config.max_backoff);
        delay
    }
}
