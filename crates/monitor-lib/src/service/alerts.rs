//! Check loop turning grid log rows and threshold breaches into messages

use super::poller::SnapshotReceiver;
use super::ServiceConfig;
use crate::delivery::NotifierClient;
use crate::gridlog::{format_alert_message, GridLogTailer};
use crate::health::{components, ComponentHealth, HealthRegistry};
use crate::rules::{AlertChecker, ThresholdMap};
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Drives both alert producers on a fixed tick
pub struct AlertService {
    config: ServiceConfig,
    notifier: Arc<NotifierClient>,
    checker: AlertChecker,
    thresholds: ThresholdMap,
    tailer: Option<GridLogTailer>,
    snapshots: SnapshotReceiver,
    health: HealthRegistry,
    grid_log_ok: Option<bool>,
}

impl AlertService {
    /// `tailer` is `None` when grid log monitoring is disabled
    pub fn new(
        config: ServiceConfig,
        notifier: Arc<NotifierClient>,
        checker: AlertChecker,
        thresholds: ThresholdMap,
        tailer: Option<GridLogTailer>,
        snapshots: SnapshotReceiver,
        health: HealthRegistry,
    ) -> Self {
        Self {
            config,
            notifier,
            checker,
            thresholds,
            tailer,
            snapshots,
            health,
            grid_log_ok: None,
        }
    }

    /// Users with at least one enabled rule
    pub fn users_with_rules(&self) -> usize {
        self.thresholds.values().filter(|t| !t.is_empty()).count()
    }

    pub async fn run(mut self, mut shutdown: broadcast::Receiver<()>) {
        info!(
            interval_ms = self.config.check_interval.as_millis() as u64,
            grid_log = self.tailer.is_some(),
            users_with_rules = self.users_with_rules(),
            "Starting alert service"
        );
        self.health.register(components::SENDER).await;
        if self.tailer.is_some() {
            self.health.register(components::GRID_LOG).await;
        }

        let mut ticker = interval(self.config.check_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let sent = self.check_once().await;
                    if sent > 0 {
                        debug!(sent, "Check cycle handed messages to notifier");
                    }
                }
                _ = shutdown.recv() => {
                    info!("Shutting down alert service");
                    break;
                }
            }
        }
    }

    /// One check cycle. Returns how many messages were handed to the notifier.
    pub async fn check_once(&mut self) -> usize {
        let mut sent = self.check_grid_log().await;
        sent += self.check_positions();

        let status = self.notifier.rate_limit_status();
        self.health
            .update(
                components::SENDER,
                ComponentHealth::from_sender(&status, self.config.backlog_warning),
            )
            .await;
        sent
    }

    async fn check_grid_log(&mut self) -> usize {
        let Some(tailer) = self.tailer.as_mut() else {
            return 0;
        };

        let entries = match tailer.poll() {
            Ok(entries) => entries,
            Err(e) => {
                if self.grid_log_ok != Some(false) {
                    warn!(error = %e, "Failed to read grid log");
                    self.health
                        .set_degraded(components::GRID_LOG, format!("Read failed: {e}"))
                        .await;
                }
                self.grid_log_ok = Some(false);
                return 0;
            }
        };

        if self.grid_log_ok != Some(true) {
            self.health.set_healthy(components::GRID_LOG).await;
            self.grid_log_ok = Some(true);
        }

        let snapshot = Arc::clone(&self.snapshots.borrow());
        for entry in &entries {
            let alias = snapshot.alias_for(&entry.user_id);
            info!(
                log_type = %entry.log_type,
                user_id = %entry.user_id,
                portfolio = %entry.portfolio,
                "Grid log alert"
            );
            self.notifier.send(format_alert_message(entry, alias));
        }
        entries.len()
    }

    /// Rules are evaluated once per new snapshot
    fn check_positions(&mut self) -> usize {
        if self.users_with_rules() == 0 {
            return 0;
        }
        match self.snapshots.has_changed() {
            Ok(true) => {}
            // Unchanged, or the poller is gone
            Ok(false) | Err(_) => return 0,
        }

        let snapshot = Arc::clone(&self.snapshots.borrow_and_update());
        if snapshot.fetched_at.is_none() {
            return 0;
        }

        let alerts = self.checker.check_all(&snapshot.summaries, &self.thresholds);
        for alert in &alerts {
            self.notifier.send(alert.format_message());
        }
        alerts.len()
    }

    pub fn checker(&self) -> &AlertChecker {
        &self.checker
    }
}
