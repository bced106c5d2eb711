//! Observability infrastructure for the position monitor
//!
//! Provides:
//! - Prometheus metrics (delivery counters, queue depth, burst flushes, alert counts)
//! - Structured JSON logging with tracing

use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, register_int_gauge,
    Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Histogram buckets for provider round trips (in seconds)
const DELIVERY_LATENCY_BUCKETS: &[f64] = &[0.05, 0.1, 0.25, 0.5, 1.0, 2.0, 3.0, 5.0, 10.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<MonitorMetricsInner> = OnceLock::new();

struct MonitorMetricsInner {
    messages_delivered: IntCounter,
    messages_failed: IntCounter,
    messages_combined: IntCounter,
    messages_dropped: IntCounter,
    queue_depth: IntGauge,
    burst_groups_flushed: IntCounter,
    alerts_emitted: IntCounterVec,
    alerts_suppressed: IntCounterVec,
    delivery_latency_seconds: Histogram,
    snapshot_poll_errors: IntCounter,
    users_monitored: IntGauge,
}

impl MonitorMetricsInner {
    fn new() -> Self {
        Self {
            messages_delivered: register_int_counter!(
                "position_monitor_messages_delivered_total",
                "Messages accepted by the messaging provider"
            )
            .expect("Failed to register messages_delivered"),

            messages_failed: register_int_counter!(
                "position_monitor_messages_failed_total",
                "Messages dropped after a failed delivery attempt"
            )
            .expect("Failed to register messages_failed"),

            messages_combined: register_int_counter!(
                "position_monitor_messages_combined_total",
                "Queued messages folded into a combined backlog message"
            )
            .expect("Failed to register messages_combined"),

            messages_dropped: register_int_counter!(
                "position_monitor_messages_dropped_total",
                "Messages abandoned at shutdown because the window was exhausted"
            )
            .expect("Failed to register messages_dropped"),

            queue_depth: register_int_gauge!(
                "position_monitor_queue_depth",
                "Messages waiting in the outbound queue"
            )
            .expect("Failed to register queue_depth"),

            burst_groups_flushed: register_int_counter!(
                "position_monitor_burst_groups_flushed_total",
                "Fingerprint groups emitted by the burst buffer"
            )
            .expect("Failed to register burst_groups_flushed"),

            alerts_emitted: register_int_counter_vec!(
                "position_monitor_alerts_emitted_total",
                "Alerts that passed the cooldown gate",
                &["kind"]
            )
            .expect("Failed to register alerts_emitted"),

            alerts_suppressed: register_int_counter_vec!(
                "position_monitor_alerts_suppressed_total",
                "Alerts held back by the cooldown gate",
                &["kind"]
            )
            .expect("Failed to register alerts_suppressed"),

            delivery_latency_seconds: register_histogram!(
                "position_monitor_delivery_latency_seconds",
                "Round trip time of a single provider call",
                DELIVERY_LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register delivery_latency_seconds"),

            snapshot_poll_errors: register_int_counter!(
                "position_monitor_snapshot_poll_errors_total",
                "Failed polls of the position data source"
            )
            .expect("Failed to register snapshot_poll_errors"),

            users_monitored: register_int_gauge!(
                "position_monitor_users_monitored",
                "Active users in the latest snapshot"
            )
            .expect("Failed to register users_monitored"),
        }
    }
}

/// Handle to the process-wide Prometheus metrics.
///
/// Clones share the same underlying metrics.
#[derive(Clone)]
pub struct MonitorMetrics {
    _private: (),
}

impl Default for MonitorMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl MonitorMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &MonitorMetricsInner {
        GLOBAL_METRICS.get_or_init(MonitorMetricsInner::new)
    }

    pub fn inc_delivered(&self) {
        self.inner().messages_delivered.inc();
    }

    pub fn inc_failed(&self) {
        self.inner().messages_failed.inc();
    }

    pub fn add_combined(&self, count: usize) {
        self.inner().messages_combined.inc_by(count as u64);
    }

    pub fn add_dropped(&self, count: usize) {
        self.inner().messages_dropped.inc_by(count as u64);
    }

    pub fn set_queue_depth(&self, depth: usize) {
        self.inner().queue_depth.set(depth as i64);
    }

    pub fn add_groups_flushed(&self, groups: usize) {
        self.inner().burst_groups_flushed.inc_by(groups as u64);
    }

    pub fn inc_alert_emitted(&self, kind: &str) {
        self.inner().alerts_emitted.with_label_values(&[kind]).inc();
    }

    pub fn inc_alert_suppressed(&self, kind: &str) {
        self.inner().alerts_suppressed.with_label_values(&[kind]).inc();
    }

    pub fn observe_delivery_latency(&self, duration_secs: f64) {
        self.inner().delivery_latency_seconds.observe(duration_secs);
    }

    pub fn inc_poll_errors(&self) {
        self.inner().snapshot_poll_errors.inc();
    }

    pub fn set_users_monitored(&self, count: usize) {
        self.inner().users_monitored.set(count as i64);
    }
}

/// Structured logger for monitor events
///
/// Emits JSON-friendly events with a stable `event` field so log
/// pipelines can filter on them.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log an alert that passed the cooldown gate
    pub fn log_alert_emitted(&self, user: &str, kind: &str, actual: &str, threshold: &str) {
        info!(
            event = "alert_emitted",
            instance = %self.instance,
            user = %user,
            kind = %kind,
            actual = %actual,
            threshold = %threshold,
            "Alert emitted"
        );
    }

    /// Log an alert held back by the cooldown gate
    pub fn log_alert_suppressed(&self, user: &str, kind: &str, remaining_secs: u64) {
        info!(
            event = "alert_suppressed",
            instance = %self.instance,
            user = %user,
            kind = %kind,
            remaining_secs = remaining_secs,
            "Alert suppressed by cooldown"
        );
    }

    pub fn log_delivered(&self, chars: usize, sent_in_window: usize, queue_depth: usize) {
        info!(
            event = "message_delivered",
            instance = %self.instance,
            chars = chars,
            sent_in_window = sent_in_window,
            queue_depth = queue_depth,
            "Message delivered"
        );
    }

    pub fn log_delivery_failed(&self, error: &str, queue_depth: usize) {
        error!(
            event = "delivery_failed",
            instance = %self.instance,
            error = %error,
            queue_depth = queue_depth,
            "Message delivery failed, message dropped"
        );
    }

    pub fn log_backlog_combined(&self, count: usize, sent_in_window: usize) {
        warn!(
            event = "backlog_combined",
            instance = %self.instance,
            count = count,
            sent_in_window = sent_in_window,
            "Rate limit reached, combined queued messages"
        );
    }

    pub fn log_startup(&self, version: &str, users_with_rules: usize) {
        info!(
            event = "monitor_started",
            instance = %self.instance,
            version = %version,
            users_with_rules = users_with_rules,
            "Position monitor started"
        );
    }

    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "monitor_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Position monitor shutting down"
        );
    }

    /// Log a change in data source connectivity
    pub fn log_source_status(&self, connected: bool, users: usize) {
        if connected {
            info!(
                event = "source_status",
                instance = %self.instance,
                connected = true,
                users = users,
                "Connected to position bridge"
            );
        } else {
            warn!(
                event = "source_status",
                instance = %self.instance,
                connected = false,
                "Lost connection to position bridge"
            );
        }
    }
}
