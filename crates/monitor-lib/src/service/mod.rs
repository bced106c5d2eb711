//! Alert service
//!
//! This module provides:
//! - A snapshot poller publishing the latest positions on a watch channel
//! - The check loop feeding grid log rows and rule alerts to the notifier

mod alerts;
mod poller;


use std::time::Duration;

pub use alerts::AlertService;
pub use poller::{PositionSnapshot, SnapshotPoller, SnapshotReceiver};

const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Timing for the service loops
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Period of the check loop (default: 500 ms)
    pub check_interval: Duration,
    /// Period of the snapshot poller while connected (default: 1 second)
    pub poll_interval: Duration,
    /// First retry delay after a failed poll (default: 1 second)
    pub initial_backoff: Duration,
    /// Upper bound on the retry delay (default: 30 seconds)
    pub max_backoff: Duration,
    /// Queue depth at which the sender is reported degraded
    pub backlog_warning: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            check_interval: Duration::from_millis(500),
            poll_interval: Duration::from_secs(1),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            backlog_warning: 20,
        }
    }
}

impl ServiceConfig {
    /// Intervals are floored at 1 ms
    pub fn with_intervals(mut self, check: Duration, poll: Duration) -> Self {
        self.check_interval = check.max(MIN_INTERVAL);
        self.poll_interval = poll.max(MIN_INTERVAL);
        self
    }

    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max.max(initial);
        self
    }
}
