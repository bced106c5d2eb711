//! Sliding-window send accounting

use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Default number of regular sends allowed per window
pub const DEFAULT_RATE_LIMIT_MAX: usize = 18;

/// Default sliding window length (58 seconds)
pub const DEFAULT_RATE_LIMIT_WINDOW: Duration = Duration::from_secs(58);

/// Completion instants of recent sends, oldest first.
///
/// After `prune(now)` every entry is younger than the window.
#[derive(Debug, Clone)]
pub struct RateWindow {
    max_sends: usize,
    window: Duration,
    sent: VecDeque<Instant>,
}

impl RateWindow {
    pub fn new(max_sends: usize, window: Duration) -> Self {
        Self {
            max_sends: max_sends.max(1),
            window,
            sent: VecDeque::with_capacity(max_sends + 4),
        }
    }

    pub fn max_sends(&self) -> usize {
        self.max_sends
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Drop entries that are at least one window old
    pub fn prune(&mut self, now: Instant) {
        while let Some(oldest) = self.sent.front() {
            if now.saturating_duration_since(*oldest) >= self.window {
                self.sent.pop_front();
            } else {
                break;
            }
        }
    }

    /// Number of sends currently counted (call `prune` first)
    pub fn len(&self) -> usize {
        self.sent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sent.is_empty()
    }

    /// True when another regular send would exceed the limit
    pub fn is_full(&self) -> bool {
        self.sent.len() >= self.max_sends
    }

    /// Record a completed send.
    ///
    /// Entries stay non-decreasing even if the caller hands in an older instant.
    pub fn record(&mut self, at: Instant) {
        let at = match self.sent.back() {
            Some(last) if *last > at => *last,
            _ => at,
        };
        self.sent.push_back(at);
    }

    /// Time until a regular send slot frees up; zero if one is free now
    pub fn time_until_slot(&self, now: Instant) -> Duration {
        if !self.is_full() {
            return Duration::ZERO;
        }

        // Entries beyond max_sends come from combined sends; the slot frees
        // once enough of the oldest entries have aged out.
        let index = self.sent.len() - self.max_sends;
        match self.sent.get(index) {
            Some(entry) => (*entry + self.window).saturating_duration_since(now),
            None => Duration::ZERO,
        }
    }
}

impl Default for RateWindow {
    fn default() -> Self {
        Self::new(DEFAULT_RATE_LIMIT_MAX, DEFAULT_RATE_LIMIT_WINDOW)
    }
}
