//! Burst deduplication buffer
//!
//! Messages are grouped by fingerprint and held for a short while so a burst
//! of alerts about the same condition goes out as one summary. All groups
//! share one epoch: a silence timer that every arrival re-arms, and a
//! max-wait timer armed once by the first message of the epoch. Whichever
//! fires first flushes every group.
//!
//! Timers are tasks on the tokio runtime handed to the buffer. A firing
//! carries the epoch (and, for silence, the arm generation) it was armed for,
//! so a late or superseded timer finds nothing to do.

use super::sender::MessageSink;
use super::summary::{fingerprint, summarize, BufferedMessage};
use crate::observability::MonitorMetrics;
use chrono::Local;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::debug;

/// Configuration for the burst buffer
#[derive(Debug, Clone)]
pub struct BurstConfig {
    /// Quiet period after the latest arrival before flushing
    pub silence: Duration,
    /// Longest a message waits from the start of its epoch
    pub max_wait: Duration,
}

impl Default for BurstConfig {
    fn default() -> Self {
        Self {
            silence: Duration::from_millis(200),
            max_wait: Duration::from_secs(2),
        }
    }
}

impl BurstConfig {
    pub fn new(silence: Duration, max_wait: Duration) -> Self {
        Self { silence, max_wait }
    }
}

#[derive(Debug, Clone, Copy)]
enum Trigger {
    Silence { generation: u64 },
    MaxWait,
}

#[derive(Default)]
struct BurstState {
    /// Fingerprints in first-seen order
    order: Vec<String>,
    groups: HashMap<String, Vec<BufferedMessage>>,
    epoch: u64,
    silence_generation: u64,
    silence_timer: Option<JoinHandle<()>>,
    max_wait_timer: Option<JoinHandle<()>>,
}

impl BurstState {
    fn pending(&self) -> usize {
        self.groups.values().map(Vec::len).sum()
    }

    fn abort_timers(&mut self) {
        if let Some(timer) = self.silence_timer.take() {
            timer.abort();
        }
        if let Some(timer) = self.max_wait_timer.take() {
            timer.abort();
        }
    }

    /// Close the epoch and hand back its groups in first-seen order
    fn take_groups(&mut self) -> Vec<(String, Vec<BufferedMessage>)> {
        self.abort_timers();
        self.epoch += 1;
        let mut groups = std::mem::take(&mut self.groups);
        std::mem::take(&mut self.order)
            .into_iter()
            .filter_map(|key| groups.remove(&key).map(|entries| (key, entries)))
            .collect()
    }
}

struct Inner {
    config: BurstConfig,
    state: Mutex<BurstState>,
    sink: Arc<dyn MessageSink>,
    runtime: Handle,
    metrics: MonitorMetrics,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, BurstState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn arm(self: &Arc<Self>, delay: Duration, epoch: u64, trigger: Trigger) -> JoinHandle<()> {
        let weak: Weak<Inner> = Arc::downgrade(self);
        self.runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.fire(epoch, trigger);
            }
        })
    }

    fn fire(&self, epoch: u64, trigger: Trigger) {
        let groups = {
            let mut state = self.lock();
            if state.epoch != epoch || state.groups.is_empty() {
                return;
            }
            if let Trigger::Silence { generation } = trigger {
                if generation != state.silence_generation {
                    return;
                }
            }
            state.take_groups()
        };

        debug!(
            epoch = epoch,
            groups = groups.len(),
            trigger = ?trigger,
            "Flushing burst buffer"
        );
        self.emit(groups);
    }

    /// Build outbound messages without holding the lock
    fn emit(&self, groups: Vec<(String, Vec<BufferedMessage>)>) {
        let flushed = groups.len();
        for (key, entries) in groups {
            if entries.len() > 1 {
                debug!(fingerprint = %key, count = entries.len(), "Summarizing burst");
            }
            if let Some(message) = summarize(&entries) {
                self.sink.enqueue(message);
            }
        }
        self.metrics.add_groups_flushed(flushed);
    }
}

/// Fingerprint-grouping buffer in front of the sender
#[derive(Clone)]
pub struct BurstBuffer {
    inner: Arc<Inner>,
}

impl BurstBuffer {
    /// Create a buffer whose timers run on `runtime`
    pub fn new(config: BurstConfig, sink: Arc<dyn MessageSink>, runtime: Handle) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                state: Mutex::new(BurstState::default()),
                sink,
                runtime,
                metrics: MonitorMetrics::new(),
            }),
        }
    }

    pub fn config(&self) -> &BurstConfig {
        &self.inner.config
    }

    /// Buffer a message. Returns immediately; delivery happens on flush.
    pub fn add(&self, message: impl Into<String>) {
        let text = message.into();
        let key = fingerprint(&text);
        let entry = BufferedMessage::new(text, Local::now());

        let mut state = self.inner.lock();
        let epoch = state.epoch;

        if state.groups.is_empty() {
            let timer = self.inner.arm(self.inner.config.max_wait, epoch, Trigger::MaxWait);
            state.max_wait_timer = Some(timer);
        }

        match state.groups.get_mut(&key) {
            Some(entries) => entries.push(entry),
            None => {
                state.order.push(key.clone());
                state.groups.insert(key, vec![entry]);
            }
        }

        state.silence_generation += 1;
        let generation = state.silence_generation;
        if let Some(previous) = state.silence_timer.take() {
            previous.abort();
        }
        let timer = self.inner.arm(
            self.inner.config.silence,
            epoch,
            Trigger::Silence { generation },
        );
        state.silence_timer = Some(timer);
    }

    /// Flush everything now, bypassing the timers
    pub fn flush(&self) {
        let groups = {
            let mut state = self.inner.lock();
            if state.groups.is_empty() {
                return;
            }
            state.take_groups()
        };
        self.inner.emit(groups);
    }

    /// Stop pending timers without flushing. Returns the number of discarded messages.
    pub fn cancel(&self) -> usize {
        let mut state = self.inner.lock();
        let discarded = state.pending();
        state.abort_timers();
        state.groups.clear();
        state.order.clear();
        state.epoch += 1;
        if discarded > 0 {
            debug!(discarded = discarded, "Burst buffer cancelled with pending messages");
        }
        discarded
    }

    /// Messages waiting for the next flush
    pub fn pending_count(&self) -> usize {
        self.inner.lock().pending()
    }

    /// Fingerprint groups waiting for the next flush
    pub fn pending_groups(&self) -> usize {
        self.inner.lock().groups.len()
    }
}
