//! Rate-limited background sender
//!
//! A single worker thread drains the outbound queue. It owns a
//! current-thread tokio runtime used only to drive transport calls, so
//! producers never touch network code and never share an event loop with it.
//!
//! Dispatch rules, evaluated on every iteration:
//! - under the regular limit: send the oldest queued message
//! - at the limit with a backlog of `combine_threshold` or more: fold the
//!   whole queue into one combined message, as long as the window is still
//!   below the provider's hard ceiling
//! - otherwise: wait for the oldest send to age out (bounded sleep)

use super::rate::{RateWindow, DEFAULT_RATE_LIMIT_MAX, DEFAULT_RATE_LIMIT_WINDOW};
use super::transport::MessageTransport;
use crate::observability::{MonitorMetrics, StructuredLogger};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Hard per-window ceiling imposed by the provider
pub const DEFAULT_PROVIDER_LIMIT: usize = 20;

/// Backlog size that triggers combination while rate limited
pub const DEFAULT_COMBINE_THRESHOLD: usize = 5;

/// Extra margin added to a computed rate-limit wait
const WAIT_SLACK: Duration = Duration::from_millis(100);

/// Anything that accepts fully formed outbound messages without blocking
pub trait MessageSink: Send + Sync {
    fn enqueue(&self, message: String);
}

/// Configuration for the background sender
#[derive(Debug, Clone)]
pub struct SenderConfig {
    /// Regular sends allowed per window
    pub rate_limit_max: usize,
    /// Sliding window length
    pub rate_limit_window: Duration,
    /// Ceiling that combined sends may not cross
    pub provider_limit: usize,
    /// Minimum backlog that is folded into one message at the limit
    pub combine_threshold: usize,
    /// Sleep while the queue is empty
    pub idle_poll: Duration,
    /// Pause between consecutive sends
    pub active_poll: Duration,
    /// Upper bound on a single rate-limit wait
    pub max_wait_sleep: Duration,
    /// How long `close` waits for the worker to finish
    pub shutdown_timeout: Duration,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            rate_limit_max: DEFAULT_RATE_LIMIT_MAX,
            rate_limit_window: DEFAULT_RATE_LIMIT_WINDOW,
            provider_limit: DEFAULT_PROVIDER_LIMIT,
            combine_threshold: DEFAULT_COMBINE_THRESHOLD,
            idle_poll: Duration::from_secs(1),
            active_poll: Duration::from_millis(50),
            max_wait_sleep: Duration::from_secs(5),
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

impl SenderConfig {
    pub fn with_rate_limit(mut self, max: usize, window: Duration) -> Self {
        self.rate_limit_max = max.max(1);
        self.rate_limit_window = window;
        if self.provider_limit < self.rate_limit_max {
            self.provider_limit = self.rate_limit_max;
        }
        self
    }

    pub fn with_provider_limit(mut self, limit: usize) -> Self {
        self.provider_limit = limit.max(self.rate_limit_max);
        self
    }

    pub fn with_combine_threshold(mut self, threshold: usize) -> Self {
        self.combine_threshold = threshold.max(2);
        self
    }

    pub fn with_poll_intervals(mut self, idle: Duration, active: Duration) -> Self {
        self.idle_poll = idle;
        self.active_poll = active;
        self
    }

    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}

/// Snapshot of the sender for status endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateLimitStatus {
    pub queue_depth: usize,
    pub sent_in_window: usize,
    pub rate_limit_max: usize,
    pub window_secs: f64,
    pub combine_threshold: usize,
    pub provider_limit: usize,
    pub delivered_total: u64,
    pub failed_total: u64,
    /// Failed deliveries since the last successful one
    #[serde(default)]
    pub consecutive_failures: u64,
    pub combined_total: u64,
    pub running: bool,
}

/// What the worker should do next
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    Single(String),
    Combined { text: String, count: usize },
    Wait(Duration),
    Idle,
}

/// Fold queued messages into one numbered message
pub fn combine_messages<S: AsRef<str>>(messages: &[S]) -> String {
    let mut combined = format!(
        "⚠️ COMBINED ALERTS ({} messages)\n{}\n\n",
        messages.len(),
        "=".repeat(40)
    );
    for (i, message) in messages.iter().enumerate() {
        combined.push_str(&format!("[{}] {}\n\n", i + 1, message.as_ref()));
    }
    combined
}

#[derive(Debug)]
pub(crate) struct SenderState {
    pub(crate) queue: VecDeque<String>,
    pub(crate) window: RateWindow,
    delivered_total: u64,
    failed_total: u64,
    consecutive_failures: u64,
    combined_total: u64,
    running: bool,
}

impl SenderState {
    pub(crate) fn new(config: &SenderConfig) -> Self {
        Self {
            queue: VecDeque::new(),
            window: RateWindow::new(config.rate_limit_max, config.rate_limit_window),
            delivered_total: 0,
            failed_total: 0,
            consecutive_failures: 0,
            combined_total: 0,
            running: false,
        }
    }
}

/// Decide the next dispatch. Pure apart from mutating the queue and pruning the window.
pub(crate) fn plan(state: &mut SenderState, config: &SenderConfig, now: Instant) -> Dispatch {
    state.window.prune(now);

    if state.queue.is_empty() {
        return Dispatch::Idle;
    }

    if !state.window.is_full() {
        return match state.queue.pop_front() {
            Some(text) => Dispatch::Single(text),
            None => Dispatch::Idle,
        };
    }

    if state.queue.len() >= config.combine_threshold && state.window.len() < config.provider_limit
    {
        let batch: Vec<String> = state.queue.drain(..).collect();
        return Dispatch::Combined {
            text: combine_messages(&batch),
            count: batch.len(),
        };
    }

    let wait = state.window.time_until_slot(now) + WAIT_SLACK;
    Dispatch::Wait(wait.min(config.max_wait_sleep))
}

/// Last dispatch before the worker exits: everything left goes out in one send.
pub(crate) fn plan_final(state: &mut SenderState, config: &SenderConfig, now: Instant) -> Dispatch {
    state.window.prune(now);

    match state.queue.len() {
        0 => Dispatch::Idle,
        _ if state.window.len() >= config.provider_limit => Dispatch::Idle,
        1 => match state.queue.pop_front() {
            Some(text) => Dispatch::Single(text),
            None => Dispatch::Idle,
        },
        _ => {
            let batch: Vec<String> = state.queue.drain(..).collect();
            Dispatch::Combined {
                text: combine_messages(&batch),
                count: batch.len(),
            }
        }
    }
}

struct Shared {
    config: SenderConfig,
    state: Mutex<SenderState>,
    wake: Condvar,
    stop: AtomicBool,
    /// Worker loop iterations
    cycles: AtomicU64,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, SenderState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn stopping(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    fn enqueue(&self, message: String) {
        let depth = {
            let mut state = self.lock();
            state.queue.push_back(message);
            state.queue.len()
        };
        self.metrics.set_queue_depth(depth);
        self.wake.notify_all();
    }

    /// Sleep until `timeout` elapses, stop is requested, or `keep_waiting` turns false
    fn wait_while<F>(&self, timeout: Duration, mut keep_waiting: F)
    where
        F: FnMut(&SenderState) -> bool,
    {
        let guard = self.lock();
        let _ = self
            .wake
            .wait_timeout_while(guard, timeout, |state| {
                !self.stopping() && keep_waiting(state)
            })
            .unwrap_or_else(PoisonError::into_inner);
    }

    fn status(&self) -> RateLimitStatus {
        let mut state = self.lock();
        state.window.prune(Instant::now());
        RateLimitStatus {
            queue_depth: state.queue.len(),
            sent_in_window: state.window.len(),
            rate_limit_max: self.config.rate_limit_max,
            window_secs: self.config.rate_limit_window.as_secs_f64(),
            combine_threshold: self.config.combine_threshold,
            provider_limit: self.config.provider_limit,
            delivered_total: state.delivered_total,
            failed_total: state.failed_total,
            consecutive_failures: state.consecutive_failures,
            combined_total: state.combined_total,
            running: state.running,
        }
    }

    /// Run one transport call and account for the outcome. Never holds the lock across the call.
    fn deliver(
        &self,
        runtime: &tokio::runtime::Runtime,
        transport: &dyn MessageTransport,
        text: &str,
        count: usize,
    ) {
        let started = Instant::now();
        let result = runtime.block_on(transport.deliver(text));
        self.metrics
            .observe_delivery_latency(started.elapsed().as_secs_f64());

        let (sent_in_window, queue_depth) = {
            let mut state = self.lock();
            match &result {
                Ok(()) => {
                    state.window.record(Instant::now());
                    state.delivered_total += 1;
                    state.consecutive_failures = 0;
                    if count > 1 {
                        state.combined_total += count as u64;
                    }
                }
                Err(_) => {
                    state.failed_total += count as u64;
                    state.consecutive_failures += 1;
                }
            }
            (state.window.len(), state.queue.len())
        };
        self.metrics.set_queue_depth(queue_depth);

        match result {
            Ok(()) => {
                self.metrics.inc_delivered();
                if count > 1 {
                    self.metrics.add_combined(count);
                }
                self.logger
                    .log_delivered(text.chars().count(), sent_in_window, queue_depth);
            }
            Err(e) => {
                self.metrics.inc_failed();
                self.logger.log_delivery_failed(&e.to_string(), queue_depth);
            }
        }
    }

    fn run(&self, transport: Arc<dyn MessageTransport>) {
        let runtime = match tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                error!(error = %e, "Failed to build sender runtime, sender not running");
                self.lock().running = false;
                return;
            }
        };

        info!(
            rate_limit_max = self.config.rate_limit_max,
            window_secs = self.config.rate_limit_window.as_secs_f64(),
            combine_threshold = self.config.combine_threshold,
            "Sender worker started"
        );

        while !self.stopping() {
            self.cycles.fetch_add(1, Ordering::Relaxed);
            let (dispatch, queued) = {
                let mut state = self.lock();
                let dispatch = plan(&mut state, &self.config, Instant::now());
                (dispatch, state.queue.len())
            };

            match dispatch {
                Dispatch::Idle => {
                    self.wait_while(self.config.idle_poll, |state| state.queue.is_empty());
                }
                Dispatch::Wait(wait) => {
                    debug!(
                        wait_ms = wait.as_millis() as u64,
                        queue_depth = queued,
                        "Rate limit reached, waiting"
                    );
                    let threshold = self.config.combine_threshold;
                    if queued < threshold {
                        self.wait_while(wait, |state| state.queue.len() < threshold);
                    } else {
                        // Backlog is held by the provider ceiling, only a slot ageing out helps
                        self.wait_while(wait, |_| true);
                    }
                }
                Dispatch::Single(text) => {
                    self.deliver(&runtime, transport.as_ref(), &text, 1);
                    self.wait_while(self.config.active_poll, |_| true);
                }
                Dispatch::Combined { text, count } => {
                    let sent_in_window = self.lock().window.len();
                    self.logger.log_backlog_combined(count, sent_in_window);
                    self.deliver(&runtime, transport.as_ref(), &text, count);
                    self.wait_while(self.config.active_poll, |_| true);
                }
            }
        }

        self.final_drain(&runtime, transport.as_ref());
        self.lock().running = false;
        info!("Sender worker stopped");
    }

    fn final_drain(&self, runtime: &tokio::runtime::Runtime, transport: &dyn MessageTransport) {
        let (dispatch, abandoned) = {
            let mut state = self.lock();
            let dispatch = plan_final(&mut state, &self.config, Instant::now());
            let abandoned = state.queue.len();
            state.queue.clear();
            (dispatch, abandoned)
        };

        if abandoned > 0 {
            warn!(
                dropped = abandoned,
                "Rate window exhausted at shutdown, dropping queued messages"
            );
            self.metrics.add_dropped(abandoned);
        }

        match dispatch {
            Dispatch::Single(text) => self.deliver(runtime, transport, &text, 1),
            Dispatch::Combined { text, count } => self.deliver(runtime, transport, &text, count),
            Dispatch::Wait(_) | Dispatch::Idle => {}
        }
        self.metrics.set_queue_depth(0);
    }
}

/// Cheap, clonable enqueue handle onto a running sender
#[derive(Clone)]
pub struct SenderHandle {
    shared: Arc<Shared>,
}

impl SenderHandle {
    pub fn enqueue(&self, message: impl Into<String>) {
        self.shared.enqueue(message.into());
    }

    pub fn status(&self) -> RateLimitStatus {
        self.shared.status()
    }
}

impl MessageSink for SenderHandle {
    fn enqueue(&self, message: String) {
        self.shared.enqueue(message);
    }
}

struct Worker {
    thread: JoinHandle<()>,
    done: mpsc::Receiver<()>,
}

/// Owner of the sender worker thread
pub struct MessageSender {
    shared: Arc<Shared>,
    worker: Mutex<Option<Worker>>,
}

impl MessageSender {
    /// Spawn the worker thread
    pub fn start(
        transport: Arc<dyn MessageTransport>,
        config: SenderConfig,
        logger: StructuredLogger,
    ) -> std::io::Result<Self> {
        let mut state = SenderState::new(&config);
        state.running = true;

        let shared = Arc::new(Shared {
            config,
            state: Mutex::new(state),
            wake: Condvar::new(),
            stop: AtomicBool::new(false),
            cycles: AtomicU64::new(0),
            metrics: MonitorMetrics::new(),
            logger,
        });

        let (done_tx, done_rx) = mpsc::channel();
        let worker_shared = Arc::clone(&shared);
        let thread = std::thread::Builder::new()
            .name("alert-sender".to_string())
            .spawn(move || {
                worker_shared.run(transport);
                let _ = done_tx.send(());
            })?;

        Ok(Self {
            shared,
            worker: Mutex::new(Some(Worker {
                thread,
                done: done_rx,
            })),
        })
    }

    pub fn handle(&self) -> SenderHandle {
        SenderHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Append to the outbound queue. Never blocks on the network.
    pub fn enqueue(&self, message: impl Into<String>) {
        self.shared.enqueue(message.into());
    }

    pub fn status(&self) -> RateLimitStatus {
        self.shared.status()
    }

    pub fn config(&self) -> &SenderConfig {
        &self.shared.config
    }

    /// Number of times the worker has planned a dispatch
    pub(crate) fn worker_cycles(&self) -> u64 {
        self.shared.cycles.load(Ordering::Relaxed)
    }

    /// Discard everything waiting in the queue, returning how many were dropped
    pub fn clear_queue(&self) -> usize {
        let cleared = {
            let mut state = self.shared.lock();
            let cleared = state.queue.len();
            state.queue.clear();
            cleared
        };
        self.shared.metrics.set_queue_depth(0);
        info!(cleared = cleared, "Cleared pending messages");
        cleared
    }

    /// Stop the worker after a final drain. Waits at most `shutdown_timeout`.
    ///
    /// Safe to call more than once.
    pub fn close(&self) {
        let worker = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(worker) = worker else {
            return;
        };

        self.shared.stop.store(true, Ordering::Release);
        // Taking the lock orders the store before any in-progress wait check
        drop(self.shared.lock());
        self.shared.wake.notify_all();

        match worker.done.recv_timeout(self.shared.config.shutdown_timeout) {
            Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => {
                if worker.thread.join().is_err() {
                    error!("Sender worker panicked");
                }
            }
            Err(mpsc::RecvTimeoutError::Timeout) => {
                warn!(
                    timeout_secs = self.shared.config.shutdown_timeout.as_secs_f64(),
                    "Sender worker did not stop in time, detaching"
                );
            }
        }
    }
}

impl Drop for MessageSender {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(config: &SenderConfig, queued: usize) -> SenderState {
        let mut state = SenderState::new(config);
        for i in 0..queued {
            state.queue.push_back(format!("msg {}", i + 1));
        }
        state
    }

    fn fill_window(state: &mut SenderState, count: usize, at: Instant) {
        for _ in 0..count {
            state.window.record(at);
        }
    }

    #[test]
    fn test_combine_messages_format() {
        let combined = combine_messages(&["first", "second"]);
        let expected = format!(
            "⚠️ COMBINED ALERTS (2 messages)\n{}\n\n[1] first\n\n[2] second\n\n",
            "=".repeat(40)
        );
        assert_eq!(combined, expected);
    }

    #[test]
    fn test_plan_idle_on_empty_queue() {
        let config = SenderConfig::default();
        let mut state = state_with(&config, 0);
        assert_eq!(plan(&mut state, &config, Instant::now()), Dispatch::Idle);
    }

    #[test]
    fn test_plan_single_under_limit_is_fifo() {
        let config = SenderConfig::default();
        let mut state = state_with(&config, 3);
        assert_eq!(
            plan(&mut state, &config, Instant::now()),
            Dispatch::Single("msg 1".to_string())
        );
        assert_eq!(state.queue.len(), 2);
    }

    #[test]
    fn test_plan_waits_at_limit_with_small_backlog() {
        let config = SenderConfig::default();
        let start = Instant::now();
        let mut state = state_with(&config, 1);
        fill_window(&mut state, 18, start);

        // Oldest send expires in 58s, so the wait is capped at 5s
        match plan(&mut state, &config, start + Duration::from_secs(1)) {
            Dispatch::Wait(wait) => assert_eq!(wait, Duration::from_secs(5)),
            other => panic!("expected wait, got {other:?}"),
        }
        assert_eq!(state.queue.len(), 1);

        // Close to expiry the wait is the remaining time plus slack
        match plan(&mut state, &config, start + Duration::from_secs(57)) {
            Dispatch::Wait(wait) => assert_eq!(wait, Duration::from_millis(1100)),
            other => panic!("expected wait, got {other:?}"),
        }
    }

    #[test]
    fn test_plan_combines_backlog_at_limit() {
        let config = SenderConfig::default();
        let start = Instant::now();
        let mut state = state_with(&config, 5);
        fill_window(&mut state, 18, start);

        match plan(&mut state, &config, start) {
            Dispatch::Combined { text, count } => {
                assert_eq!(count, 5);
                assert!(text.starts_with("⚠️ COMBINED ALERTS (5 messages)"));
                assert!(text.contains("[5] msg 5"));
            }
            other => panic!("expected combined, got {other:?}"),
        }
        assert!(state.queue.is_empty());
    }

    #[test]
    fn test_plan_never_crosses_provider_limit() {
        let config = SenderConfig::default();
        let start = Instant::now();
        let mut state = state_with(&config, 10);
        fill_window(&mut state, 20, start);

        assert!(matches!(plan(&mut state, &config, start), Dispatch::Wait(_)));
        assert_eq!(state.queue.len(), 10);
    }

    #[test]
    fn test_plan_resumes_after_window_expiry() {
        let config = SenderConfig::default().with_rate_limit(2, Duration::from_secs(10));
        let start = Instant::now();
        let mut state = state_with(&config, 1);
        fill_window(&mut state, 2, start);

        assert!(matches!(plan(&mut state, &config, start), Dispatch::Wait(_)));
        assert_eq!(
            plan(&mut state, &config, start + Duration::from_secs(10)),
            Dispatch::Single("msg 1".to_string())
        );
    }

    #[test]
    fn test_plan_final_combines_remaining() {
        let config = SenderConfig::default();
        let start = Instant::now();

        let mut state = state_with(&config, 1);
        assert_eq!(
            plan_final(&mut state, &config, start),
            Dispatch::Single("msg 1".to_string())
        );

        let mut state = state_with(&config, 3);
        fill_window(&mut state, 18, start);
        assert!(matches!(
            plan_final(&mut state, &config, start),
            Dispatch::Combined { count: 3, .. }
        ));

        let mut state = state_with(&config, 3);
        fill_window(&mut state, 20, start);
        assert_eq!(plan_final(&mut state, &config, start), Dispatch::Idle);
        assert_eq!(state.queue.len(), 3);
    }

    #[test]
    fn test_config_builders_keep_limits_consistent() {
        let config = SenderConfig::default().with_rate_limit(30, Duration::from_secs(60));
        assert_eq!(config.provider_limit, 30);

        let config = SenderConfig::default().with_provider_limit(5);
        assert_eq!(config.provider_limit, 18);

        let config = SenderConfig::default().with_combine_threshold(0);
        assert_eq!(config.combine_threshold, 2);
    }
}
