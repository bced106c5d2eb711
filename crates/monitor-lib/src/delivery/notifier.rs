//! Notification client
//!
//! Wires the burst buffer into the background sender and exposes the
//! fire-and-forget API used by alert producers.

use super::burst::{BurstBuffer, BurstConfig};
use super::sender::{MessageSender, MessageSink, RateLimitStatus, SenderConfig};
use super::transport::{
    BotIdentity, DeliveryError, MessageTransport, TelegramConfig, TelegramTransport,
};
use crate::observability::StructuredLogger;
use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{info, warn};

/// Everything needed to build a [`NotifierClient`]
#[derive(Debug, Clone)]
pub struct NotifierConfig {
    pub telegram: TelegramConfig,
    pub burst: BurstConfig,
    pub sender: SenderConfig,
    /// Instance name attached to structured log events
    pub instance: String,
}

impl Default for NotifierConfig {
    fn default() -> Self {
        Self {
            telegram: TelegramConfig::default(),
            burst: BurstConfig::default(),
            sender: SenderConfig::default(),
            instance: "position-monitor".to_string(),
        }
    }
}

/// Text of the message injected by [`NotifierClient::test_connection`]
pub fn test_message(now: DateTime<Local>) -> String {
    format!(
        "✅ Test Alert from Position Monitor\n\nConnection Successful\nTime: {}",
        now.format("%Y-%m-%d %H:%M:%S")
    )
}

/// Non-blocking notification API
///
/// `send` and `send_urgent` only touch in-memory queues; delivery is
/// asynchronous and best effort.
pub struct NotifierClient {
    transport: Arc<dyn MessageTransport>,
    sender: MessageSender,
    buffer: BurstBuffer,
    runtime: Handle,
    closed: AtomicBool,
}

impl NotifierClient {
    /// Build a Telegram-backed client. Must be called inside a tokio runtime.
    pub fn new(config: NotifierConfig) -> Result<Self> {
        let runtime = Handle::try_current().context("NotifierClient requires a tokio runtime")?;
        if !config.telegram.is_configured() {
            warn!("Telegram credentials missing, messages will fail to deliver");
        }
        let transport = TelegramTransport::new(config.telegram)
            .context("Failed to build Telegram transport")?;

        Self::with_transport(
            Arc::new(transport),
            config.burst,
            config.sender,
            StructuredLogger::new(config.instance),
            runtime,
        )
    }

    /// Build a client over any transport
    pub fn with_transport(
        transport: Arc<dyn MessageTransport>,
        burst: BurstConfig,
        sender: SenderConfig,
        logger: StructuredLogger,
        runtime: Handle,
    ) -> Result<Self> {
        let sender = MessageSender::start(Arc::clone(&transport), sender, logger)
            .context("Failed to spawn sender thread")?;
        let sink: Arc<dyn MessageSink> = Arc::new(sender.handle());
        let buffer = BurstBuffer::new(burst, sink, runtime.clone());

        info!(
            silence_ms = buffer.config().silence.as_millis() as u64,
            max_wait_ms = buffer.config().max_wait.as_millis() as u64,
            "Notifier ready"
        );

        Ok(Self {
            transport,
            sender,
            buffer,
            runtime,
            closed: AtomicBool::new(false),
        })
    }

    /// Route a message through the burst buffer. Always returns `true`.
    pub fn send(&self, text: impl Into<String>) -> bool {
        if self.closed.load(Ordering::Acquire) {
            warn!("Notifier closed, message discarded");
            return true;
        }
        self.buffer.add(text);
        true
    }

    /// Skip deduplication and queue for delivery right away. Always returns `true`.
    pub fn send_urgent(&self, text: impl Into<String>) -> bool {
        if self.closed.load(Ordering::Acquire) {
            warn!("Notifier closed, urgent message discarded");
            return true;
        }
        self.sender.enqueue(text);
        true
    }

    /// Check credentials against the provider's identity endpoint.
    ///
    /// The call runs on its own task, never on the caller's.
    pub async fn verify_connection(&self) -> Result<BotIdentity, DeliveryError> {
        let transport = Arc::clone(&self.transport);
        let task = self
            .runtime
            .spawn(async move { transport.identity().await });

        match task.await {
            Ok(Ok(identity)) => {
                info!(username = %identity.username, "Messaging credentials verified");
                Ok(identity)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "Messaging credential check failed");
                Err(e)
            }
            Err(e) => Err(DeliveryError::TaskFailed(e.to_string())),
        }
    }

    /// Verify credentials, then queue a test message directly for delivery
    pub async fn test_connection(&self) -> Result<BotIdentity, DeliveryError> {
        let identity = self.verify_connection().await?;
        self.sender.enqueue(test_message(Local::now()));
        Ok(identity)
    }

    pub fn rate_limit_status(&self) -> RateLimitStatus {
        self.sender.status()
    }

    /// Messages held by the burst buffer plus those queued for sending
    pub fn pending_count(&self) -> usize {
        self.buffer.pending_count() + self.sender.status().queue_depth
    }

    /// Drop everything queued for sending
    pub fn clear_queue(&self) -> usize {
        self.sender.clear_queue()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Cancel buffer timers and stop the sender (bounded wait). Idempotent.
    ///
    /// Blocks for up to the sender's shutdown timeout.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let discarded = self.buffer.cancel();
        if discarded > 0 {
            warn!(discarded = discarded, "Discarded buffered messages on close");
        }
        self.sender.close();
        info!("Notifier closed");
    }
}

impl Drop for NotifierClient {
    fn drop(&mut self) {
        self.close();
    }
}
