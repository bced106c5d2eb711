//! Alert delivery pipeline
//!
//! This module provides:
//! - Burst buffer grouping near-simultaneous alerts by fingerprint
//! - Rate-limited background sender with backlog combination
//! - Telegram transport
//! - Non-blocking notification client tying them together

mod burst;
mod notifier;
mod rate;
mod sender;
mod summary;
mod transport;


pub use burst::{BurstBuffer, BurstConfig};
pub use notifier::{test_message, NotifierClient, NotifierConfig};
pub use rate::{RateWindow, DEFAULT_RATE_LIMIT_MAX, DEFAULT_RATE_LIMIT_WINDOW};
pub use sender::{
    combine_messages, Dispatch, MessageSender, MessageSink, RateLimitStatus, SenderConfig,
    SenderHandle, DEFAULT_COMBINE_THRESHOLD, DEFAULT_PROVIDER_LIMIT,
};
pub use summary::{bullet_text, fingerprint, header_of, identity_of, summarize, BufferedMessage};
pub use transport::{
    BotIdentity, DeliveryError, MessageTransport, TelegramConfig, TelegramTransport,
};
