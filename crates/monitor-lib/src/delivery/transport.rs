//! Messaging provider transport
//!
//! The transport is the only code that talks to the messaging API. It is
//! driven exclusively from the sender worker or from a one-off verification
//! task, never from alert producers.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error};

const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Errors raised while talking to the messaging provider
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// Credentials are missing, so no request was attempted.
    #[error("Messaging provider not configured: missing {0}")]
    NotConfigured(&'static str),

    /// The provider answered with a non-success status.
    #[error("Provider rejected request ({status}): {body}")]
    Rejected { status: u16, body: String },

    /// Network, timeout or body decoding failure.
    #[error("Request error: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider answered 200 but the payload did not say ok.
    #[error("Unexpected provider response: {0}")]
    InvalidResponse(String),

    /// The background task running the call did not complete.
    #[error("Delivery task failed: {0}")]
    TaskFailed(String),
}

/// Identity reported by the provider for the configured credentials
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotIdentity {
    pub username: String,
}

/// Anything able to push a text message to the outside world
#[async_trait]
pub trait MessageTransport: Send + Sync {
    /// Deliver a single message. Any error means the message was not delivered.
    async fn deliver(&self, text: &str) -> Result<(), DeliveryError>;

    /// Check the credentials against the provider's identity endpoint.
    async fn identity(&self) -> Result<BotIdentity, DeliveryError>;
}

/// Configuration for the Telegram bot transport
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token issued by BotFather
    pub bot_token: String,
    /// Target chat or channel id (e.g. "-1003220645575")
    pub chat_id: String,
    /// Base URL of the Bot API
    pub api_base: String,
    /// Parse mode sent with every message; `None` sends plain text
    pub parse_mode: Option<String>,
    /// Per-request timeout in seconds
    pub request_timeout_secs: f64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: String::new(),
            chat_id: String::new(),
            api_base: DEFAULT_API_BASE.to_string(),
            parse_mode: Some("HTML".to_string()),
            request_timeout_secs: 5.0,
        }
    }
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>, chat_id: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            chat_id: chat_id.into(),
            ..Default::default()
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Both the token and the chat id are present
    pub fn is_configured(&self) -> bool {
        !self.bot_token.trim().is_empty() && !self.chat_id.trim().is_empty()
    }
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct GetMeResponse {
    ok: bool,
    #[serde(default)]
    result: Option<GetMeResult>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GetMeResult {
    #[serde(default)]
    username: Option<String>,
}

/// Telegram Bot API transport
pub struct TelegramTransport {
    client: Client,
    config: TelegramConfig,
}

impl TelegramTransport {
    pub fn new(config: TelegramConfig) -> Result<Self, DeliveryError> {
        let client = Client::builder()
            .timeout(Duration::from_secs_f64(config.request_timeout_secs.max(0.1)))
            .build()?;

        Ok(Self { client, config })
    }

    pub fn config(&self) -> &TelegramConfig {
        &self.config
    }

    fn method_url(&self, method: &str) -> String {
        format!(
            "{}/bot{}/{}",
            self.config.api_base.trim_end_matches('/'),
            self.config.bot_token.trim(),
            method
        )
    }

    fn ensure_configured(&self) -> Result<(), DeliveryError> {
        if self.config.bot_token.trim().is_empty() {
            return Err(DeliveryError::NotConfigured("bot token"));
        }
        if self.config.chat_id.trim().is_empty() {
            return Err(DeliveryError::NotConfigured("chat id"));
        }
        Ok(())
    }
}

#[async_trait]
impl MessageTransport for TelegramTransport {
    async fn deliver(&self, text: &str) -> Result<(), DeliveryError> {
        self.ensure_configured()?;

        let payload = SendMessageRequest {
            chat_id: self.config.chat_id.trim(),
            text,
            parse_mode: self.config.parse_mode.as_deref(),
        };

        let response = self
            .client
            .post(self.method_url("sendMessage"))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), body = %body, "Telegram API error");
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(chars = text.len(), "Message accepted by Telegram");
        Ok(())
    }

    async fn identity(&self) -> Result<BotIdentity, DeliveryError> {
        if self.config.bot_token.trim().is_empty() {
            return Err(DeliveryError::NotConfigured("bot token"));
        }

        let response = self.client.get(self.method_url("getMe")).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeliveryError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let body: GetMeResponse = response.json().await?;
        if !body.ok {
            return Err(DeliveryError::InvalidResponse(
                body.description.unwrap_or_else(|| "ok=false".to_string()),
            ));
        }

        let username = body
            .result
            .and_then(|r| r.username)
            .unwrap_or_else(|| "Unknown".to_string());

        Ok(BotIdentity { username })
    }
}
