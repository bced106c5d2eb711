//! HTTP trading bridge source
//!
//! The bridge answers `GET {base}/{Endpoint}` either with a JSON envelope
//! `{"response": "..."}` or with plain text. Records are separated by `~`,
//! fields by `|`.

use super::aggregate::aggregate_user;
use super::{SnapshotSource, SourceError};
use crate::models::{OptionsPositionSummary, PositionRecord, UserRecord};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const USER_FIELDS: usize = 19;
const POSITION_FIELDS: usize = 18;

/// Configuration for the bridge source
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Base URL, e.g. `http://localhost:21000`
    pub base_url: String,
    pub request_timeout: Duration,
    /// Attempts per request before giving up
    pub retry_attempts: u32,
    pub retry_delay: Duration,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:21000".to_string(),
            request_timeout: Duration::from_secs(10),
            retry_attempts: 3,
            retry_delay: Duration::from_secs(1),
        }
    }
}

impl BridgeConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Default::default()
        }
    }

    pub fn with_retries(mut self, attempts: u32, delay: Duration) -> Self {
        self.retry_attempts = attempts.max(1);
        self.retry_delay = delay;
        self
    }
}

/// Extract the payload from a bridge body.
///
/// JSON objects yield their `response` field (or `data` / `value` / `result`
/// on success); an `error` field is an API error. Anything else is plain text.
pub fn unwrap_envelope(body: &str) -> Result<String, SourceError> {
    let trimmed = body.trim();
    let Ok(serde_json::Value::Object(map)) = serde_json::from_str::<serde_json::Value>(trimmed)
    else {
        return Ok(trimmed.to_string());
    };

    let as_text = |value: &serde_json::Value| match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    };

    if let Some(response) = map.get("response") {
        return Ok(as_text(response));
    }
    if map.get("status").and_then(|s| s.as_str()) == Some("success") {
        for key in ["data", "value", "result"] {
            if let Some(value) = map.get(key) {
                return Ok(as_text(value));
            }
        }
        return Ok(String::new());
    }
    if let Some(error) = map.get("error") {
        return Err(SourceError::Api(as_text(error)));
    }
    Ok(trimmed.to_string())
}

fn safe_float(field: &str) -> f64 {
    let cleaned = field.trim().replace(',', "");
    if cleaned.is_empty() || cleaned == "-" {
        return 0.0;
    }
    cleaned.parse().unwrap_or(0.0)
}

fn safe_int(field: &str) -> i64 {
    let cleaned = field.trim().replace(',', "");
    if cleaned.is_empty() || cleaned == "-" {
        return 0;
    }
    cleaned
        .parse::<i64>()
        .or_else(|_| cleaned.parse::<f64>().map(|v| v.trunc() as i64))
        .unwrap_or(0)
}

fn flag(field: &str) -> bool {
    field.trim().eq_ignore_ascii_case("true")
}

fn records(payload: &str) -> impl Iterator<Item = Vec<&str>> {
    payload
        .split('~')
        .map(str::trim)
        .filter(|record| !record.is_empty())
        .map(|record| record.split('|').collect())
}

/// Parse the `Users` payload; short records are skipped
pub fn parse_users(payload: &str) -> Vec<UserRecord> {
    records(payload)
        .filter_map(|fields| {
            if fields.len() < USER_FIELDS {
                warn!(fields = fields.len(), "Incomplete user record");
                return None;
            }
            Some(UserRecord {
                enabled: flag(fields[0]),
                user_id: fields[1].trim().to_string(),
                logged_in: flag(fields[2]),
                mtm: safe_float(fields[3]),
                available_margin: safe_float(fields[6]),
                user_alias: fields[8].trim().to_string(),
                broker: fields[9].trim().to_string(),
                utilized_margin: safe_float(fields[15]),
            })
        })
        .collect()
}

/// Parse the `Positions` payload; short records are skipped
pub fn parse_positions(payload: &str) -> Vec<PositionRecord> {
    records(payload)
        .filter_map(|fields| {
            if fields.len() < POSITION_FIELDS {
                warn!(fields = fields.len(), "Incomplete position record");
                return None;
            }
            Some(PositionRecord {
                symbol: fields[2].trim().to_string(),
                net_qty: safe_int(fields[3]),
                user_id: fields[16].trim().to_string(),
            })
        })
        .collect()
}

/// Snapshot source backed by the trading bridge's HTTP API
pub struct BridgeSource {
    client: Client,
    base: Url,
    config: BridgeConfig,
}

impl BridgeSource {
    pub fn new(config: BridgeConfig) -> Result<Self, SourceError> {
        let mut base = Url::parse(&config.base_url)?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            client,
            base,
            config,
        })
    }

    async fn request(&self, endpoint: &str, user: Option<&str>) -> Result<String, SourceError> {
        let mut url = self.base.join(endpoint)?;
        if let Some(user) = user {
            url.query_pairs_mut().append_pair("User", user);
        }

        let mut last_error = None;
        for attempt in 1..=self.config.retry_attempts.max(1) {
            match self.client.get(url.clone()).send().await {
                Ok(response) if response.status().is_success() => {
                    let body = response.text().await?;
                    return unwrap_envelope(&body);
                }
                Ok(response) => {
                    last_error = Some(SourceError::Status {
                        endpoint: endpoint.to_string(),
                        status: response.status().as_u16(),
                    });
                }
                Err(e) => {
                    debug!(endpoint = %endpoint, attempt = attempt, error = %e, "Bridge request failed");
                    last_error = Some(SourceError::Request(e));
                }
            }
            if attempt < self.config.retry_attempts {
                tokio::time::sleep(self.config.retry_delay).await;
            }
        }

        Err(last_error.unwrap_or_else(|| SourceError::Api("no attempts made".to_string())))
    }

    pub async fn users(&self) -> Result<Vec<UserRecord>, SourceError> {
        Ok(parse_users(&self.request("Users", None).await?))
    }

    pub async fn positions(&self, user_id: &str) -> Result<Vec<PositionRecord>, SourceError> {
        Ok(parse_positions(&self.request("Positions", Some(user_id)).await?))
    }
}

#[async_trait]
impl SnapshotSource for BridgeSource {
    async fn ping(&self) -> bool {
        match self.request("Ping", None).await {
            Ok(body) => !body.is_empty() && body != "false",
            Err(_) => false,
        }
    }

    async fn snapshot(&self) -> Result<Vec<OptionsPositionSummary>, SourceError> {
        let users = self.users().await?;
        let mut summaries = Vec::new();

        for user in users.iter().filter(|u| u.is_active()) {
            let positions = self.positions(&user.user_id).await?;
            summaries.push(aggregate_user(user, &positions));
        }

        debug!(users = summaries.len(), "Fetched position snapshot");
        Ok(summaries)
    }
}
