//! Monitor configuration

use anyhow::{Context, Result};
use monitor_lib::delivery::{BurstConfig, NotifierConfig, SenderConfig, TelegramConfig};
use monitor_lib::gridlog::{GridLogConfig, GridLogType};
use monitor_lib::rules::{CooldownConfig, ThresholdMap};
use monitor_lib::service::ServiceConfig;
use monitor_lib::source::BridgeConfig;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable naming the config file
pub const CONFIG_PATH_ENV: &str = "MONITOR_CONFIG";
pub const DEFAULT_CONFIG_PATH: &str = "monitor.toml";

/// Monitor configuration
#[derive(Debug, Clone, Deserialize)]
pub struct MonitorConfig {
    /// Instance name attached to structured log events
    #[serde(default = "default_instance")]
    pub instance: String,

    /// API server port for health/metrics/status
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    #[serde(default)]
    pub telegram: TelegramConfig,

    #[serde(default)]
    pub delivery: DeliverySettings,

    #[serde(default)]
    pub bridge: BridgeSettings,

    #[serde(default)]
    pub grid_log: GridLogSettings,

    #[serde(default)]
    pub service: ServiceSettings,

    /// Rules per user alias
    #[serde(default)]
    pub thresholds: ThresholdMap,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeliverySettings {
    pub rate_limit_max: usize,
    pub rate_limit_window_secs: f64,
    pub provider_limit: usize,
    pub combine_threshold: usize,
    pub burst_silence_secs: f64,
    pub burst_max_wait_secs: f64,
    pub shutdown_timeout_secs: f64,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        let sender = SenderConfig::default();
        let burst = BurstConfig::default();
        Self {
            rate_limit_max: sender.rate_limit_max,
            rate_limit_window_secs: sender.rate_limit_window.as_secs_f64(),
            provider_limit: sender.provider_limit,
            combine_threshold: sender.combine_threshold,
            burst_silence_secs: burst.silence.as_secs_f64(),
            burst_max_wait_secs: burst.max_wait.as_secs_f64(),
            shutdown_timeout_secs: sender.shutdown_timeout.as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeSettings {
    pub base_url: String,
    pub request_timeout_secs: f64,
    pub retry_attempts: u32,
    pub retry_delay_secs: f64,
}

impl Default for BridgeSettings {
    fn default() -> Self {
        let bridge = BridgeConfig::default();
        Self {
            base_url: bridge.base_url,
            request_timeout_secs: bridge.request_timeout.as_secs_f64(),
            retry_attempts: bridge.retry_attempts,
            retry_delay_secs: bridge.retry_delay.as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GridLogSettings {
    pub enabled: bool,
    pub base_path: PathBuf,
    pub enabled_types: Vec<GridLogType>,
    pub filter_keywords: Vec<String>,
}

impl Default for GridLogSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            base_path: PathBuf::from("logs"),
            enabled_types: GridLogType::ALL.to_vec(),
            filter_keywords: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    pub check_interval_secs: f64,
    pub poll_interval_secs: f64,
    pub cooldown_secs: f64,
    pub max_backoff_secs: f64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        let service = ServiceConfig::default();
        Self {
            check_interval_secs: service.check_interval.as_secs_f64(),
            poll_interval_secs: service.poll_interval.as_secs_f64(),
            cooldown_secs: CooldownConfig::default().window.as_secs_f64(),
            max_backoff_secs: service.max_backoff.as_secs_f64(),
        }
    }
}

fn default_instance() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "position-monitor".to_string())
}

fn default_api_port() -> u16 {
    8080
}

/// Negative or NaN values become zero, values too large for a `Duration` fall back to `default`
fn secs(value: f64, default: Duration) -> Duration {
    if value.is_nan() || value <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(value).unwrap_or(default)
}

impl MonitorConfig {
    /// Load from the file named by `MONITOR_CONFIG` (default `monitor.toml`,
    /// optional) with `MONITOR_*` environment overrides
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        Self::load_from(&path)
    }

    pub fn load_from(path: &str) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("MONITOR")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .context("Failed to read monitor configuration")?;

        config
            .try_deserialize()
            .context("Invalid monitor configuration")
    }

    pub fn sender_config(&self) -> SenderConfig {
        let d = &self.delivery;
        let defaults = SenderConfig::default();
        SenderConfig::default()
            .with_rate_limit(
                d.rate_limit_max,
                secs(d.rate_limit_window_secs, defaults.rate_limit_window),
            )
            .with_provider_limit(d.provider_limit)
            .with_combine_threshold(d.combine_threshold)
            .with_shutdown_timeout(secs(d.shutdown_timeout_secs, defaults.shutdown_timeout))
    }

    pub fn burst_config(&self) -> BurstConfig {
        let defaults = BurstConfig::default();
        BurstConfig::new(
            secs(self.delivery.burst_silence_secs, defaults.silence),
            secs(self.delivery.burst_max_wait_secs, defaults.max_wait),
        )
    }

    pub fn notifier_config(&self) -> NotifierConfig {
        NotifierConfig {
            telegram: self.telegram.clone(),
            burst: self.burst_config(),
            sender: self.sender_config(),
            instance: self.instance.clone(),
        }
    }

    pub fn bridge_config(&self) -> BridgeConfig {
        let b = &self.bridge;
        let defaults = BridgeConfig::default();
        let retry_delay = secs(b.retry_delay_secs, defaults.retry_delay);
        BridgeConfig {
            base_url: b.base_url.clone(),
            request_timeout: secs(b.request_timeout_secs, defaults.request_timeout),
            ..defaults
        }
        .with_retries(b.retry_attempts, retry_delay)
    }

    /// `None` when grid log monitoring is disabled
    pub fn grid_log_config(&self) -> Option<GridLogConfig> {
        let g = &self.grid_log;
        g.enabled.then(|| {
            GridLogConfig::new(&g.base_path)
                .with_enabled_types(g.enabled_types.iter().copied())
                .with_filter_keywords(g.filter_keywords.clone())
        })
    }

    pub fn service_config(&self) -> ServiceConfig {
        let s = &self.service;
        let defaults = ServiceConfig::default();
        defaults
            .clone()
            .with_intervals(
                secs(s.check_interval_secs, defaults.check_interval),
                secs(s.poll_interval_secs, defaults.poll_interval),
            )
            .with_backoff(
                defaults.initial_backoff,
                secs(s.max_backoff_secs, defaults.max_backoff),
            )
    }

    pub fn cooldown_config(&self) -> CooldownConfig {
        CooldownConfig {
            window: secs(self.service.cooldown_secs, CooldownConfig::default().window),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monitor_lib::rules::{thresholds_for, AlertKind};
    use std::io::Write;

    fn load_toml(contents: &str) -> MonitorConfig {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        MonitorConfig::load_from(file.path().to_str().unwrap()).unwrap()
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = MonitorConfig::load_from("/nonexistent/monitor.toml").unwrap();
        assert_eq!(config.api_port, 8080);
        assert!(!config.grid_log.enabled);
        assert!(config.grid_log_config().is_none());
        assert!(config.thresholds.is_empty());

        let sender = config.sender_config();
        assert_eq!(sender.rate_limit_max, 18);
        assert_eq!(sender.provider_limit, 20);
        assert_eq!(sender.rate_limit_window, Duration::from_secs(58));
        assert_eq!(config.burst_config().silence, Duration::from_millis(200));
        assert_eq!(config.service_config().check_interval, Duration::from_millis(500));
        assert_eq!(config.cooldown_config().window, Duration::from_secs(300));
    }

    #[test]
    fn test_file_sections_and_thresholds() {
        let config = load_toml(
            r#"
            api_port = 9100

            [telegram]
            bot_token = "123:abc"
            chat_id = "-1003220645575"

            [delivery]
            rate_limit_max = 10
            combine_threshold = 3

            [grid_log]
            enabled = true
            base_path = "/srv/grid"
            enabled_types = ["ERROR", "ATTENTION"]
            filter_keywords = ["heartbeat"]

            [service]
            check_interval_secs = 0.25

            [thresholds.SUNNY]
            mtm_below = -5000
            roi_below = "2.5"
            calls_sell = ""
            "#,
        );

        assert_eq!(config.api_port, 9100);
        assert!(config.telegram.is_configured());

        let sender = config.sender_config();
        assert_eq!(sender.rate_limit_max, 10);
        assert_eq!(sender.combine_threshold, 3);
        // Provider ceiling keeps its default headroom
        assert_eq!(sender.provider_limit, 20);

        let grid = config.grid_log_config().unwrap();
        assert_eq!(grid.base_path, PathBuf::from("/srv/grid"));
        assert_eq!(grid.enabled_types, vec![GridLogType::Error, GridLogType::Attention]);

        assert_eq!(
            config.service_config().check_interval,
            Duration::from_millis(250)
        );

        let sunny = thresholds_for(&config.thresholds, "SUNNY").unwrap();
        assert_eq!(sunny.get(AlertKind::MtmBelow), Some(-5000.0));
        assert_eq!(sunny.get(AlertKind::RoiBelow), Some(2.5));
        assert_eq!(sunny.get(AlertKind::CallsSell), None);
        assert_eq!(sunny.enabled_count(), 2);
    }

    #[test]
    fn test_negative_durations_clamp_to_zero() {
        let default = Duration::from_secs(7);
        assert_eq!(secs(-1.0, default), Duration::ZERO);
        assert_eq!(secs(f64::NAN, default), Duration::ZERO);
        assert_eq!(secs(1.5, default), Duration::from_millis(1500));
    }

    #[test]
    fn test_oversized_durations_fall_back_to_default() {
        let default = Duration::from_secs(7);
        assert_eq!(secs(1e30, default), default);
        assert_eq!(secs(f64::INFINITY, default), default);
    }

    #[test]
    fn test_oversized_rate_window_keeps_default() {
        let config = load_toml("[delivery]\nrate_limit_window_secs = 1e30\n");

        assert_eq!(
            config.sender_config().rate_limit_window,
            Duration::from_secs(58)
        );
    }
}
