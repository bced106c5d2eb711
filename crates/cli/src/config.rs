//! Configuration management for the CLI

use anyhow::{Context, Result};
use monitor_lib::delivery::TelegramConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Daemon API URL
    pub api_url: Option<String>,
    /// Bot token used by `verify`
    pub bot_token: Option<String>,
    /// Chat id used by `verify`
    pub chat_id: Option<String>,
}

impl Config {
    /// Load `~/.config/pmon/config.json`, or defaults when absent
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).context("Failed to read config file")?;

        serde_json::from_str(&content).context("Failed to parse config file")
    }

    fn config_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".config").join("pmon").join("config.json"))
    }

    /// Telegram settings, flags taking precedence over the file
    pub fn telegram(&self, bot_token: Option<String>, chat_id: Option<String>) -> TelegramConfig {
        TelegramConfig::new(
            bot_token.or_else(|| self.bot_token.clone()).unwrap_or_default(),
            chat_id.or_else(|| self.chat_id.clone()).unwrap_or_default(),
        )
    }
}
