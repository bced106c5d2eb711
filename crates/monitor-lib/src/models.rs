//! Core data models for the position monitor

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// A trading account as reported by the broker bridge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub enabled: bool,
    pub user_id: String,
    pub logged_in: bool,
    pub mtm: f64,
    pub available_margin: f64,
    pub user_alias: String,
    pub broker: String,
    pub utilized_margin: f64,
}

impl UserRecord {
    /// Alias shown in alerts, falling back to the user id
    pub fn display_alias(&self) -> &str {
        if !self.user_alias.is_empty() {
            &self.user_alias
        } else if !self.user_id.is_empty() {
            &self.user_id
        } else {
            "Default"
        }
    }

    /// Only enabled, logged-in accounts are monitored
    pub fn is_active(&self) -> bool {
        self.enabled && self.logged_in
    }
}

/// One open position row for a user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub symbol: String,
    pub net_qty: i64,
    pub user_id: String,
}

/// Imparity indicator: green when calls and puts are both flat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Imparity {
    Green,
    Red,
}

/// Aggregated options exposure for a single user.
///
/// Sell quantities are negative, buy quantities positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionsPositionSummary {
    pub user_id: String,
    pub user_alias: String,
    pub live_pnl: f64,
    pub call_sell_qty: i64,
    pub call_buy_qty: i64,
    pub put_sell_qty: i64,
    pub put_buy_qty: i64,
    pub calls_net: i64,
    pub puts_net: i64,
    pub imparity: Imparity,
    pub available_margin: f64,
    pub utilized_margin: f64,
    pub last_updated: Option<DateTime<Local>>,
}

impl OptionsPositionSummary {
    /// Empty summary for a user with no option positions
    pub fn flat(user_id: impl Into<String>, user_alias: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            user_alias: user_alias.into(),
            live_pnl: 0.0,
            call_sell_qty: 0,
            call_buy_qty: 0,
            put_sell_qty: 0,
            put_buy_qty: 0,
            calls_net: 0,
            puts_net: 0,
            imparity: Imparity::Green,
            available_margin: 0.0,
            utilized_margin: 0.0,
            last_updated: None,
        }
    }

    pub fn is_balanced(&self) -> bool {
        self.puts_net == 0 && self.calls_net == 0
    }

    /// Return on utilised margin, in percent
    pub fn roi_on_utilized(&self) -> f64 {
        if self.utilized_margin > 0.0 {
            self.live_pnl / self.utilized_margin * 100.0
        } else {
            0.0
        }
    }

    /// Share of total margin currently utilised, in percent
    pub fn margin_utilization(&self) -> f64 {
        let total = self.available_margin + self.utilized_margin;
        if total > 0.0 {
            self.utilized_margin / total * 100.0
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_alias_fallbacks() {
        let mut user = UserRecord {
            enabled: true,
            user_id: "FZ20267".to_string(),
            logged_in: true,
            mtm: 0.0,
            available_margin: 0.0,
            user_alias: String::new(),
            broker: "Zerodha".to_string(),
            utilized_margin: 0.0,
        };
        assert_eq!(user.display_alias(), "FZ20267");

        user.user_alias = "SUNNY".to_string();
        assert_eq!(user.display_alias(), "SUNNY");

        user.user_alias.clear();
        user.user_id.clear();
        assert_eq!(user.display_alias(), "Default");
    }

    #[test]
    fn test_margin_ratios() {
        let mut summary = OptionsPositionSummary::flat("U1", "alpha");
        assert_eq!(summary.roi_on_utilized(), 0.0);
        assert_eq!(summary.margin_utilization(), 0.0);

        summary.live_pnl = 5_000.0;
        summary.utilized_margin = 100_000.0;
        summary.available_margin = 300_000.0;

        assert!((summary.roi_on_utilized() - 5.0).abs() < 1e-9);
        assert!((summary.margin_utilization() - 25.0).abs() < 1e-9);
    }
}
