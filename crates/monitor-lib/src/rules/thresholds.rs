//! Per-user alert thresholds
//!
//! Every threshold is optional. A missing key, a blank string or a value
//! that does not parse as a number leaves the rule disabled.

use super::event::AlertKind;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashMap;
use tracing::warn;

/// Thresholds keyed by user alias
pub type ThresholdMap = HashMap<String, UserThresholds>;

/// Thresholds configured for one user
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserThresholds {
    #[serde(deserialize_with = "optional_threshold")]
    pub mtm_above: Option<f64>,
    /// Usually negative; fires when MTM drops below it
    #[serde(deserialize_with = "optional_threshold")]
    pub mtm_below: Option<f64>,
    #[serde(deserialize_with = "optional_threshold")]
    pub roi_above: Option<f64>,
    /// Entered as a positive percentage; fires when ROI% < -value
    #[serde(deserialize_with = "optional_threshold")]
    pub roi_below: Option<f64>,
    #[serde(deserialize_with = "optional_threshold")]
    pub margin_percent: Option<f64>,
    #[serde(deserialize_with = "optional_threshold")]
    pub calls_sell: Option<f64>,
    #[serde(deserialize_with = "optional_threshold")]
    pub puts_sell: Option<f64>,
    #[serde(deserialize_with = "optional_threshold")]
    pub calls_buy: Option<f64>,
    #[serde(deserialize_with = "optional_threshold")]
    pub puts_buy: Option<f64>,
    #[serde(deserialize_with = "optional_threshold")]
    pub calls_net: Option<f64>,
    #[serde(deserialize_with = "optional_threshold")]
    pub puts_net: Option<f64>,
}

impl UserThresholds {
    /// Threshold backing a given rule
    pub fn get(&self, kind: AlertKind) -> Option<f64> {
        match kind {
            AlertKind::MtmAbove => self.mtm_above,
            AlertKind::MtmBelow => self.mtm_below,
            AlertKind::RoiAbove => self.roi_above,
            AlertKind::RoiBelow => self.roi_below,
            AlertKind::MarginAbove => self.margin_percent,
            AlertKind::CallsSell => self.calls_sell,
            AlertKind::PutsSell => self.puts_sell,
            AlertKind::CallsBuy => self.calls_buy,
            AlertKind::PutsBuy => self.puts_buy,
            AlertKind::CallsNet => self.calls_net,
            AlertKind::PutsNet => self.puts_net,
        }
    }

    pub fn set(&mut self, kind: AlertKind, value: Option<f64>) {
        let slot = match kind {
            AlertKind::MtmAbove => &mut self.mtm_above,
            AlertKind::MtmBelow => &mut self.mtm_below,
            AlertKind::RoiAbove => &mut self.roi_above,
            AlertKind::RoiBelow => &mut self.roi_below,
            AlertKind::MarginAbove => &mut self.margin_percent,
            AlertKind::CallsSell => &mut self.calls_sell,
            AlertKind::PutsSell => &mut self.puts_sell,
            AlertKind::CallsBuy => &mut self.calls_buy,
            AlertKind::PutsBuy => &mut self.puts_buy,
            AlertKind::CallsNet => &mut self.calls_net,
            AlertKind::PutsNet => &mut self.puts_net,
        };
        *slot = value;
    }

    pub fn with(mut self, kind: AlertKind, value: f64) -> Self {
        self.set(kind, Some(value));
        self
    }

    /// Number of rules enabled for this user
    pub fn enabled_count(&self) -> usize {
        AlertKind::ALL
            .iter()
            .filter(|kind| self.get(**kind).is_some())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.enabled_count() == 0
    }
}

/// Thresholds for an alias, matching exactly first and then ignoring case
pub fn thresholds_for<'a>(map: &'a ThresholdMap, alias: &str) -> Option<&'a UserThresholds> {
    map.get(alias).or_else(|| {
        map.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(alias))
            .map(|(_, thresholds)| thresholds)
    })
}

/// Parse a user-entered threshold; blank or malformed input disables the rule
pub fn parse_threshold(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() => Some(value),
        _ => {
            warn!(value = %trimmed, "Ignoring threshold that is not a number");
            None
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawThreshold {
    Number(f64),
    Text(String),
}

fn optional_threshold<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<RawThreshold> = Option::deserialize(deserializer)?;
    Ok(match raw {
        Some(RawThreshold::Number(value)) if value.is_finite() => Some(value),
        Some(RawThreshold::Number(_)) | None => None,
        Some(RawThreshold::Text(text)) => parse_threshold(&text),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_threshold() {
        assert_eq!(parse_threshold(" 85 "), Some(85.0));
        assert_eq!(parse_threshold("-5000.5"), Some(-5000.5));
        assert_eq!(parse_threshold(""), None);
        assert_eq!(parse_threshold("   "), None);
        assert_eq!(parse_threshold("abc"), None);
    }

    #[test]
    fn test_deserialize_mixed_inputs() {
        let thresholds: UserThresholds = serde_json::from_value(json!({
            "mtm_above": 25000,
            "mtm_below": "-5000",
            "roi_below": "",
            "margin_percent": "85",
            "calls_sell": null,
            "puts_net": "lots"
        }))
        .unwrap();

        assert_eq!(thresholds.mtm_above, Some(25000.0));
        assert_eq!(thresholds.mtm_below, Some(-5000.0));
        assert_eq!(thresholds.roi_below, None);
        assert_eq!(thresholds.margin_percent, Some(85.0));
        assert_eq!(thresholds.calls_sell, None);
        assert_eq!(thresholds.puts_net, None);
        assert_eq!(thresholds.roi_above, None);
        assert_eq!(thresholds.enabled_count(), 3);
    }

    #[test]
    fn test_threshold_map_by_alias() {
        let map: ThresholdMap = serde_json::from_value(json!({
            "SUNNY": { "margin_percent": "90" },
            "RAVI": {}
        }))
        .unwrap();

        assert_eq!(map["SUNNY"].get(AlertKind::MarginAbove), Some(90.0));
        assert!(map["RAVI"].is_empty());

        assert!(thresholds_for(&map, "sunny").is_some());
        assert!(thresholds_for(&map, "NOBODY").is_none());
    }

    #[test]
    fn test_builder_sets_by_kind() {
        let thresholds = UserThresholds::default()
            .with(AlertKind::CallsNet, 500.0)
            .with(AlertKind::RoiBelow, 3.0);
        assert_eq!(thresholds.calls_net, Some(500.0));
        assert_eq!(thresholds.roi_below, Some(3.0));
        assert_eq!(thresholds.enabled_count(), 2);
    }
}
