//! Triggered alert values and their message text

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Rule that produced an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    MtmAbove,
    MtmBelow,
    RoiAbove,
    RoiBelow,
    MarginAbove,
    CallsSell,
    PutsSell,
    CallsBuy,
    PutsBuy,
    CallsNet,
    PutsNet,
}

/// Broad grouping used for the message header and value formatting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertCategory {
    Mtm,
    Roi,
    Margin,
    Quantity,
}

impl AlertCategory {
    pub fn emoji(&self) -> &'static str {
        match self {
            AlertCategory::Mtm | AlertCategory::Roi => "📈",
            AlertCategory::Margin => "⚠️",
            AlertCategory::Quantity => "📊",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            AlertCategory::Mtm => "MTM ALERT",
            AlertCategory::Roi => "ROI ALERT",
            AlertCategory::Margin => "MARGIN ALERT",
            AlertCategory::Quantity => "QUANTITY ALERT",
        }
    }

    /// Render a threshold or actual value the way the category expects
    pub fn format_value(&self, value: f64) -> String {
        match self {
            AlertCategory::Margin => format!("{value:.1}%"),
            AlertCategory::Roi => format!("{value:.2}%"),
            AlertCategory::Quantity => format!("{}", value.trunc() as i64),
            AlertCategory::Mtm => format_rupees(value),
        }
    }
}

impl AlertKind {
    pub const ALL: [AlertKind; 11] = [
        AlertKind::MtmAbove,
        AlertKind::MtmBelow,
        AlertKind::RoiAbove,
        AlertKind::RoiBelow,
        AlertKind::MarginAbove,
        AlertKind::CallsSell,
        AlertKind::PutsSell,
        AlertKind::CallsBuy,
        AlertKind::PutsBuy,
        AlertKind::CallsNet,
        AlertKind::PutsNet,
    ];

    /// Stable snake_case name, used for cooldown status and metric labels
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::MtmAbove => "mtm_above",
            AlertKind::MtmBelow => "mtm_below",
            AlertKind::RoiAbove => "roi_above",
            AlertKind::RoiBelow => "roi_below",
            AlertKind::MarginAbove => "margin_above",
            AlertKind::CallsSell => "calls_sell",
            AlertKind::PutsSell => "puts_sell",
            AlertKind::CallsBuy => "calls_buy",
            AlertKind::PutsBuy => "puts_buy",
            AlertKind::CallsNet => "calls_net",
            AlertKind::PutsNet => "puts_net",
        }
    }

    pub fn metric_name(&self) -> &'static str {
        match self {
            AlertKind::MtmAbove => "MTM Above Threshold",
            AlertKind::MtmBelow => "MTM Below Threshold",
            AlertKind::RoiAbove => "ROI% Above Threshold",
            AlertKind::RoiBelow => "ROI% Below Threshold",
            AlertKind::MarginAbove => "Margin Utilization",
            AlertKind::CallsSell => "Calls Sell Quantity",
            AlertKind::PutsSell => "Puts Sell Quantity",
            AlertKind::CallsBuy => "Calls Buy Quantity",
            AlertKind::PutsBuy => "Puts Buy Quantity",
            AlertKind::CallsNet => "Calls Net Quantity",
            AlertKind::PutsNet => "Puts Net Quantity",
        }
    }

    pub fn category(&self) -> AlertCategory {
        match self {
            AlertKind::MtmAbove | AlertKind::MtmBelow => AlertCategory::Mtm,
            AlertKind::RoiAbove | AlertKind::RoiBelow => AlertCategory::Roi,
            AlertKind::MarginAbove => AlertCategory::Margin,
            _ => AlertCategory::Quantity,
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rule that fired for one user. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertEvent {
    pub user_alias: String,
    pub kind: AlertKind,
    pub threshold: f64,
    pub actual_value: f64,
    pub triggered_at: DateTime<Local>,
}

impl AlertEvent {
    pub fn new(user_alias: impl Into<String>, kind: AlertKind, threshold: f64, actual_value: f64) -> Self {
        Self {
            user_alias: user_alias.into(),
            kind,
            threshold,
            actual_value,
            triggered_at: Local::now(),
        }
    }

    pub fn metric_name(&self) -> &'static str {
        self.kind.metric_name()
    }

    pub fn formatted_threshold(&self) -> String {
        self.kind.category().format_value(self.threshold)
    }

    pub fn formatted_actual(&self) -> String {
        self.kind.category().format_value(self.actual_value)
    }

    /// Message text handed to the notifier
    pub fn format_message(&self) -> String {
        let category = self.kind.category();
        format!(
            "{} {}\nUser Alias: {}\nMetric: {}\nThreshold: {}\nActual: {}",
            category.emoji(),
            category.label(),
            self.user_alias,
            self.metric_name(),
            self.formatted_threshold(),
            self.formatted_actual()
        )
    }
}

/// `₹` amount with thousands separators and two decimals, e.g. `₹-12,345.60`
pub fn format_rupees(value: f64) -> String {
    let fixed = format!("{:.2}", value.abs());
    let (int_part, frac_part) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));

    let sign = if value < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("₹{sign}{}.{frac_part}", group_thousands(int_part))
}

/// Insert `,` every three digits from the right
pub(crate) fn group_thousands(digits: &str) -> String {
    let bytes = digits.as_bytes();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, digit) in bytes.iter().enumerate() {
        if i > 0 && (bytes.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(*digit as char);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_rupees() {
        assert_eq!(format_rupees(0.0), "₹0.00");
        assert_eq!(format_rupees(999.999), "₹1,000.00");
        assert_eq!(format_rupees(1234567.891), "₹1,234,567.89");
        assert_eq!(format_rupees(-7250.5), "₹-7,250.50");
        assert_eq!(format_rupees(-0.001), "₹0.00");
    }

    #[test]
    fn test_value_formats_per_category() {
        assert_eq!(AlertCategory::Margin.format_value(85.26), "85.3%");
        assert_eq!(AlertCategory::Roi.format_value(-5.0), "-5.00%");
        assert_eq!(AlertCategory::Quantity.format_value(-750.0), "-750");
        assert_eq!(AlertCategory::Mtm.format_value(25000.0), "₹25,000.00");
    }

    #[test]
    fn test_format_message_layout() {
        let event = AlertEvent::new("SUNNY", AlertKind::MtmBelow, -5000.0, -7250.5);
        assert_eq!(
            event.format_message(),
            "📈 MTM ALERT\nUser Alias: SUNNY\nMetric: MTM Below Threshold\nThreshold: ₹-5,000.00\nActual: ₹-7,250.50"
        );

        let event = AlertEvent::new("SUNNY", AlertKind::MarginAbove, 85.0, 91.234);
        assert_eq!(
            event.format_message(),
            "⚠️ MARGIN ALERT\nUser Alias: SUNNY\nMetric: Margin Utilization\nThreshold: 85.0%\nActual: 91.2%"
        );

        let event = AlertEvent::new("RAVI", AlertKind::PutsNet, 500.0, -900.0);
        assert!(event.format_message().starts_with("📊 QUANTITY ALERT\n"));
        assert!(event.format_message().ends_with("Threshold: 500\nActual: -900"));
    }

    #[test]
    fn test_kind_serializes_as_snake_case_name() {
        for kind in AlertKind::ALL {
            let json = serde_json::to_string(&kind).unwrap();
            assert_eq!(json, format!("\"{}\"", kind.as_str()));
        }
    }
}
