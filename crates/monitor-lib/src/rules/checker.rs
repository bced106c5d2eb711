//! Threshold evaluation against position summaries

use super::cooldown::{CooldownConfig, CooldownRegistry};
use super::event::{AlertEvent, AlertKind};
use super::thresholds::{thresholds_for, ThresholdMap, UserThresholds};
use crate::models::OptionsPositionSummary;
use crate::observability::{MonitorMetrics, StructuredLogger};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::debug;

/// Evaluates every enabled rule and gates the results through the cooldown registry
pub struct AlertChecker {
    cooldowns: CooldownRegistry,
    metrics: MonitorMetrics,
    logger: StructuredLogger,
}

impl AlertChecker {
    pub fn new(config: CooldownConfig, logger: StructuredLogger) -> Self {
        Self {
            cooldowns: CooldownRegistry::new(config),
            metrics: MonitorMetrics::new(),
            logger,
        }
    }

    /// Rules that currently fire for one user, before cooldown
    pub fn evaluate(summary: &OptionsPositionSummary, thresholds: &UserThresholds) -> Vec<AlertEvent> {
        let alias = summary.user_alias.as_str();
        let mut alerts = Vec::new();
        let mut fire = |kind: AlertKind, threshold: f64, actual: f64| {
            alerts.push(AlertEvent::new(alias, kind, threshold, actual));
        };

        let mtm = summary.live_pnl;
        if let Some(t) = thresholds.mtm_above {
            if mtm > t {
                fire(AlertKind::MtmAbove, t, mtm);
            }
        }
        if let Some(t) = thresholds.mtm_below {
            if mtm < t {
                fire(AlertKind::MtmBelow, t, mtm);
            }
        }

        let roi = summary.roi_on_utilized();
        if let Some(t) = thresholds.roi_above {
            if roi > t {
                fire(AlertKind::RoiAbove, t, roi);
            }
        }
        if let Some(t) = thresholds.roi_below {
            if roi < -t {
                fire(AlertKind::RoiBelow, -t, roi);
            }
        }

        if let Some(t) = thresholds.margin_percent {
            let utilization = summary.margin_utilization();
            if utilization > t {
                fire(AlertKind::MarginAbove, t, utilization);
            }
        }

        // (rule, quantity, compare magnitude)
        let quantities = [
            (AlertKind::CallsSell, summary.call_sell_qty, true),
            (AlertKind::PutsSell, summary.put_sell_qty, true),
            (AlertKind::CallsBuy, summary.call_buy_qty, false),
            (AlertKind::PutsBuy, summary.put_buy_qty, false),
            (AlertKind::CallsNet, summary.calls_net, true),
            (AlertKind::PutsNet, summary.puts_net, true),
        ];
        for (kind, quantity, magnitude) in quantities {
            let Some(t) = thresholds.get(kind) else {
                continue;
            };
            let compared = (if magnitude { quantity.abs() } else { quantity }) as f64;
            if compared > t {
                fire(kind, t, quantity as f64);
            }
        }

        alerts
    }

    /// Evaluate all summaries and keep only alerts outside their cooldown
    pub fn check_all(
        &mut self,
        summaries: &[OptionsPositionSummary],
        thresholds: &ThresholdMap,
    ) -> Vec<AlertEvent> {
        self.check_all_at(summaries, thresholds, Instant::now())
    }

    pub fn check_all_at(
        &mut self,
        summaries: &[OptionsPositionSummary],
        thresholds: &ThresholdMap,
        now: Instant,
    ) -> Vec<AlertEvent> {
        let mut emitted = Vec::new();

        for summary in summaries {
            let Some(user_thresholds) = thresholds_for(thresholds, &summary.user_alias) else {
                continue;
            };

            for alert in Self::evaluate(summary, user_thresholds) {
                match self.cooldowns.try_fire_at(&alert.user_alias, alert.kind, now) {
                    Ok(()) => {
                        self.metrics.inc_alert_emitted(alert.kind.as_str());
                        self.logger.log_alert_emitted(
                            &alert.user_alias,
                            alert.kind.as_str(),
                            &alert.formatted_actual(),
                            &alert.formatted_threshold(),
                        );
                        emitted.push(alert);
                    }
                    Err(remaining) => {
                        self.metrics.inc_alert_suppressed(alert.kind.as_str());
                        self.logger.log_alert_suppressed(
                            &alert.user_alias,
                            alert.kind.as_str(),
                            remaining.as_secs(),
                        );
                    }
                }
            }
        }

        if !emitted.is_empty() {
            debug!(count = emitted.len(), "Position alerts emitted");
        }
        emitted
    }

    /// Forget cooldowns for one user, or for everyone
    pub fn clear_cooldowns(&mut self, user: Option<&str>) {
        match user {
            Some(user) => {
                self.cooldowns.clear_user(user);
            }
            None => self.cooldowns.clear_all(),
        }
    }

    /// Seconds of cooldown left per rule for a user
    pub fn cooldown_status(&self, user: &str) -> BTreeMap<String, u64> {
        self.cooldowns
            .remaining(user)
            .into_iter()
            .map(|(kind, remaining)| (kind.as_str().to_string(), remaining.as_secs()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn summary() -> OptionsPositionSummary {
        let mut summary = OptionsPositionSummary::flat("FZ20267", "SUNNY");
        summary.live_pnl = -6_000.0;
        summary.utilized_margin = 100_000.0;
        summary.available_margin = 20_000.0;
        summary.call_sell_qty = -750;
        summary.call_buy_qty = 150;
        summary.calls_net = -600;
        summary
    }

    fn kinds(alerts: &[AlertEvent]) -> Vec<AlertKind> {
        alerts.iter().map(|a| a.kind).collect()
    }

    fn checker() -> AlertChecker {
        AlertChecker::new(CooldownConfig::default(), StructuredLogger::new("test"))
    }

    #[test]
    fn test_mtm_rules() {
        let thresholds = UserThresholds::default()
            .with(AlertKind::MtmAbove, 10_000.0)
            .with(AlertKind::MtmBelow, -5_000.0);

        let alerts = AlertChecker::evaluate(&summary(), &thresholds);
        assert_eq!(kinds(&alerts), vec![AlertKind::MtmBelow]);
        assert_eq!(alerts[0].threshold, -5_000.0);
        assert_eq!(alerts[0].actual_value, -6_000.0);
    }

    #[test]
    fn test_roi_below_uses_negated_threshold() {
        // ROI is -6%
        let thresholds = UserThresholds::default()
            .with(AlertKind::RoiBelow, 5.0)
            .with(AlertKind::RoiAbove, 1.0);

        let alerts = AlertChecker::evaluate(&summary(), &thresholds);
        assert_eq!(kinds(&alerts), vec![AlertKind::RoiBelow]);
        assert_eq!(alerts[0].threshold, -5.0);
        assert!((alerts[0].actual_value + 6.0).abs() < 1e-9);
        assert!(alerts[0].format_message().contains("Threshold: -5.00%"));
    }

    #[test]
    fn test_margin_rule() {
        // 100k of 120k utilised = 83.3%
        let thresholds = UserThresholds::default().with(AlertKind::MarginAbove, 80.0);
        let alerts = AlertChecker::evaluate(&summary(), &thresholds);
        assert_eq!(kinds(&alerts), vec![AlertKind::MarginAbove]);
        assert!(alerts[0].format_message().contains("Actual: 83.3%"));

        let thresholds = UserThresholds::default().with(AlertKind::MarginAbove, 85.0);
        assert!(AlertChecker::evaluate(&summary(), &thresholds).is_empty());
    }

    #[test]
    fn test_quantity_rules_compare_magnitude_or_raw() {
        let thresholds = UserThresholds::default()
            .with(AlertKind::CallsSell, 500.0)
            .with(AlertKind::CallsNet, 500.0)
            .with(AlertKind::CallsBuy, 100.0)
            .with(AlertKind::PutsSell, 0.0);

        let alerts = AlertChecker::evaluate(&summary(), &thresholds);
        assert_eq!(
            kinds(&alerts),
            vec![AlertKind::CallsSell, AlertKind::CallsBuy, AlertKind::CallsNet]
        );
        // Actual keeps its sign
        assert_eq!(alerts[0].actual_value, -750.0);
    }

    #[test]
    fn test_disabled_rules_never_fire() {
        assert!(AlertChecker::evaluate(&summary(), &UserThresholds::default()).is_empty());
    }

    #[test]
    fn test_cooldown_gates_repeat_firings() {
        let mut checker = checker();
        let mut map = ThresholdMap::new();
        map.insert(
            "SUNNY".to_string(),
            UserThresholds::default().with(AlertKind::MtmBelow, -5_000.0),
        );
        let summaries = vec![summary()];
        let start = Instant::now();

        assert_eq!(checker.check_all_at(&summaries, &map, start).len(), 1);
        assert!(checker
            .check_all_at(&summaries, &map, start + Duration::from_secs(30))
            .is_empty());
        assert_eq!(
            checker
                .check_all_at(&summaries, &map, start + Duration::from_secs(300))
                .len(),
            1
        );
    }

    #[test]
    fn test_users_without_thresholds_are_skipped() {
        let mut checker = checker();
        let mut map = ThresholdMap::new();
        map.insert(
            "RAVI".to_string(),
            UserThresholds::default().with(AlertKind::MtmBelow, 0.0),
        );
        assert!(checker.check_all(&[summary()], &map).is_empty());
    }

    #[test]
    fn test_clear_cooldowns_and_status() {
        let mut checker = checker();
        let mut map = ThresholdMap::new();
        map.insert(
            "SUNNY".to_string(),
            UserThresholds::default().with(AlertKind::MtmBelow, -5_000.0),
        );

        assert_eq!(checker.check_all(&[summary()], &map).len(), 1);
        let status = checker.cooldown_status("SUNNY");
        assert!(status["mtm_below"] > 290);

        checker.clear_cooldowns(Some("SUNNY"));
        assert!(checker.cooldown_status("SUNNY").is_empty());
        assert_eq!(checker.check_all(&[summary()], &map).len(), 1);

        checker.clear_cooldowns(None);
        assert_eq!(checker.check_all(&[summary()], &map).len(), 1);
    }
}
