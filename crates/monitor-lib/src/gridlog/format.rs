//! Grid log alert text

use super::parser::GridLogEntry;
use crate::rules::group_thousands;
use regex::Regex;
use std::sync::OnceLock;

const MAX_ISSUE_CHARS: usize = 200;
const TRUNCATED_CHARS: usize = 197;
const MIN_WORD_CUT: usize = 150;

struct IssuePatterns {
    strategy_tag: Regex,
    stopped_portfolio: Regex,
    retry_seconds: Regex,
    leg_id: Regex,
    shortfall: Regex,
    reason: Regex,
}

fn patterns() -> &'static IssuePatterns {
    static PATTERNS: OnceLock<IssuePatterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let re = |pattern: &str| Regex::new(pattern).expect("valid issue regex");
        IssuePatterns {
            strategy_tag: re(r"Strategy Tag[:\s]+(\S+)"),
            stopped_portfolio: re(r"Option Portfolio (.+?) Execution Stopped"),
            retry_seconds: re(r"Retrying in (\d+) Seconds"),
            leg_id: re(r"Leg ID[:\s]+(\S+)"),
            shortfall: re(r"Margin Shortfall[:\[\s]+(?:INR\s*)?([\d.]+)"),
            reason: re(r"Reason[:\s]+(.{0,80})"),
        }
    })
}

fn capture<'a>(re: &Regex, text: &'a str) -> Option<&'a str> {
    re.captures(text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
}

fn leg_id(message: &str) -> Option<String> {
    capture(&patterns().leg_id, message).map(|leg| leg.trim_end_matches(';').to_string())
}

fn rejection_reason(message: &str) -> String {
    let p = patterns();
    if message.contains("Margin Exceeds") || message.contains("Margin Shortfall") {
        let shortfall = capture(&p.shortfall, message)
            .and_then(|raw| raw.parse::<f64>().ok())
            .map(|value| format!(" ₹{}", group_thousands(&format!("{:.0}", value.abs()))))
            .unwrap_or_default();
        return format!("Insufficient Margin (Shortfall{shortfall})");
    }

    capture(&p.reason, message)
        .map(|reason| reason.trim().trim_end_matches('.').to_string())
        .filter(|reason| !reason.is_empty())
        .unwrap_or_else(|| "Unknown".to_string())
}

/// Condense a verbose grid log message into a short, readable issue line
pub fn shorten_issue(message: &str) -> String {
    let p = patterns();

    if message.contains("Strategy Tag:") && message.contains("not found") {
        let tag = capture(&p.strategy_tag, message).unwrap_or("?");
        let portfolio = capture(&p.stopped_portfolio, message)
            .map(|name| format!(" | Portfolio: {name}"))
            .unwrap_or_default();
        return format!("Strategy Tag {tag} not found{portfolio} — Execution Stopped");
    }

    if message.contains("Order Rejected and Retrying") {
        let retry = capture(&p.retry_seconds, message).unwrap_or("?");
        let mut lines = vec![format!("Order Rejected — {}", rejection_reason(message))];
        if let Some(leg) = leg_id(message) {
            lines.push(format!("Leg ID: {leg}"));
        }
        lines.push(format!("Auto-retrying in {retry}s"));
        return lines.join("\n");
    }

    if message.contains("Order REJECTED") {
        let mut lines = vec![format!("Order REJECTED (Final) — {}", rejection_reason(message))];
        if let Some(leg) = leg_id(message) {
            lines.push(format!("Leg ID: {leg}"));
        }
        return lines.join("\n");
    }

    if message.contains("already under Exit Execution") {
        return "Portfolio already under exit execution — no action needed".to_string();
    }

    if message.contains("Broker Feed Disconnected") || message.contains("feed disconnected") {
        return "Broker feed disconnected — attempting reconnect".to_string();
    }

    if message.contains("Execution Stopped") {
        return match capture(&p.stopped_portfolio, message) {
            Some(name) => format!("Portfolio '{name}' execution stopped"),
            None => "Portfolio execution stopped".to_string(),
        };
    }

    truncate_issue(message)
}

fn truncate_issue(message: &str) -> String {
    if message.chars().count() <= MAX_ISSUE_CHARS {
        return message.to_string();
    }

    let mut cut: String = message.chars().take(TRUNCATED_CHARS).collect();
    if let Some(space) = cut.rfind(' ') {
        if cut[..space].chars().count() > MIN_WORD_CUT {
            cut.truncate(space);
        }
    }
    cut.push_str("...");
    cut
}

/// `HH:MM:SS:mmm` is shown without milliseconds
pub fn display_time(timestamp: &str) -> &str {
    if timestamp.matches(':').count() == 3 {
        timestamp
            .rsplit_once(':')
            .map(|(time, _)| time)
            .unwrap_or(timestamp)
    } else {
        timestamp
    }
}

/// Telegram text for a grid log entry. `user_alias` is the alias resolved
/// for the entry's user id, if any.
pub fn format_alert_message(entry: &GridLogEntry, user_alias: Option<&str>) -> String {
    let mut lines = vec![format!(
        "{} {} @ {}",
        entry.log_type.emoji(),
        entry.log_type,
        display_time(&entry.timestamp)
    )];

    let alias = user_alias.filter(|alias| !alias.is_empty());
    match (entry.user_id.is_empty(), alias) {
        (false, Some(alias)) => lines.push(format!("User: {} ({alias})", entry.user_id)),
        (false, None) => lines.push(format!("User: {}", entry.user_id)),
        (true, Some(alias)) => lines.push(format!("User: {alias}")),
        (true, None) => {}
    }

    if !entry.strategy_tag.is_empty() {
        lines.push(format!("Strategy: {}", entry.strategy_tag));
    }
    if !entry.portfolio.is_empty() {
        lines.push(format!("Portfolio: {}", entry.portfolio));
    }
    lines.push(format!("Issue: {}", shorten_issue(&entry.message)));

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gridlog::parser::GridLogType;

    fn entry(message: &str) -> GridLogEntry {
        GridLogEntry {
            log_type: GridLogType::Attention,
            timestamp: "13:48:12:331".to_string(),
            message: message.to_string(),
            user_id: "FZ20267".to_string(),
            strategy_tag: "RF-20-NIFTY".to_string(),
            portfolio: "HTTP_SHORT11_7".to_string(),
        }
    }

    #[test]
    fn test_retrying_rejection_with_margin_shortfall() {
        let message = "Order Rejected and Retrying in 5 Seconds. Leg ID: 3; Reason: Margin Exceeds, Margin Shortfall:[INR 18704.22]";
        assert_eq!(
            shorten_issue(message),
            "Order Rejected — Insufficient Margin (Shortfall ₹18,704)\nLeg ID: 3\nAuto-retrying in 5s"
        );
    }

    #[test]
    fn test_retrying_rejection_with_reason() {
        let message = "Order Rejected and Retrying in 10 Seconds. Reason: Price out of band.";
        assert_eq!(
            shorten_issue(message),
            "Order Rejected — Price out of band\nAuto-retrying in 10s"
        );
    }

    #[test]
    fn test_final_rejection() {
        let message = "Order REJECTED. Leg ID: 7 Reason: RMS blocked";
        assert_eq!(
            shorten_issue(message),
            "Order REJECTED (Final) — RMS blocked\nLeg ID: 7"
        );
        assert_eq!(
            shorten_issue("Order REJECTED by exchange"),
            "Order REJECTED (Final) — Unknown"
        );
    }

    #[test]
    fn test_strategy_tag_not_found() {
        let message = "Strategy Tag: RF-99 not found. Option Portfolio HTTP_9 Execution Stopped";
        assert_eq!(
            shorten_issue(message),
            "Strategy Tag RF-99 not found | Portfolio: HTTP_9 — Execution Stopped"
        );
    }

    #[test]
    fn test_canned_issues() {
        assert_eq!(
            shorten_issue("Portfolio is already under Exit Execution"),
            "Portfolio already under exit execution — no action needed"
        );
        assert_eq!(
            shorten_issue("Broker Feed Disconnected for Zerodha"),
            "Broker feed disconnected — attempting reconnect"
        );
        assert_eq!(
            shorten_issue("Option Portfolio HTTP_1 Execution Stopped"),
            "Portfolio 'HTTP_1' execution stopped"
        );
        assert_eq!(
            shorten_issue("Execution Stopped"),
            "Portfolio execution stopped"
        );
    }

    #[test]
    fn test_long_messages_truncate_on_word_boundary() {
        let message = "word ".repeat(60);
        let short = shorten_issue(&message);
        assert!(short.ends_with("..."));
        assert!(short.chars().count() <= 200);
        assert!(!short.trim_end_matches("...").ends_with(' '));

        assert_eq!(shorten_issue("short message"), "short message");
    }

    #[test]
    fn test_display_time_drops_millis() {
        assert_eq!(display_time("13:48:12:331"), "13:48:12");
        assert_eq!(display_time("13:48:12"), "13:48:12");
    }

    #[test]
    fn test_format_alert_message_layout() {
        let text = format_alert_message(&entry("Order REJECTED. Reason: RMS"), Some("SUNNY"));
        assert_eq!(
            text,
            "⚠️ ATTENTION @ 13:48:12\nUser: FZ20267 (SUNNY)\nStrategy: RF-20-NIFTY\nPortfolio: HTTP_SHORT11_7\nIssue: Order REJECTED (Final) — RMS"
        );

        let mut bare = entry("Something odd");
        bare.log_type = GridLogType::Error;
        bare.strategy_tag.clear();
        let text = format_alert_message(&bare, None);
        assert!(text.starts_with("🚨 ERROR @ 13:48:12\nUser: FZ20267\nPortfolio:"));
        assert!(!text.contains("Strategy:"));
    }
}
