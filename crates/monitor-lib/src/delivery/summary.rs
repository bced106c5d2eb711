//! Grouping keys and burst summaries
//!
//! Alert texts share a loose layout: a header line carrying the category and
//! an `@ HH:MM:SS` stamp, an identity line (`User: ...` / `User Alias: ...`),
//! then `Field: value` lines. Grouping ignores the stamp and everything after
//! the identity line.

use chrono::{DateTime, Local};
use regex::Regex;
use std::sync::OnceLock;

/// Longest fallback bullet, in characters
const FALLBACK_BULLET_CHARS: usize = 80;

const DIVIDER_WIDTH: usize = 28;

fn timestamp_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\s*@\s*\d{1,2}:\d{2}:\d{2}(?:[:.]\d+)?").expect("timestamp pattern is valid")
    })
}

/// One message held by the burst buffer
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedMessage {
    pub arrived_at: DateTime<Local>,
    pub text: String,
}

impl BufferedMessage {
    pub fn new(text: impl Into<String>, arrived_at: DateTime<Local>) -> Self {
        Self {
            arrived_at,
            text: text.into(),
        }
    }
}

/// First line with its `@ HH:MM:SS` stamp removed
pub fn header_of(message: &str) -> String {
    let first = message.lines().next().unwrap_or("").trim();
    timestamp_pattern().replace_all(first, "").trim().to_string()
}

/// Second line, the entity the alert is about
pub fn identity_of(message: &str) -> &str {
    message.lines().nth(1).map(str::trim).unwrap_or("")
}

/// Grouping key: `"{header} | {identity}"`
pub fn fingerprint(message: &str) -> String {
    format!("{} | {}", header_of(message), identity_of(message))
}

/// Value of the first `Name: value` line, if present and non-empty
fn field<'a>(message: &'a str, name: &str) -> Option<&'a str> {
    message.lines().skip(1).find_map(|line| {
        let rest = line.trim().strip_prefix(name)?;
        let value = rest.strip_prefix(':')?.trim();
        (!value.is_empty()).then_some(value)
    })
}

type Extractor = fn(&str) -> Option<String>;

/// Bullet extractors, tried in order
const BULLET_RULES: &[(&str, Extractor)] = &[
    ("Portfolio", portfolio_bullet),
    ("Issue", issue_bullet),
    ("Metric", metric_bullet),
];

fn portfolio_bullet(message: &str) -> Option<String> {
    let portfolio = field(message, "Portfolio")?;
    Some(match field(message, "Issue") {
        Some(issue) => format!("{portfolio}: {issue}"),
        None => portfolio.to_string(),
    })
}

fn issue_bullet(message: &str) -> Option<String> {
    field(message, "Issue").map(str::to_string)
}

fn metric_bullet(message: &str) -> Option<String> {
    let metric = field(message, "Metric")?;
    let mut bullet = match field(message, "Actual") {
        Some(actual) => format!("{metric}: {actual}"),
        None => metric.to_string(),
    };
    if let Some(threshold) = field(message, "Threshold") {
        bullet.push_str(&format!(" (threshold {threshold})"));
    }
    Some(bullet)
}

fn fallback_bullet(message: &str) -> String {
    let last = message
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .unwrap_or("");

    if last.chars().count() > FALLBACK_BULLET_CHARS {
        let cut: String = last.chars().take(FALLBACK_BULLET_CHARS - 1).collect();
        format!("{cut}…")
    } else {
        last.to_string()
    }
}

/// Short description of one message for a summary bullet
pub fn bullet_text(message: &str) -> String {
    BULLET_RULES
        .iter()
        .find_map(|(_, extract)| extract(message))
        .unwrap_or_else(|| fallback_bullet(message))
}

/// Render a flushed group. A single message passes through unchanged.
pub fn summarize(entries: &[BufferedMessage]) -> Option<String> {
    let (first, last) = match entries {
        [] => return None,
        [only] => return Some(only.text.clone()),
        [first, .., last] => (first, last),
    };

    let start = first.arrived_at.format("%H:%M:%S").to_string();
    let end = last.arrived_at.format("%H:%M:%S").to_string();
    let range = if start == end {
        start
    } else {
        format!("{start}–{end}")
    };

    let mut out = format!(
        "{} — {} alerts @ {}\n",
        header_of(&first.text),
        entries.len(),
        range
    );

    let identity = identity_of(&first.text);
    if !identity.is_empty() {
        out.push_str(identity);
        out.push('\n');
    }
    out.push_str(&"─".repeat(DIVIDER_WIDTH));

    for entry in entries {
        out.push_str("\n• ");
        out.push_str(&bullet_text(&entry.text));
    }

    Some(out)
}
