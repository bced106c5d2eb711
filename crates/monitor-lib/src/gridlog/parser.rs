//! Grid log row parsing
//!
//! Rows look like `timestamp,type,message...,user_id,strategy_tag,portfolio`.
//! The message may itself contain commas, so the trailing three fields are
//! always taken from the right.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

const MIN_FIELDS: usize = 6;

/// Prefix of the continuation line carrying a split ATTENTION row's trailing fields
const CONTINUATION_PREFIX: &str = "No Action Required";

/// Log row types that produce alerts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GridLogType {
    Attention,
    Error,
    Warning,
}

impl GridLogType {
    pub const ALL: [GridLogType; 3] = [
        GridLogType::Attention,
        GridLogType::Error,
        GridLogType::Warning,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            GridLogType::Attention => "ATTENTION",
            GridLogType::Error => "ERROR",
            GridLogType::Warning => "WARNING",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            GridLogType::Error => "🚨",
            GridLogType::Warning => "⚡️",
            GridLogType::Attention => "⚠️",
        }
    }
}

impl fmt::Display for GridLogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GridLogType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "ATTENTION" => Ok(GridLogType::Attention),
            "ERROR" => Ok(GridLogType::Error),
            "WARNING" => Ok(GridLogType::Warning),
            other => Err(format!("unknown grid log type: {other}")),
        }
    }
}

/// One alert-worthy grid log row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridLogEntry {
    pub log_type: GridLogType,
    pub timestamp: String,
    pub message: String,
    pub user_id: String,
    pub strategy_tag: String,
    pub portfolio: String,
}

/// Which rows are reported
#[derive(Debug, Clone)]
pub struct GridLogFilter {
    pub enabled_types: HashSet<GridLogType>,
    /// Rows containing any of these (case-insensitive) are dropped
    pub keywords: Vec<String>,
}

impl Default for GridLogFilter {
    fn default() -> Self {
        Self {
            enabled_types: GridLogType::ALL.into_iter().collect(),
            keywords: Vec::new(),
        }
    }
}

impl GridLogFilter {
    pub fn new(enabled_types: impl IntoIterator<Item = GridLogType>, keywords: Vec<String>) -> Self {
        Self {
            enabled_types: enabled_types.into_iter().collect(),
            keywords: keywords
                .into_iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }

    fn matches_keyword(&self, line: &str) -> Option<&str> {
        if self.keywords.is_empty() {
            return None;
        }
        let lower = line.to_lowercase();
        self.keywords
            .iter()
            .find(|keyword| lower.contains(keyword.as_str()))
            .map(String::as_str)
    }
}

/// Parse one complete row. Header rows, unknown types, short rows and
/// filtered rows yield `None`.
pub fn parse_line(line: &str, filter: &GridLogFilter) -> Option<GridLogEntry> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let parts: Vec<&str> = line.split(',').collect();
    if parts.len() < MIN_FIELDS {
        return None;
    }

    let log_type: GridLogType = parts[1].parse().ok()?;
    if !filter.enabled_types.contains(&log_type) {
        return None;
    }
    if let Some(keyword) = filter.matches_keyword(line) {
        debug!(keyword = %keyword, "Filtered grid log row");
        return None;
    }

    let n = parts.len();
    Some(GridLogEntry {
        log_type,
        timestamp: parts[0].trim().to_string(),
        message: parts[2..n - 3].join(",").trim().to_string(),
        user_id: parts[n - 3].trim().to_string(),
        strategy_tag: parts[n - 2].trim().to_string(),
        portfolio: parts[n - 1].trim().to_string(),
    })
}

/// Line-at-a-time parser that stitches split ATTENTION rows back together.
///
/// Some ATTENTION rows are written as the type and message on one line,
/// a blank line, then `No Action Required...,user,strategy,portfolio`.
#[derive(Debug, Default)]
pub struct GridLogParser {
    pending: Option<String>,
}

impl GridLogParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while waiting for a continuation line
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn feed(&mut self, line: &str, filter: &GridLogFilter) -> Option<GridLogEntry> {
        let stripped = line.trim();

        if let Some(partial) = self.pending.take() {
            if stripped.is_empty() {
                self.pending = Some(partial);
                return None;
            }
            if stripped.starts_with(CONTINUATION_PREFIX) {
                let parts: Vec<&str> = stripped.split(',').collect();
                if parts.len() < 4 {
                    return None;
                }
                let suffix = parts[parts.len() - 3..].join(",");
                let combined = format!("{},{}", partial.trim_end(), suffix);
                return parse_line(&combined, filter);
            }
            // Not a continuation: the partial is dropped and this line parsed normally
        }

        if stripped.is_empty() {
            return None;
        }

        let parts: Vec<&str> = stripped.split(',').collect();
        if parts.len() >= 2
            && parts[1].trim().eq_ignore_ascii_case("ATTENTION")
            && parts.len() < MIN_FIELDS
        {
            self.pending = Some(stripped.to_string());
            return None;
        }

        parse_line(stripped, filter)
    }

    /// Parse a whole chunk of text
    pub fn feed_all(&mut self, text: &str, filter: &GridLogFilter) -> Vec<GridLogEntry> {
        text.lines()
            .filter_map(|line| self.feed(line, filter))
            .collect()
    }
}
