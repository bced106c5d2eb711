//! Grid log monitoring
//!
//! This module provides:
//! - Parsing of grid log rows, including split ATTENTION rows
//! - An incremental tailer following the current day's log file
//! - Alert formatting with condensed issue text

mod format;
mod parser;
mod tailer;

use std::path::{Path, PathBuf};

pub use format::{display_time, format_alert_message, shorten_issue};
pub use parser::{parse_line, GridLogEntry, GridLogFilter, GridLogParser, GridLogType};
pub use tailer::{log_path_for, GridLogStatus, GridLogTailer, GRID_LOG_FILE};

/// Configuration for grid log monitoring
#[derive(Debug, Clone)]
pub struct GridLogConfig {
    /// Directory holding one `DD-Mon-YYYY` folder per day
    pub base_path: PathBuf,
    pub enabled_types: Vec<GridLogType>,
    /// Rows containing any of these (case-insensitive) are ignored
    pub filter_keywords: Vec<String>,
}

impl GridLogConfig {
    pub fn new(base_path: impl AsRef<Path>) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            enabled_types: GridLogType::ALL.to_vec(),
            filter_keywords: Vec::new(),
        }
    }

    pub fn with_enabled_types(mut self, types: impl IntoIterator<Item = GridLogType>) -> Self {
        self.enabled_types = types.into_iter().collect();
        self
    }

    pub fn with_filter_keywords(mut self, keywords: Vec<String>) -> Self {
        self.filter_keywords = keywords;
        self
    }

    pub fn filter(&self) -> GridLogFilter {
        GridLogFilter::new(
            self.enabled_types.iter().copied(),
            self.filter_keywords.clone(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_filter() {
        let config = GridLogConfig::new("/logs")
            .with_enabled_types([GridLogType::Error])
            .with_filter_keywords(vec!["Heartbeat".to_string()]);

        let filter = config.filter();
        assert!(filter.enabled_types.contains(&GridLogType::Error));
        assert!(!filter.enabled_types.contains(&GridLogType::Warning));
        assert_eq!(filter.keywords, vec!["heartbeat".to_string()]);
    }
}
