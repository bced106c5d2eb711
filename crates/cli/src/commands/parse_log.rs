//! Offline grid log parsing

use anyhow::{Context, Result};
use colored::Colorize;
use monitor_lib::gridlog::{format_alert_message, GridLogEntry, GridLogFilter, GridLogParser, GridLogType};
use std::path::Path;

use crate::output::{print_json, print_warning, OutputFormat};

/// Parse a grid log file and return the alert-worthy rows
pub fn parse_file(
    path: &Path,
    types: Vec<GridLogType>,
    keywords: Vec<String>,
) -> Result<Vec<GridLogEntry>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let text = String::from_utf8_lossy(&bytes);

    let types = if types.is_empty() {
        GridLogType::ALL.to_vec()
    } else {
        types
    };
    let filter = GridLogFilter::new(types, keywords);

    Ok(GridLogParser::new().feed_all(&text, &filter))
}

/// Print each parsed row as the alert the daemon would send
pub fn parse_log(
    path: &Path,
    types: Vec<GridLogType>,
    keywords: Vec<String>,
    format: OutputFormat,
) -> Result<()> {
    let entries = parse_file(path, types, keywords)?;

    match format {
        OutputFormat::Json => print_json(&entries)?,
        OutputFormat::Table => {
            if entries.is_empty() {
                print_warning("No alert rows found");
                return Ok(());
            }
            for entry in &entries {
                println!("{}", format_alert_message(entry, None));
                println!("{}", "-".repeat(40).dimmed());
            }
            println!("\nTotal: {} alerts", entries.len());
        }
    }

    Ok(())
}
