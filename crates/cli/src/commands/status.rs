//! Daemon status and health commands

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use crate::client::ApiClient;
use crate::output::{
    color_status, color_usage, format_uptime, print_json, print_rows, print_warning, FieldRow,
    OutputFormat,
};

/// Row for the component health table
#[derive(Tabled)]
struct ComponentRow {
    #[tabled(rename = "Component")]
    name: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Message")]
    message: String,
}

/// Show queue and rate limit status
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let status = client.status().await?;

    match format {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Table => {
            let rate = &status.rate_limit;
            println!("{}", "Position Monitor".bold());
            println!("{}", "=".repeat(40));

            let rows = vec![
                FieldRow::new("Version", &status.version),
                FieldRow::new("Uptime", format_uptime(status.uptime_secs)),
                FieldRow::new(
                    "Sender",
                    color_status(if rate.running { "running" } else { "stopped" }),
                ),
                FieldRow::new("Pending", status.pending),
                FieldRow::new("Queue depth", rate.queue_depth),
                FieldRow::new(
                    "Sent in window",
                    color_usage(rate.sent_in_window, rate.rate_limit_max),
                ),
                FieldRow::new("Window", format!("{:.0}s", rate.window_secs)),
                FieldRow::new("Provider limit", rate.provider_limit),
                FieldRow::new("Combine threshold", rate.combine_threshold),
                FieldRow::new("Delivered", rate.delivered_total),
                FieldRow::new("Failed", rate.failed_total),
                FieldRow::new("Combined", rate.combined_total),
            ];
            print_rows(rows);

            if rate.queue_depth >= rate.combine_threshold {
                print_warning("Backlog will be combined at the next rate limit slot");
            }
        }
    }

    Ok(())
}

/// Show per-component health
pub async fn show_health(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let health = client.health().await?;

    match format {
        OutputFormat::Json => print_json(&health)?,
        OutputFormat::Table => {
            let overall = serde_json::to_value(health.status)?
                .as_str()
                .unwrap_or_default()
                .to_string();
            println!("Overall: {}", color_status(&overall));
            println!();

            let mut components: Vec<_> = health.components.into_iter().collect();
            components.sort_by(|a, b| a.0.cmp(&b.0));

            let rows = components
                .into_iter()
                .map(|(name, component)| {
                    let status = serde_json::to_value(component.status)
                        .ok()
                        .and_then(|v| v.as_str().map(str::to_string))
                        .unwrap_or_default();
                    ComponentRow {
                        name,
                        status: color_status(&status),
                        message: component.message.unwrap_or_else(|| "-".to_string()),
                    }
                })
                .collect();
            print_rows(rows);
        }
    }

    Ok(())
}
