//! Position Monitor CLI
//!
//! A command-line tool for inspecting the monitor daemon, injecting
//! messages, checking Telegram credentials and replaying grid logs.

mod client;
mod commands;
mod config;
mod output;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{parse_log, send, status, verify};
use monitor_lib::gridlog::GridLogType;
use std::path::PathBuf;

/// Position Monitor CLI
#[derive(Parser)]
#[command(name = "pmon")]
#[command(author, version, about = "CLI for the Position Monitor", long_about = None)]
pub struct Cli {
    /// Daemon API URL (can also be set via PMON_API_URL env var)
    #[arg(long, env = "PMON_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show queue and rate limit status
    Status,

    /// Show component health
    Health,

    /// Queue a message on the daemon
    Send {
        /// Message text
        text: String,

        /// Skip burst deduplication
        #[arg(long)]
        urgent: bool,
    },

    /// Check the Telegram bot credentials directly
    Verify {
        /// Bot token
        #[arg(long, env = "TELEGRAM_BOT_TOKEN")]
        bot_token: Option<String>,

        /// Target chat id
        #[arg(long, env = "TELEGRAM_CHAT_ID")]
        chat_id: Option<String>,

        /// Also send the test message
        #[arg(long)]
        send_test: bool,
    },

    /// Parse a grid log file and print the alerts it would raise
    ParseLog {
        /// Path to a GridLog.csv file
        file: PathBuf,

        /// Row types to report (default: all)
        #[arg(long = "type", value_parser = parse_log_type)]
        types: Vec<GridLogType>,

        /// Drop rows containing this text (repeatable)
        #[arg(long = "exclude")]
        keywords: Vec<String>,
    },
}

fn parse_log_type(raw: &str) -> Result<GridLogType, String> {
    raw.parse()
}

const DEFAULT_API_URL: &str = "http://localhost:8080";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = config::Config::load().unwrap_or_else(|e| {
        output::print_error(&format!("Ignoring CLI config: {e:#}"));
        config::Config::default()
    });

    let api_url = cli
        .api_url
        .clone()
        .or_else(|| config.api_url.clone())
        .unwrap_or_else(|| DEFAULT_API_URL.to_string());

    match cli.command {
        Commands::Status => {
            let client = client::ApiClient::new(&api_url)?;
            status::show_status(&client, cli.format).await?;
        }
        Commands::Health => {
            let client = client::ApiClient::new(&api_url)?;
            status::show_health(&client, cli.format).await?;
        }
        Commands::Send { text, urgent } => {
            let client = client::ApiClient::new(&api_url)?;
            send::send_message(&client, &text, urgent, cli.format).await?;
        }
        Commands::Verify {
            bot_token,
            chat_id,
            send_test,
        } => {
            verify::verify(config.telegram(bot_token, chat_id), send_test, cli.format).await?;
        }
        Commands::ParseLog {
            file,
            types,
            keywords,
        } => {
            parse_log::parse_log(&file, types, keywords, cli.format)?;
        }
    }

    Ok(())
}
