//! Direct Telegram credential check

use anyhow::{Context, Result};
use chrono::Local;
use monitor_lib::delivery::{test_message, MessageTransport, TelegramConfig, TelegramTransport};
use serde::Serialize;

use crate::output::{print_info, print_json, print_success, OutputFormat};

#[derive(Serialize)]
struct VerifyReport {
    bot: String,
    test_message_sent: bool,
}

/// Check the bot identity and optionally send the test message
pub async fn verify(telegram: TelegramConfig, send_test: bool, format: OutputFormat) -> Result<()> {
    if !telegram.is_configured() {
        print_info("Set --bot-token/--chat-id, TELEGRAM_BOT_TOKEN/TELEGRAM_CHAT_ID or the CLI config file");
        anyhow::bail!("Telegram credentials are not configured");
    }

    let transport = TelegramTransport::new(telegram).context("Failed to build Telegram client")?;
    let identity = transport
        .identity()
        .await
        .context("Telegram rejected the bot credentials")?;

    if send_test {
        transport
            .deliver(&test_message(Local::now()))
            .await
            .context("Failed to send the test message")?;
    }

    match format {
        OutputFormat::Json => print_json(&VerifyReport {
            bot: identity.username,
            test_message_sent: send_test,
        })?,
        OutputFormat::Table => {
            print_success(&format!("Connected as @{}", identity.username));
            if send_test {
                print_success("Test message sent");
            }
        }
    }

    Ok(())
}
