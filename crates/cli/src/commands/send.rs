//! Message injection command

use anyhow::Result;

use crate::client::ApiClient;
use crate::output::{print_json, print_success, OutputFormat};

/// Queue a message on the daemon
pub async fn send_message(
    client: &ApiClient,
    text: &str,
    urgent: bool,
    format: OutputFormat,
) -> Result<()> {
    if text.trim().is_empty() {
        anyhow::bail!("Message text is empty");
    }

    let response = client.send_message(text, urgent).await?;

    match format {
        OutputFormat::Json => print_json(&response)?,
        OutputFormat::Table => {
            let route = if urgent { "send queue" } else { "burst buffer" };
            print_success(&format!(
                "Message accepted into the {} ({} pending)",
                route, response.pending
            ));
        }
    }

    Ok(())
}
