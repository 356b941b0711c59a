//! Push command: send a capture to a running inspector

use super::CaptureOptions;
use crate::config::Config;
use crate::inspector::InspectorClient;
use anyhow::Result;
use console::style;
use std::time::Duration;

/// How long to wait for the inspector to settle before reporting
const SETTLE_POLLS: u32 = 20;
const SETTLE_INTERVAL: Duration = Duration::from_millis(100);

pub async fn run(opts: CaptureOptions, port: Option<u16>) -> Result<()> {
    let config = Config::load()?;
    let port = port.unwrap_or(config.inspector_port);
    let capture = opts.load()?;

    let client = InspectorClient::new(port)?;
    if !client.is_inspector_alive().await {
        anyhow::bail!(
            "No netpane inspector on port {}. Start one with: netpane serve --port {}",
            port,
            port
        );
    }

    let page_url = capture.page_url().map(str::to_string);
    let event_count = capture.events.len();
    let entry_count = capture.har.entries.len();
    client
        .navigate(page_url.clone(), capture.events, capture.har.entries)
        .await?;

    println!(
        "Pushed {} requests and {} events from {} to {}",
        style(entry_count).cyan(),
        style(event_count).cyan(),
        opts.label(),
        style(client.inspector_url()).green()
    );

    // The inspector resolves the scope before loading; report once it settles
    let mut label = client.count_label().await?;
    for _ in 0..SETTLE_POLLS {
        tokio::time::sleep(SETTLE_INTERVAL).await;
        let next = client.count_label().await?;
        if next == label {
            break;
        }
        label = next;
    }

    println!(
        "{} {} {}",
        style("Inspector shows").dim(),
        style(label).bold(),
        style(format!("for {}", page_url.as_deref().unwrap_or("an unknown page"))).dim()
    );
    Ok(())
}
