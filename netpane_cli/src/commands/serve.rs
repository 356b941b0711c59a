//! Serve command: run the inspector server

use crate::config::Config;
use crate::inspector::{find_inspector_port, start_server, InspectorMode, PanelStore};
use crate::panel::Panel;
use anyhow::{Context, Result};
use console::style;
use std::sync::Arc;

pub async fn run(port: Option<u16>) -> Result<()> {
    let config = Config::load()?;
    let preferred = port.unwrap_or(config.inspector_port);

    let port = match find_inspector_port(preferred).await? {
        InspectorMode::Server(port) => port,
        InspectorMode::Existing(port) => {
            anyhow::bail!(
                "A netpane inspector is already running on port {}. Push captures to it with: netpane push <HAR> --port {}",
                port,
                port
            );
        }
    };

    let panel = Panel::new(config.default_filter, config.default_tab);
    let store = Arc::new(PanelStore::new(panel, config.retry_policy()));
    let server = start_server(port, store).await?;

    println!();
    println!(
        "  {} {}",
        style("Inspector:").dim(),
        style(format!("http://127.0.0.1:{}", port)).green().bold()
    );
    println!(
        "  {} {}",
        style("Events:").dim(),
        style(format!("ws://127.0.0.1:{}/ws", port)).cyan()
    );
    println!();
    println!("  {}", style("Press Ctrl+C to stop").dim());

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl+C")?;

    tracing::info!("Shutting down inspector");
    server.abort();
    Ok(())
}
