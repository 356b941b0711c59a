//! Port detection and binding logic for the inspector

use super::server::HealthResponse;
use anyhow::Result;
use netpane_common::constants::INSPECTOR_SERVICE;
use reqwest::Client;
use std::time::Duration;
use tokio::net::TcpListener;

/// Maximum number of ports to try before giving up
const MAX_PORT_ATTEMPTS: u16 = 10;

/// What was found while probing for an inspector port
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InspectorMode {
    /// Start a new inspector server on this port
    Server(u16),
    /// A netpane inspector already runs on this port
    Existing(u16),
}

impl InspectorMode {
    pub fn port(&self) -> u16 {
        match self {
            InspectorMode::Server(p) | InspectorMode::Existing(p) => *p,
        }
    }

    pub fn is_server(&self) -> bool {
        matches!(self, InspectorMode::Server(_))
    }
}

/// Result of checking a single port
enum PortCheckResult {
    /// Port is available for binding
    Available,
    /// Port has a netpane inspector running
    NetpaneInspector,
    /// Port is used by something else
    UsedByOther,
}

/// Check if a port has a netpane inspector running
async fn check_port(client: &Client, port: u16) -> PortCheckResult {
    let health_url = format!("http://127.0.0.1:{}/api/health", port);

    match client.get(&health_url).send().await {
        Ok(response) if response.status().is_success() => {
            match response.json::<HealthResponse>().await {
                Ok(health) if health.service == INSPECTOR_SERVICE => PortCheckResult::NetpaneInspector,
                _ => PortCheckResult::UsedByOther,
            }
        }
        Ok(_) => PortCheckResult::UsedByOther,
        // Connection refused likely means port is free
        Err(e) if e.is_connect() => PortCheckResult::Available,
        Err(_) => PortCheckResult::UsedByOther,
    }
}

/// Try to bind to a port to check if it's truly available
async fn can_bind_port(port: u16) -> bool {
    TcpListener::bind(format!("127.0.0.1:{}", port)).await.is_ok()
}

/// Find a port for the inspector, starting at the preferred one
///
/// Stops at the first port that either has a netpane inspector (`Existing`)
/// or can be bound (`Server`); ports used by other services are skipped.
pub async fn find_inspector_port(preferred_port: u16) -> Result<InspectorMode> {
    let client = Client::builder()
        .timeout(Duration::from_millis(500))
        .build()?;

    for offset in 0..MAX_PORT_ATTEMPTS {
        let Some(port) = preferred_port.checked_add(offset) else {
            break;
        };

        match check_port(&client, port).await {
            PortCheckResult::NetpaneInspector => {
                tracing::debug!("Found existing netpane inspector on port {}", port);
                return Ok(InspectorMode::Existing(port));
            }
            PortCheckResult::Available => {
                if can_bind_port(port).await {
                    tracing::debug!("Port {} is available for inspector", port);
                    return Ok(InspectorMode::Server(port));
                }
                tracing::debug!("Port {} appeared available but couldn't bind, trying next", port);
            }
            PortCheckResult::UsedByOther => {
                tracing::debug!("Port {} is used by another service, trying next", port);
            }
        }
    }

    anyhow::bail!(
        "Could not find available port for inspector (tried {} ports starting from {})",
        MAX_PORT_ATTEMPTS,
        preferred_port
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_find_available_port() {
        let mode = find_inspector_port(49000).await.unwrap();
        assert!(mode.is_server());
        assert!(mode.port() >= 49000);
    }

    #[tokio::test]
    async fn test_skips_port_in_use() {
        let blocker = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let taken = blocker.local_addr().unwrap().port();

        let mode = find_inspector_port(taken).await.unwrap();
        assert_ne!(mode, InspectorMode::Server(taken));
    }
}
