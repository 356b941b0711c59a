//! Inspector client for pushing captures into a running inspector server

use super::server::{HealthResponse, NavigateRequest};
use anyhow::{Context, Result};
use netpane_common::{constants::INSPECTOR_SERVICE, CompletedRecord, ObserverMessage};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;

/// The part of the entries response the client reads
#[derive(Debug, Deserialize)]
struct EntriesSummary {
    count_label: String,
}

/// Client for communicating with an existing inspector server
#[derive(Clone)]
pub struct InspectorClient {
    base_url: String,
    client: Client,
}

impl InspectorClient {
    pub fn new(port: u16) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url: format!("http://127.0.0.1:{}", port),
            client,
        })
    }

    /// Get the inspector URL
    pub fn inspector_url(&self) -> &str {
        &self.base_url
    }

    /// Check if a netpane inspector answers on this port
    pub async fn is_inspector_alive(&self) -> bool {
        let url = format!("{}/api/health", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response
                .json::<HealthResponse>()
                .await
                .is_ok_and(|h| h.service == INSPECTOR_SERVICE),
            Err(_) => false,
        }
    }

    /// Signal a navigation with the page URL and a snapshot of finished requests
    pub async fn navigate(
        &self,
        url: Option<String>,
        events: Vec<ObserverMessage>,
        entries: Vec<CompletedRecord>,
    ) -> Result<()> {
        let count = entries.len();
        self.post("/api/navigate", &NavigateRequest { url, events, entries })
            .await
            .context("Failed to send navigation to inspector")?;

        tracing::debug!("Sent navigation with {} existing requests", count);
        Ok(())
    }

    /// Count label of the inspector's list, e.g. `12 requests`
    pub async fn count_label(&self) -> Result<String> {
        let url = format!("{}/api/entries", self.base_url);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .context("Failed to fetch entries from inspector")?;

        if !response.status().is_success() {
            anyhow::bail!("Inspector returned {}", response.status());
        }

        let summary: EntriesSummary = response
            .json()
            .await
            .context("Failed to parse inspector entries")?;
        Ok(summary.count_label)
    }

    async fn post<T: serde::Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<()> {
        let url = format!("{}{}", self.base_url, path);
        let response = self.client.post(&url).json(body).send().await?;

        if !response.status().is_success() {
            anyhow::bail!("Inspector returned {} for {}", response.status(), path);
        }
        Ok(())
    }
}
