//! Offline captures: a HAR file plus an optional observer event log

use crate::config::Config;
use crate::engine::Completion;
use crate::panel::Panel;
use crate::scope::{resolve_scope, StaticHost};
use crate::view::Filter;
use anyhow::{Context, Result};
use netpane_common::{parse_observer_log, CompletedRecord, HarFile, HarLog, ObserverMessage};
use std::fs;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;

/// Poll interval when following a capture
const FOLLOW_INTERVAL: Duration = Duration::from_millis(500);

/// A capture loaded from disk
#[derive(Debug, Clone, Default)]
pub struct Capture {
    pub har: HarLog,
    pub events: Vec<ObserverMessage>,
}

impl Capture {
    pub fn load(har_path: &Path, events_path: Option<&Path>) -> Result<Self> {
        let har = load_har(har_path)?;
        let events = match events_path {
            Some(path) => load_events(path)?,
            None => Vec::new(),
        };
        Ok(Self { har, events })
    }

    /// Page URL of the capture, if any
    pub fn page_url(&self) -> Option<&str> {
        self.har.page_url()
    }

    /// Host resolver: the override when given, else the capture's page
    pub fn resolver(&self, host_override: Option<&str>) -> StaticHost {
        match host_override {
            Some(host) => StaticHost(Some(host.to_string())),
            None => StaticHost::from_page_url(self.page_url()),
        }
    }

    /// Build a panel by replaying the capture
    ///
    /// Observer events are applied first, then the HAR entries are bulk
    /// loaded so that completions match the starts they belong to.
    pub async fn replay(
        &self,
        host_override: Option<&str>,
        filter: Filter,
        config: &Config,
    ) -> Panel {
        let mut panel = Panel::new(filter, config.default_tab);

        let ticket = panel.begin_scope_resolution();
        let resolver = self.resolver(host_override);
        if let Some(scope) = resolve_scope(&resolver, config.retry_policy(), &ticket).await {
            panel.apply_scope(&ticket, scope);
        }

        for msg in self.events.iter().cloned() {
            panel.handle_observer(msg);
        }
        panel.load_existing(self.har.entries.iter().cloned().map(Completion::new));

        tracing::debug!(
            "Replayed {} events and {} HAR entries into {} rows",
            self.events.len(),
            self.har.entries.len(),
            panel.counts().total
        );
        panel
    }
}

/// New input seen while following a capture
#[derive(Debug, Clone)]
pub enum LiveInput {
    Observer(ObserverMessage),
    Completed(CompletedRecord),
    /// The HAR was rewritten with fewer entries: a new page
    Navigated {
        page_url: Option<String>,
        entries: Vec<CompletedRecord>,
    },
}

/// Follows a HAR file and an event log as they grow
pub struct Follower {
    har_path: PathBuf,
    events_path: Option<PathBuf>,
    har_seen: usize,
    events_pos: u64,
}

impl Follower {
    /// Start following after what `capture` already contains
    pub fn new(har_path: PathBuf, events_path: Option<PathBuf>, capture: &Capture) -> Result<Self> {
        let events_pos = match &events_path {
            Some(path) => fs::metadata(path)
                .with_context(|| format!("Failed to stat event log {}", path.display()))?
                .len(),
            None => 0,
        };

        Ok(Self {
            har_path,
            events_path,
            har_seen: capture.har.entries.len(),
            events_pos,
        })
    }

    /// Inputs that appeared since the last poll
    pub fn poll(&mut self) -> Result<Vec<LiveInput>> {
        let mut inputs = Vec::new();

        if let Some(path) = &self.events_path {
            let (messages, pos) = read_new_events(path, self.events_pos)?;
            self.events_pos = pos;
            inputs.extend(messages.into_iter().map(LiveInput::Observer));
        }

        // A HAR mid-write does not parse; try again next poll
        match load_har(&self.har_path) {
            Ok(har) if har.entries.len() < self.har_seen => {
                self.har_seen = har.entries.len();
                inputs.push(LiveInput::Navigated {
                    page_url: har.page_url().map(str::to_string),
                    entries: har.entries,
                });
            }
            Ok(har) => {
                let fresh: Vec<_> = har.entries.into_iter().skip(self.har_seen).collect();
                self.har_seen += fresh.len();
                inputs.extend(fresh.into_iter().map(LiveInput::Completed));
            }
            Err(e) => tracing::debug!("HAR not readable yet: {:#}", e),
        }

        Ok(inputs)
    }

    /// Poll until the receiver goes away
    pub async fn run<T>(mut self, tx: mpsc::Sender<T>) -> Result<()>
    where
        T: From<LiveInput>,
    {
        loop {
            tokio::time::sleep(FOLLOW_INTERVAL).await;

            for input in self.poll()? {
                if tx.send(T::from(input)).await.is_err() {
                    return Ok(());
                }
            }
        }
    }
}

/// Read complete lines appended to an event log since `pos`
///
/// A trailing partial line is left for the next read. Malformed lines are
/// skipped. Returns the messages and the new position.
fn read_new_events(path: &Path, pos: u64) -> Result<(Vec<ObserverMessage>, u64)> {
    let mut file = fs::File::open(path)
        .with_context(|| format!("Failed to open event log {}", path.display()))?;

    // Truncated: start over
    let len = file.metadata()?.len();
    let pos = if len < pos { 0 } else { pos };

    file.seek(SeekFrom::Start(pos))?;
    let mut buf = Vec::new();
    file.read_to_end(&mut buf)?;

    let Some(end) = buf.iter().rposition(|&b| b == b'\n') else {
        return Ok((Vec::new(), pos));
    };

    // Invalid UTF-8 is replaced, so a bad line fails to parse and is skipped
    let messages = buf[..end]
        .split(|&b| b == b'\n')
        .map(String::from_utf8_lossy)
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match ObserverMessage::from_json(line.trim_end_matches('\r')) {
            Ok(msg) => Some(msg),
            Err(e) => {
                tracing::warn!("Skipping malformed event: {}", e);
                None
            }
        })
        .collect();

    Ok((messages, pos + end as u64 + 1))
}

pub fn load_har(path: &Path) -> Result<HarLog> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read HAR file {}", path.display()))?;
    let har = HarFile::from_json(&content)
        .with_context(|| format!("Failed to parse HAR file {}", path.display()))?;
    Ok(har.log)
}

/// Load a JSON-lines observer log
pub fn load_events(path: &Path) -> Result<Vec<ObserverMessage>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read event log {}", path.display()))?;
    parse_observer_log(&content).map_err(|(line, e)| {
        anyhow::anyhow!("{}:{}: {}", path.display(), line, e)
            .context("Failed to parse event log")
    })
}
