//! Shared panel state and event broadcast for the inspector

use crate::detail::{DetailContent, DetailTab};
use crate::engine::Completion;
use crate::panel::{Panel, PanelEvent, PanelSnapshot};
use crate::scope::{host_of, resolve_scope, HostResolver, RetryPolicy, ScopeError, ScopeTicket};
use crate::view::Filter;
use async_trait::async_trait;
use netpane_common::{CompletedRecord, ObserverMessage};
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use tokio::task::JoinHandle;

/// Capacity of the event channel; slow subscribers skip ahead
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Panel behind a lock, with the current page URL and a broadcast channel
pub struct PanelStore {
    panel: RwLock<Panel>,
    page_url: RwLock<Option<String>>,
    broadcast_tx: broadcast::Sender<PanelEvent>,
    retry: RetryPolicy,
}

impl PanelStore {
    pub fn new(panel: Panel, retry: RetryPolicy) -> Self {
        let (broadcast_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            panel: RwLock::new(panel),
            page_url: RwLock::new(None),
            broadcast_tx,
            retry,
        }
    }

    fn publish(&self, event: PanelEvent) {
        // No subscribers is fine
        let _ = self.broadcast_tx.send(event);
    }

    fn publish_all(&self, events: impl IntoIterator<Item = PanelEvent>) {
        for event in events {
            self.publish(event);
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PanelEvent> {
        self.broadcast_tx.subscribe()
    }

    pub async fn snapshot(&self) -> PanelSnapshot {
        self.panel.read().await.snapshot()
    }

    pub async fn page_url(&self) -> Option<String> {
        self.page_url.read().await.clone()
    }

    /// Current detail of the selection, if rendered
    pub async fn detail(&self) -> (Option<usize>, DetailTab, Option<DetailContent>) {
        let panel = self.panel.read().await;
        (
            panel.selected(),
            panel.active_tab(),
            panel.detail().map(|d| d.content.clone()),
        )
    }

    pub async fn handle_observer(&self, msg: ObserverMessage) {
        let event = self.panel.write().await.handle_observer(msg);
        self.publish_all(event);
    }

    pub async fn submit_completed(&self, record: CompletedRecord) {
        let event = self.panel.write().await.on_completed(Completion::new(record));
        self.publish_all(event);
    }

    /// Page navigation: clear, then resolve the new scope and load the snapshot
    ///
    /// Resolution runs on a spawned task; the snapshot is loaded once the
    /// scope is known, unless a newer navigation superseded this one.
    pub async fn navigate(
        self: &Arc<Self>,
        url: Option<String>,
        entries: Vec<CompletedRecord>,
    ) -> JoinHandle<()> {
        self.navigate_with_events(url, Vec::new(), entries).await
    }

    /// Navigation carrying recorded observer events as well
    ///
    /// Once the scope is known the events are applied first, then the
    /// entries are bulk loaded, so completions find their starts.
    pub async fn navigate_with_events(
        self: &Arc<Self>,
        url: Option<String>,
        events: Vec<ObserverMessage>,
        entries: Vec<CompletedRecord>,
    ) -> JoinHandle<()> {
        *self.page_url.write().await = url;
        let ticket = self.panel.write().await.navigate();
        self.publish(PanelEvent::Cleared);
        self.spawn_scope_resolution(ticket, events, entries)
    }

    fn spawn_scope_resolution(
        self: &Arc<Self>,
        ticket: ScopeTicket,
        events: Vec<ObserverMessage>,
        entries: Vec<CompletedRecord>,
    ) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            let Some(scope) = resolve_scope(store.as_ref(), store.retry, &ticket).await else {
                return;
            };

            let mut panel = store.panel.write().await;
            let Some(event) = panel.apply_scope(&ticket, scope) else {
                return;
            };
            let replayed: Vec<PanelEvent> = events
                .into_iter()
                .filter_map(|msg| panel.handle_observer(msg))
                .collect();
            let loaded = panel.load_existing(entries.into_iter().map(Completion::new));
            drop(panel);

            store.publish(event);
            store.publish_all(replayed);
            store.publish_all(loaded);
        })
    }

    pub async fn set_filter(&self, filter: Filter) {
        let event = self.panel.write().await.set_filter(filter);
        self.publish(event);
    }

    /// Select an entry and render its detail; false when not selectable
    pub async fn select(self: &Arc<Self>, index: usize) -> bool {
        let event = self.panel.write().await.select(index);
        match event {
            Some(event) => {
                self.publish(event);
                self.spawn_render().await;
                true
            }
            None => false,
        }
    }

    pub async fn clear_selection(&self) {
        let event = self.panel.write().await.clear_selection();
        self.publish(event);
    }

    pub async fn set_active_tab(self: &Arc<Self>, tab: DetailTab) {
        let event = self.panel.write().await.set_active_tab(tab);
        self.publish(event);
        self.spawn_render().await;
    }

    pub async fn clear(&self) {
        let event = self.panel.write().await.clear_all();
        self.publish(event);
    }

    /// Render the selection outside the lock; stale results are dropped
    pub async fn spawn_render(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let request = self.panel.read().await.begin_render()?;
        let store = Arc::clone(self);

        Some(tokio::spawn(async move {
            let rendered = request.run().await;
            let event = store.panel.write().await.apply_render(rendered);
            store.publish_all(event);
        }))
    }
}

/// Scope host comes from the page URL set by the last navigation
#[async_trait]
impl HostResolver for PanelStore {
    async fn resolve_current_host(&self) -> Result<String, ScopeError> {
        let url = self.page_url.read().await.clone().ok_or(ScopeError::NoHost)?;
        host_of(&url).ok_or_else(|| ScopeError::Lookup(format!("no host in {}", url)))
    }
}
