//! Panel state shared by every frontend
//!
//! Owns the correlation engine, the view state and the current scope. All
//! mutation goes through here so that visibility, highlighting and render
//! generations stay consistent no matter which stream an event came from.

use crate::detail::{self, DetailContent, DetailTab};
use crate::engine::{CompletedEntry, Completion, Correlator, Entry, Intake};
use crate::scope::{Scope, ScopeEpoch, ScopeTicket};
use crate::view::{Counts, EntryRow, Filter, ViewState};
use netpane_common::ObserverMessage;
use serde::Serialize;
use std::sync::Arc;

/// Change notifications for frontends
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum PanelEvent {
    EntryAdded {
        row: EntryRow,
        /// False while bulk loading a snapshot
        highlight: bool,
    },
    EntryUpdated {
        row: EntryRow,
    },
    Cleared,
    ScopeChanged {
        scope: Scope,
    },
    FilterChanged {
        filter: Filter,
        counts: Counts,
    },
    SelectionChanged {
        selected: Option<usize>,
        tab: DetailTab,
    },
    DetailReady {
        index: usize,
        content: DetailContent,
    },
}

/// Serializable view of the whole panel
#[derive(Debug, Clone, Serialize)]
pub struct PanelSnapshot {
    pub scope: Scope,
    pub filter: Filter,
    pub counts: Counts,
    pub count_label: String,
    pub selected: Option<usize>,
    pub active_tab: DetailTab,
    pub rows: Vec<EntryRow>,
}

/// A detail render captured at a generation
pub struct RenderRequest {
    pub generation: u64,
    pub index: usize,
    pub tab: DetailTab,
    pub entry: Arc<CompletedEntry>,
}

impl RenderRequest {
    pub async fn run(self) -> RenderedDetail {
        let content = detail::render(&self.entry, self.tab).await;
        RenderedDetail {
            generation: self.generation,
            index: self.index,
            content,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RenderedDetail {
    pub generation: u64,
    pub index: usize,
    pub content: DetailContent,
}

#[derive(Debug, Default)]
pub struct Panel {
    engine: Correlator,
    view: ViewState,
    scope: Scope,
    epochs: ScopeEpoch,
    bulk_loading: bool,
    detail: Option<RenderedDetail>,
}

impl Panel {
    pub fn new(filter: Filter, tab: DetailTab) -> Self {
        Self {
            view: ViewState::new(filter, tab),
            ..Self::default()
        }
    }

    /// Panel with a scope already known, used by offline replays
    pub fn with_scope(filter: Filter, tab: DetailTab, scope: Scope) -> Self {
        Self {
            scope,
            ..Self::new(filter, tab)
        }
    }

    /// Feed one low-level observer message
    pub fn handle_observer(&mut self, msg: ObserverMessage) -> Option<PanelEvent> {
        let intake = match msg {
            ObserverMessage::Init { tab_id } => {
                tracing::debug!("Observer attached to tab {}", tab_id);
                return None;
            }
            ObserverMessage::Start(start) => self.engine.on_start(&self.scope, start),
            ObserverMessage::End(end) => {
                self.engine.on_end(end);
                return None;
            }
            ObserverMessage::Error(error) => self.engine.on_error(error),
        };
        self.after_intake(intake)
    }

    /// Feed one completed record
    pub fn on_completed(&mut self, completion: Completion) -> Option<PanelEvent> {
        let intake = self.engine.on_completed(&self.scope, completion);
        self.after_intake(intake)
    }

    fn after_intake(&mut self, intake: Intake) -> Option<PanelEvent> {
        let index = intake.index()?;
        let entry = self.engine.entries_mut().get_mut(index)?;
        self.view.refresh(entry);
        let row = EntryRow::from_entry(entry);

        Some(match intake {
            Intake::Appended(_) => PanelEvent::EntryAdded {
                row,
                highlight: !self.bulk_loading,
            },
            _ => PanelEvent::EntryUpdated { row },
        })
    }

    pub fn begin_bulk_load(&mut self) {
        self.bulk_loading = true;
    }

    pub fn finish_bulk_load(&mut self) {
        self.bulk_loading = false;
    }

    pub fn is_bulk_loading(&self) -> bool {
        self.bulk_loading
    }

    /// Load a snapshot of already finished requests in batch mode
    pub fn load_existing<I>(&mut self, records: I) -> Vec<PanelEvent>
    where
        I: IntoIterator<Item = Completion>,
    {
        self.begin_bulk_load();
        let events: Vec<_> = records
            .into_iter()
            .filter_map(|c| self.on_completed(c))
            .collect();
        self.finish_bulk_load();

        tracing::debug!("Loaded {} existing requests", events.len());
        events
    }

    /// Discard every entry and all tracking state. Scope and filter survive.
    ///
    /// Any scope resolution still in flight is superseded.
    pub fn clear_all(&mut self) -> PanelEvent {
        self.epochs.advance();
        self.engine.clear();
        self.view.reset();
        self.detail = None;
        PanelEvent::Cleared
    }

    /// Page navigation: clear and start a new scope resolution epoch
    ///
    /// The previous scope stays in effect until the new resolution lands.
    pub fn navigate(&mut self) -> ScopeTicket {
        self.clear_all();
        self.epochs.advance()
    }

    /// Start a scope resolution without clearing (startup)
    pub fn begin_scope_resolution(&self) -> ScopeTicket {
        self.epochs.advance()
    }

    /// Apply a resolution result unless a newer navigation superseded it
    pub fn apply_scope(&mut self, ticket: &ScopeTicket, scope: Scope) -> Option<PanelEvent> {
        if !ticket.is_current() {
            tracing::debug!("Dropping scope from superseded epoch {}", ticket.epoch());
            return None;
        }
        tracing::info!("Inspected host: {}", scope.label());
        self.scope = scope.clone();
        Some(PanelEvent::ScopeChanged { scope })
    }

    pub fn set_filter(&mut self, filter: Filter) -> PanelEvent {
        self.view.set_filter(filter, self.engine.entries_mut());
        PanelEvent::FilterChanged {
            filter,
            counts: self.counts(),
        }
    }

    /// Select a completed entry; pending and failed entries are a no-op
    pub fn select(&mut self, index: usize) -> Option<PanelEvent> {
        if !self.view.select(self.engine.entries(), index) {
            return None;
        }
        self.detail = None;
        Some(self.selection_event())
    }

    pub fn clear_selection(&mut self) -> PanelEvent {
        self.view.clear_selection();
        self.detail = None;
        self.selection_event()
    }

    pub fn set_active_tab(&mut self, tab: DetailTab) -> PanelEvent {
        self.view.set_active_tab(tab);
        self.detail = None;
        self.selection_event()
    }

    fn selection_event(&self) -> PanelEvent {
        PanelEvent::SelectionChanged {
            selected: self.view.selected(),
            tab: self.view.active_tab(),
        }
    }

    /// Capture a render of the selected entry at the current generation
    pub fn begin_render(&self) -> Option<RenderRequest> {
        let index = self.view.selected()?;
        let entry = self.engine.get(index)?.completed()?.clone();
        Some(RenderRequest {
            generation: self.view.generation(),
            index,
            tab: self.view.active_tab(),
            entry,
        })
    }

    /// Apply a finished render; stale generations are discarded
    pub fn apply_render(&mut self, rendered: RenderedDetail) -> Option<PanelEvent> {
        if rendered.generation != self.view.generation()
            || self.view.selected() != Some(rendered.index)
        {
            tracing::debug!(
                "Discarding stale render (generation {} != {})",
                rendered.generation,
                self.view.generation()
            );
            return None;
        }

        let event = PanelEvent::DetailReady {
            index: rendered.index,
            content: rendered.content.clone(),
        };
        self.detail = Some(rendered);
        Some(event)
    }

    pub fn detail(&self) -> Option<&RenderedDetail> {
        self.detail.as_ref()
    }

    pub fn detail_mut(&mut self) -> Option<&mut RenderedDetail> {
        self.detail.as_mut()
    }

    pub fn entries(&self) -> &[Entry] {
        self.engine.entries()
    }

    pub fn rows(&self) -> Vec<EntryRow> {
        self.engine.entries().iter().map(EntryRow::from_entry).collect()
    }

    pub fn visible_rows(&self) -> Vec<EntryRow> {
        self.engine
            .entries()
            .iter()
            .filter(|e| e.visible)
            .map(EntryRow::from_entry)
            .collect()
    }

    pub fn counts(&self) -> Counts {
        Counts::of(self.engine.entries())
    }

    pub fn count_label(&self) -> String {
        self.counts().label(self.view.filter())
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn filter(&self) -> Filter {
        self.view.filter()
    }

    pub fn selected(&self) -> Option<usize> {
        self.view.selected()
    }

    pub fn active_tab(&self) -> DetailTab {
        self.view.active_tab()
    }

    pub fn generation(&self) -> u64 {
        self.view.generation()
    }

    pub fn pending_count(&self) -> usize {
        self.engine.pending_count()
    }

    pub fn snapshot(&self) -> PanelSnapshot {
        PanelSnapshot {
            scope: self.scope.clone(),
            filter: self.filter(),
            counts: self.counts(),
            count_label: self.count_label(),
            selected: self.selected(),
            active_tab: self.active_tab(),
            rows: self.rows(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Category;
    use crate::detail::Block;
    use netpane_common::{CompletedRecord, RequestError, RequestStart};

    fn panel() -> Panel {
        Panel::with_scope(
            Filter::All,
            DetailTab::Headers,
            Scope::Known("x.test".to_string()),
        )
    }

    fn start(id: &str, url: &str) -> ObserverMessage {
        ObserverMessage::Start(RequestStart {
            request_id: id.into(),
            url: url.to_string(),
            method: "GET".to_string(),
            resource_type: Some("xmlhttprequest".to_string()),
            time_stamp: 1_714_557_600_000.0,
        })
    }

    fn record(url: &str, mime: &str, transfer: f64, content_size: i64, time: f64) -> CompletedRecord {
        let mut record = CompletedRecord::default();
        record.request.method = "GET".to_string();
        record.request.url = url.to_string();
        record.response.status = 200;
        record.response.status_text = "OK".to_string();
        record.response.content.mime_type = mime.to_string();
        record.response.content.size = content_size;
        record.transfer_size = Some(transfer);
        record.time = time;
        record
    }

    #[test]
    fn test_pending_fetch_completes() {
        let mut panel = panel();
        panel.handle_observer(start("7", "https://x.test/api/users"));

        let entry = &panel.entries()[0];
        assert!(entry.is_pending());
        assert_eq!(entry.category, Category::Fetch);

        panel.set_filter(Filter::Api);
        assert!(panel.entries()[0].visible);
        panel.set_filter(Filter::Category(Category::Js));
        assert!(!panel.entries()[0].visible);
        panel.set_filter(Filter::All);

        let event = panel.on_completed(
            record("https://x.test/api/users", "application/json", 532.0, 900, 48.0).into(),
        );
        assert!(matches!(event, Some(PanelEvent::EntryUpdated { .. })));

        let rows = panel.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].state, "completed");
        assert_eq!(rows[0].size, "532 B");
        assert_eq!(rows[0].time, "48 ms");
    }

    #[test]
    fn test_unmatched_script_from_memory_cache() {
        let mut panel = panel();
        let event = panel.on_completed(
            record("https://x.test/app.js", "text/javascript", 0.0, 4096, 3.0).into(),
        );
        assert!(matches!(event, Some(PanelEvent::EntryAdded { highlight: true, .. })));

        let rows = panel.rows();
        assert_eq!(rows[0].category, Category::Js);
        assert_eq!(rows[0].size, "(memory)");
    }

    #[test]
    fn test_new_entries_follow_active_filter() {
        let mut panel = panel();
        panel.set_filter(Filter::Category(Category::Js));
        panel.handle_observer(start("1", "https://x.test/api/users"));

        assert!(!panel.entries()[0].visible);
        assert_eq!(panel.count_label(), "0 / 1 requests");
    }

    #[tokio::test]
    async fn test_preview_json_tree() {
        let mut panel = panel();
        let mut r = record("https://x.test/api/tree", "application/json", 40.0, 17, 5.0);
        r.response.content.text = Some(r#"{"a":1,"b":[2,3]}"#.to_string());
        panel.on_completed(r.into());

        panel.set_active_tab(DetailTab::Preview);
        assert!(panel.select(0).is_some());

        let rendered = panel.begin_render().unwrap().run().await;
        assert!(panel.apply_render(rendered).is_some());

        let detail = panel.detail().unwrap();
        match &detail.content.blocks[0] {
            Block::Json { root } => {
                assert!(root.expanded);
                assert_eq!(root.children().len(), 2);
                assert!(!root.children()[1].expanded);
            }
            other => panic!("expected json tree, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stale_render_discarded() {
        let mut panel = panel();
        panel.on_completed(record("https://x.test/a", "text/plain", 10.0, 3, 1.0).into());
        panel.on_completed(record("https://x.test/b", "text/plain", 10.0, 3, 1.0).into());

        panel.select(0);
        let stale = panel.begin_render().unwrap();

        panel.select(1);
        let fresh = panel.begin_render().unwrap();

        assert!(panel.apply_render(stale.run().await).is_none());
        assert!(panel.detail().is_none());
        assert!(panel.apply_render(fresh.run().await).is_some());
        assert_eq!(panel.detail().unwrap().index, 1);

        // A tab change invalidates renders captured before it
        let old_tab = panel.begin_render().unwrap();
        panel.set_active_tab(DetailTab::Payload);
        assert!(panel.apply_render(old_tab.run().await).is_none());
    }

    #[test]
    fn test_select_pending_or_failed_is_noop() {
        let mut panel = panel();
        panel.handle_observer(start("1", "https://x.test/a"));
        panel.handle_observer(start("2", "https://x.test/b"));
        panel.handle_observer(ObserverMessage::Error(RequestError {
            request_id: "2".into(),
            error: "net::ERR_ABORTED".to_string(),
        }));

        assert!(panel.select(0).is_none());
        assert!(panel.select(1).is_none());
        assert_eq!(panel.selected(), None);
        assert!(panel.begin_render().is_none());
    }

    #[test]
    fn test_bulk_load_rows_not_highlighted() {
        let mut panel = panel();
        let events = panel.load_existing(vec![
            record("https://x.test/", "text/html", 900.0, 2000, 30.0).into(),
            record("https://cdn.other.test/lib.js", "text/javascript", 900.0, 2000, 30.0).into(),
            record("https://x.test/app.css", "text/css", 300.0, 800, 10.0).into(),
        ]);

        assert_eq!(events.len(), 2);
        assert!(events
            .iter()
            .all(|e| matches!(e, PanelEvent::EntryAdded { highlight: false, .. })));
        assert!(!panel.is_bulk_loading());
    }

    #[test]
    fn test_clear_resets_counts() {
        let mut panel = panel();
        panel.set_filter(Filter::Api);
        panel.handle_observer(start("1", "https://x.test/api/a"));
        panel.on_completed(record("https://x.test/x.png", "image/png", 10.0, 3, 1.0).into());
        panel.select(1);

        panel.clear_all();
        assert_eq!(panel.counts(), Counts::default());
        assert_eq!(panel.selected(), None);
        assert_eq!(panel.filter(), Filter::Api);
        assert_eq!(panel.pending_count(), 0);
    }

    #[test]
    fn test_navigation_supersedes_scope_resolution() {
        let mut panel = Panel::default();
        let first = panel.begin_scope_resolution();
        let second = panel.navigate();

        assert!(panel.apply_scope(&first, Scope::Known("old.test".into())).is_none());
        assert_eq!(panel.scope(), &Scope::Unresolved);

        assert!(panel.apply_scope(&second, Scope::Known("x.test".into())).is_some());
        assert_eq!(panel.scope().host(), Some("x.test"));
    }

    #[test]
    fn test_clear_supersedes_scope_resolution() {
        let mut panel = panel();
        let ticket = panel.navigate();

        panel.clear_all();
        assert!(!ticket.is_current());
        assert!(panel.apply_scope(&ticket, Scope::Known("y.test".into())).is_none());
        // The scope in effect survives the clear
        assert_eq!(panel.scope().host(), Some("x.test"));
    }

    #[test]
    fn test_events_before_scope_are_ignored() {
        let mut panel = Panel::default();
        assert!(panel.handle_observer(start("1", "https://x.test/a")).is_none());
        assert!(panel
            .on_completed(record("https://x.test/a", "text/plain", 1.0, 1, 1.0).into())
            .is_none());
        assert_eq!(panel.counts().total, 0);
    }

    #[test]
    fn test_event_serialization() {
        let json = serde_json::to_value(PanelEvent::Cleared).unwrap();
        assert_eq!(json["event"], "cleared");

        let mut panel = panel();
        let event = panel.set_filter(Filter::Api);
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(json["event"], "filter_changed");
        assert_eq!(json["filter"], "api");
    }
}
