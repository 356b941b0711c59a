//! TUI application state and event handling

use crate::detail::{Block, DetailContent};
use crate::engine::Completion;
use crate::panel::{Panel, PanelEvent, RenderRequest, RenderedDetail};
use crate::scope::{Scope, ScopeTicket};
use crate::source::LiveInput;
use crate::view::Filter;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use netpane_common::CompletedRecord;
use std::collections::HashMap;

/// Ticks a new row stays highlighted
const FLASH_TICKS: u8 = 10;

/// Ticks a status message stays visible
const STATUS_TICKS: u8 = 30;

const PAGE_SIZE: usize = 10;

/// Events that can be sent to the TUI
#[derive(Debug)]
pub enum TuiEvent {
    /// Key event from terminal
    Key(KeyEvent),
    /// New input from a followed capture
    Live(LiveInput),
    /// A detail render finished
    Rendered(RenderedDetail),
    /// A scope resolution finished (`None` when superseded)
    ScopeResolved(ScopeTicket, Option<Scope>),
    /// Tick for periodic updates
    Tick,
}

impl From<LiveInput> for TuiEvent {
    fn from(input: LiveInput) -> Self {
        TuiEvent::Live(input)
    }
}

/// What a detail line shows
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineKind {
    Heading,
    Row { name: String },
    Text,
    /// JSON tree line; `path` addresses the node inside block `block`
    Tree {
        block: usize,
        path: Vec<usize>,
        depth: usize,
        expandable: bool,
    },
    Notice,
}

/// One display line of the detail pane
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailLine {
    pub kind: LineKind,
    pub text: String,
}

/// Flatten rendered blocks into display lines
pub fn detail_lines(content: &DetailContent) -> Vec<DetailLine> {
    let mut lines = Vec::new();

    for (i, block) in content.blocks.iter().enumerate() {
        if i > 0 {
            lines.push(DetailLine {
                kind: LineKind::Text,
                text: String::new(),
            });
        }

        match block {
            Block::Table { title, rows } => {
                lines.push(DetailLine {
                    kind: LineKind::Heading,
                    text: title.clone(),
                });
                lines.extend(rows.iter().map(|row| DetailLine {
                    kind: LineKind::Row {
                        name: row.name.clone(),
                    },
                    text: row.value.clone(),
                }));
            }
            Block::Text { title, text } => {
                if let Some(title) = title {
                    lines.push(DetailLine {
                        kind: LineKind::Heading,
                        text: title.clone(),
                    });
                }
                lines.extend(text.lines().map(|l| DetailLine {
                    kind: LineKind::Text,
                    text: l.to_string(),
                }));
            }
            Block::Json { root } => {
                lines.extend(root.lines().into_iter().map(|l| DetailLine {
                    kind: LineKind::Tree {
                        block: i,
                        path: l.path,
                        depth: l.depth,
                        expandable: l.expandable,
                    },
                    text: l.text,
                }));
            }
            Block::Image {
                mime_type,
                data_base64,
            } => {
                lines.push(DetailLine {
                    kind: LineKind::Notice,
                    text: format!("[{} image, {} base64 chars]", mime_type, data_base64.len()),
                });
            }
            Block::Notice { message } => {
                lines.push(DetailLine {
                    kind: LineKind::Notice,
                    text: message.clone(),
                });
            }
        }
    }

    lines
}

/// TUI application state
pub struct TuiApp {
    pub panel: Panel,
    /// Capture being shown (file name)
    pub source_label: String,
    /// Position within the visible rows
    pub cursor: usize,
    /// Keep the cursor on the newest row
    pub follow: bool,
    pub detail_open: bool,
    pub detail_cursor: usize,
    /// Rows still highlighted, by entry index
    pub flash: HashMap<usize, u8>,
    pub status: Option<(String, u8)>,
    pub should_quit: bool,
    needs_render: bool,
    /// Snapshot to load once the pending navigation's scope resolves
    pending_snapshot: Option<(u64, Vec<CompletedRecord>)>,
}

impl TuiApp {
    pub fn new(panel: Panel, source_label: String) -> Self {
        Self {
            panel,
            source_label,
            cursor: 0,
            follow: true,
            detail_open: false,
            detail_cursor: 0,
            flash: HashMap::new(),
            status: None,
            should_quit: false,
            needs_render: false,
            pending_snapshot: None,
        }
    }

    /// Entry indices of the visible rows, in order
    pub fn visible_indices(&self) -> Vec<usize> {
        self.panel
            .entries()
            .iter()
            .filter(|e| e.visible)
            .map(|e| e.index)
            .collect()
    }

    /// Entry index under the cursor
    pub fn cursor_entry(&self) -> Option<usize> {
        self.visible_indices().get(self.cursor).copied()
    }

    pub fn is_flashing(&self, index: usize) -> bool {
        self.flash.contains_key(&index)
    }

    pub fn detail_lines(&self) -> Vec<DetailLine> {
        self.panel
            .detail()
            .map(|d| detail_lines(&d.content))
            .unwrap_or_default()
    }

    /// Take the pending render request, if the selection or tab changed
    pub fn take_render_request(&mut self) -> Option<RenderRequest> {
        if !std::mem::take(&mut self.needs_render) {
            return None;
        }
        self.panel.begin_render()
    }

    fn set_status(&mut self, message: impl Into<String>) {
        self.status = Some((message.into(), STATUS_TICKS));
    }

    fn clamp_cursor(&mut self) {
        let len = self.visible_indices().len();
        if self.follow || self.cursor >= len {
            self.cursor = len.saturating_sub(1);
        }
    }

    fn move_cursor(&mut self, delta: isize) {
        let len = self.visible_indices().len();
        if len == 0 {
            return;
        }
        let last = len - 1;
        self.cursor = self.cursor.saturating_add_signed(delta).min(last);
        self.follow = self.cursor == last;
    }

    fn move_detail_cursor(&mut self, delta: isize) {
        let last = self.detail_lines().len().saturating_sub(1);
        self.detail_cursor = self.detail_cursor.saturating_add_signed(delta).min(last);
    }

    /// React to a change reported by the panel
    pub fn on_panel_event(&mut self, event: &PanelEvent) {
        match event {
            PanelEvent::EntryAdded { row, highlight } => {
                if *highlight {
                    self.flash.insert(row.index, FLASH_TICKS);
                    self.clamp_cursor();
                }
            }
            PanelEvent::Cleared => {
                self.flash.clear();
                self.detail_open = false;
                self.detail_cursor = 0;
                self.cursor = 0;
                self.follow = true;
            }
            PanelEvent::FilterChanged { .. } => self.clamp_cursor(),
            PanelEvent::ScopeChanged { scope } => {
                self.set_status(format!("Inspecting {}", scope.label()));
            }
            _ => {}
        }
    }

    fn select_under_cursor(&mut self) {
        let Some(index) = self.cursor_entry() else {
            return;
        };

        match self.panel.select(index) {
            Some(_) => {
                self.detail_open = true;
                self.detail_cursor = 0;
                self.needs_render = true;
            }
            None => {
                let message = match self.panel.entries().get(index).map(|e| &e.state) {
                    Some(crate::engine::EntryState::Failed(err)) => format!("Request failed: {}", err),
                    _ => "Request is still pending".to_string(),
                };
                self.set_status(message);
            }
        }
    }

    fn close_detail(&mut self) {
        self.detail_open = false;
        self.panel.clear_selection();
    }

    fn set_filter(&mut self, filter: Filter) {
        let event = self.panel.set_filter(filter);
        self.on_panel_event(&event);
    }

    fn change_tab(&mut self, forward: bool) {
        let tab = self.panel.active_tab();
        let tab = if forward { tab.next() } else { tab.prev() };
        self.panel.set_active_tab(tab);
        self.detail_cursor = 0;
        self.needs_render = true;
    }

    fn toggle_tree_node(&mut self) {
        let lines = self.detail_lines();
        let Some(DetailLine {
            kind: LineKind::Tree {
                block,
                path,
                expandable: true,
                ..
            },
            ..
        }) = lines.get(self.detail_cursor)
        else {
            return;
        };

        let Some(detail) = self.panel.detail_mut() else {
            return;
        };
        if let Some(Block::Json { root }) = detail.content.blocks.get_mut(*block) {
            root.toggle(path);
        }
    }

    fn clear(&mut self) {
        let event = self.panel.clear_all();
        self.pending_snapshot = None;
        self.on_panel_event(&event);
        self.set_status("Cleared");
    }

    /// Handle key events
    pub fn handle_key(&mut self, key: KeyEvent) {
        match (key.code, key.modifiers) {
            // Quit
            (KeyCode::Char('c'), KeyModifiers::CONTROL) | (KeyCode::Char('q'), _) => {
                self.should_quit = true;
            }
            // Detail pane
            (KeyCode::Enter, _) => self.select_under_cursor(),
            (KeyCode::Esc, _) if self.detail_open => self.close_detail(),
            (KeyCode::Tab, _) => self.change_tab(true),
            (KeyCode::BackTab, _) => self.change_tab(false),
            (KeyCode::Char(' '), _) if self.detail_open => self.toggle_tree_node(),
            // Navigation: detail lines when open, else the list
            (KeyCode::Up | KeyCode::Char('k'), _) if self.detail_open => self.move_detail_cursor(-1),
            (KeyCode::Down | KeyCode::Char('j'), _) if self.detail_open => self.move_detail_cursor(1),
            (KeyCode::PageUp, _) if self.detail_open => self.move_detail_cursor(-(PAGE_SIZE as isize)),
            (KeyCode::PageDown, _) if self.detail_open => self.move_detail_cursor(PAGE_SIZE as isize),
            (KeyCode::Up | KeyCode::Char('k'), _) => self.move_cursor(-1),
            (KeyCode::Down | KeyCode::Char('j'), _) => self.move_cursor(1),
            (KeyCode::PageUp, _) => self.move_cursor(-(PAGE_SIZE as isize)),
            (KeyCode::PageDown, _) => self.move_cursor(PAGE_SIZE as isize),
            (KeyCode::Home, _) => {
                self.cursor = 0;
                self.follow = self.visible_indices().len() <= 1;
            }
            (KeyCode::End, _) => {
                self.follow = true;
                self.clamp_cursor();
            }
            // Filters
            (KeyCode::Char('f'), _) => self.set_filter(self.panel.filter().next()),
            (KeyCode::Char('F'), _) => self.set_filter(self.panel.filter().prev()),
            (KeyCode::Char(c @ '0'..='9'), _) => {
                let n = c as usize - '0' as usize;
                self.set_filter(Filter::ALL[n]);
            }
            (KeyCode::Char('c'), _) => self.clear(),
            _ => {}
        }
    }

    fn handle_live(&mut self, input: LiveInput) {
        match input {
            LiveInput::Observer(msg) => {
                if let Some(event) = self.panel.handle_observer(msg) {
                    self.on_panel_event(&event);
                }
            }
            LiveInput::Completed(record) => {
                if let Some(event) = self.panel.on_completed(Completion::new(record)) {
                    self.on_panel_event(&event);
                }
            }
            LiveInput::Navigated { .. } => {
                // Needs a scope resolution; the event loop drives it
            }
        }
    }

    /// Start a navigation; the returned ticket must be resolved by the caller
    pub fn navigate(&mut self, entries: Vec<CompletedRecord>) -> ScopeTicket {
        let ticket = self.panel.navigate();
        self.on_panel_event(&PanelEvent::Cleared);
        self.pending_snapshot = Some((ticket.epoch(), entries));
        ticket
    }

    fn on_scope_resolved(&mut self, ticket: ScopeTicket, scope: Option<Scope>) {
        let Some(scope) = scope else {
            return;
        };
        let Some(event) = self.panel.apply_scope(&ticket, scope) else {
            return;
        };
        self.on_panel_event(&event);

        if let Some((epoch, entries)) = self.pending_snapshot.take() {
            if epoch == ticket.epoch() {
                self.panel
                    .load_existing(entries.into_iter().map(Completion::new));
                self.clamp_cursor();
            }
        }
    }

    fn tick(&mut self) {
        self.flash.retain(|_, ticks| {
            *ticks = ticks.saturating_sub(1);
            *ticks > 0
        });
        if let Some((_, ticks)) = &mut self.status {
            *ticks = ticks.saturating_sub(1);
            if *ticks == 0 {
                self.status = None;
            }
        }
    }

    /// Handle TUI event
    pub fn handle_event(&mut self, event: TuiEvent) {
        match event {
            TuiEvent::Key(key) => self.handle_key(key),
            TuiEvent::Live(input) => self.handle_live(input),
            TuiEvent::Rendered(rendered) => {
                if self.panel.apply_render(rendered).is_some() {
                    self.detail_cursor = 0;
                }
            }
            TuiEvent::ScopeResolved(ticket, scope) => self.on_scope_resolved(ticket, scope),
            TuiEvent::Tick => self.tick(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::Category;
    use crate::detail::DetailTab;
    use netpane_common::{ObserverMessage, RequestStart};

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn record(url: &str, mime: &str, body: &str) -> CompletedRecord {
        let mut record = CompletedRecord::default();
        record.request.method = "GET".to_string();
        record.request.url = url.to_string();
        record.response.status = 200;
        record.response.content.mime_type = mime.to_string();
        record.response.content.size = body.len() as i64;
        record.response.content.text = Some(body.to_string());
        record.transfer_size = Some(100.0);
        record.time = 5.0;
        record
    }

    fn app() -> TuiApp {
        let mut panel = Panel::with_scope(
            Filter::All,
            DetailTab::Preview,
            Scope::Known("x.test".to_string()),
        );
        panel.load_existing(vec![
            record("https://x.test/", "text/html", "<p>hi</p>").into(),
            record("https://x.test/api/tree", "application/json", r#"{"a":1,"b":[2,3]}"#).into(),
            record("https://x.test/app.js", "text/javascript", "run()").into(),
        ]);
        TuiApp::new(panel, "capture.har".to_string())
    }

    fn live_start(id: &str, url: &str) -> TuiEvent {
        TuiEvent::Live(LiveInput::Observer(ObserverMessage::Start(RequestStart {
            request_id: id.into(),
            url: url.to_string(),
            method: "GET".to_string(),
            resource_type: Some("fetch".to_string()),
            time_stamp: 0.0,
        })))
    }

    #[test]
    fn test_cursor_navigation_disables_follow() {
        let mut app = app();
        app.handle_key(key(KeyCode::End));
        assert_eq!(app.cursor, 2);
        assert!(app.follow);

        app.handle_key(key(KeyCode::Up));
        assert_eq!(app.cursor, 1);
        assert!(!app.follow);

        app.handle_key(key(KeyCode::Char('j')));
        assert!(app.follow);

        app.handle_key(key(KeyCode::PageUp));
        assert_eq!(app.cursor, 0);
    }

    #[test]
    fn test_live_rows_flash_and_follow() {
        let mut app = app();
        app.handle_key(key(KeyCode::End));
        app.handle_event(live_start("1", "https://x.test/api/live"));

        assert!(app.is_flashing(3));
        assert_eq!(app.cursor_entry(), Some(3));

        for _ in 0..FLASH_TICKS {
            app.handle_event(TuiEvent::Tick);
        }
        assert!(!app.is_flashing(3));
    }

    #[test]
    fn test_scrolled_up_list_stays_put() {
        let mut app = app();
        app.handle_key(key(KeyCode::Home));
        app.handle_event(live_start("1", "https://x.test/api/live"));
        assert_eq!(app.cursor, 0);
    }

    #[test]
    fn test_bulk_loaded_rows_do_not_flash() {
        let app = app();
        assert!(app.flash.is_empty());
    }

    #[test]
    fn test_filter_keys() {
        let mut app = app();
        app.handle_key(key(KeyCode::Char('1')));
        assert_eq!(app.panel.filter(), Filter::Api);
        assert_eq!(app.visible_indices(), vec![1]);

        app.handle_key(key(KeyCode::Char('f')));
        assert_eq!(app.panel.filter(), Filter::Category(Category::Fetch));

        app.handle_key(key(KeyCode::Char('F')));
        app.handle_key(key(KeyCode::Char('F')));
        assert_eq!(app.panel.filter(), Filter::All);
        assert_eq!(app.visible_indices().len(), 3);
    }

    #[tokio::test]
    async fn test_select_render_and_toggle_tree() {
        let mut app = app();
        app.handle_key(key(KeyCode::Home));
        app.handle_key(key(KeyCode::Down));
        app.handle_key(key(KeyCode::Enter));
        assert!(app.detail_open);

        let request = app.take_render_request().unwrap();
        assert!(app.take_render_request().is_none());
        app.handle_event(TuiEvent::Rendered(request.run().await));

        let lines = app.detail_lines();
        assert_eq!(lines.len(), 4);

        // Move to "b" and expand it
        app.handle_key(key(KeyCode::Down));
        app.handle_key(key(KeyCode::Down));
        app.handle_key(key(KeyCode::Char(' ')));
        assert_eq!(app.detail_lines().len(), 7);

        app.handle_key(key(KeyCode::Esc));
        assert!(!app.detail_open);
        assert_eq!(app.panel.selected(), None);
    }

    #[test]
    fn test_selecting_pending_sets_status() {
        let mut app = app();
        app.handle_event(live_start("1", "https://x.test/api/live"));
        app.handle_key(key(KeyCode::End));
        app.handle_key(key(KeyCode::Enter));

        assert!(!app.detail_open);
        assert_eq!(app.status.as_ref().map(|(m, _)| m.as_str()), Some("Request is still pending"));
    }

    #[test]
    fn test_clear_and_quit() {
        let mut app = app();
        app.handle_key(key(KeyCode::Char('c')));
        assert_eq!(app.panel.counts().total, 0);
        assert!(!app.should_quit);

        app.handle_key(KeyEvent::new(KeyCode::Char('c'), KeyModifiers::CONTROL));
        assert!(app.should_quit);
    }

    #[test]
    fn test_navigation_loads_snapshot_after_scope() {
        let mut app = app();
        let ticket = app.navigate(vec![record("https://y.test/", "text/html", "")]);
        assert_eq!(app.panel.counts().total, 0);

        app.handle_event(TuiEvent::ScopeResolved(ticket, Some(Scope::Known("y.test".into()))));
        assert_eq!(app.panel.counts().total, 1);
        assert!(app.flash.is_empty());
    }

    #[test]
    fn test_detail_lines_for_tables() {
        let content = crate::detail::render_headers(&record("https://x.test/", "text/html", ""));
        let lines = detail_lines(&content);
        assert_eq!(lines[0].kind, LineKind::Heading);
        assert_eq!(
            lines[1].kind,
            LineKind::Row {
                name: "Request URL".to_string()
            }
        );
    }
}
