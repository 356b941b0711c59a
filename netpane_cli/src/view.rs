//! Filter and selection state over the entry collection

use crate::classify::{short_type, Category};
use crate::detail::DetailTab;
use crate::engine::{Entry, EntryState};
use crate::format::format_time;
use crate::scope::path_of;
use netpane_common::constants::API_PATH_PREFIX;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// Active list filter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Filter {
    #[default]
    All,
    /// Requests whose path starts with `/api`
    Api,
    Category(Category),
}

impl Filter {
    /// Filter bar order: all, api, then the categories
    pub const ALL: [Filter; 11] = [
        Filter::All,
        Filter::Api,
        Filter::Category(Category::Fetch),
        Filter::Category(Category::Doc),
        Filter::Category(Category::Css),
        Filter::Category(Category::Js),
        Filter::Category(Category::Img),
        Filter::Category(Category::Media),
        Filter::Category(Category::Font),
        Filter::Category(Category::Websocket),
        Filter::Category(Category::Other),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Filter::All => "all",
            Filter::Api => "api",
            Filter::Category(c) => c.as_str(),
        }
    }

    pub fn matches(&self, url: &str, category: Category) -> bool {
        match self {
            Filter::All => true,
            Filter::Api => path_of(url).starts_with(API_PATH_PREFIX),
            Filter::Category(c) => *c == category,
        }
    }

    fn position(&self) -> usize {
        Self::ALL.iter().position(|f| f == self).unwrap_or(0)
    }

    pub fn next(&self) -> Self {
        Self::ALL[(self.position() + 1) % Self::ALL.len()]
    }

    pub fn prev(&self) -> Self {
        Self::ALL[(self.position() + Self::ALL.len() - 1) % Self::ALL.len()]
    }
}

impl fmt::Display for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Filter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" | "" => Ok(Filter::All),
            "api" => Ok(Filter::Api),
            other => other
                .parse::<Category>()
                .map(Filter::Category)
                .map_err(|_| format!("unknown filter: {}", s)),
        }
    }
}

impl Serialize for Filter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Filter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Visible and total entry counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counts {
    pub visible: usize,
    pub total: usize,
}

impl Counts {
    pub fn of(entries: &[Entry]) -> Self {
        Self {
            visible: entries.iter().filter(|e| e.visible).count(),
            total: entries.len(),
        }
    }

    pub fn label(&self, filter: Filter) -> String {
        match filter {
            Filter::All if self.total == 1 => "1 request".to_string(),
            Filter::All => format!("{} requests", self.total),
            _ => format!("{} / {} requests", self.visible, self.total),
        }
    }
}

/// Presentation state: filter, selection, active tab and render generation
#[derive(Debug, Clone, Default)]
pub struct ViewState {
    filter: Filter,
    selected: Option<usize>,
    active_tab: DetailTab,
    generation: u64,
}

impl ViewState {
    pub fn new(filter: Filter, active_tab: DetailTab) -> Self {
        Self {
            filter,
            active_tab,
            ..Self::default()
        }
    }

    pub fn filter(&self) -> Filter {
        self.filter
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn active_tab(&self) -> DetailTab {
        self.active_tab
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Set the filter and recompute every entry's visibility
    pub fn set_filter(&mut self, filter: Filter, entries: &mut [Entry]) {
        self.filter = filter;
        for entry in entries.iter_mut() {
            self.refresh(entry);
        }
    }

    /// Recompute one entry's visibility under the current filter
    pub fn refresh(&self, entry: &mut Entry) {
        entry.visible = self.filter.matches(&entry.url, entry.category);
    }

    /// Select a completed entry. Pending, failed or missing entries are a no-op.
    pub fn select(&mut self, entries: &[Entry], index: usize) -> bool {
        match entries.get(index) {
            Some(entry) if entry.completed().is_some() => {
                self.selected = Some(index);
                self.generation += 1;
                true
            }
            _ => false,
        }
    }

    pub fn clear_selection(&mut self) {
        self.selected = None;
        self.generation += 1;
    }

    pub fn set_active_tab(&mut self, tab: DetailTab) {
        self.active_tab = tab;
        self.generation += 1;
    }

    /// Reset after a full clear; the filter and tab survive
    pub fn reset(&mut self) {
        self.selected = None;
        self.generation += 1;
    }
}

/// Display projection of an entry, shared by every frontend
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryRow {
    pub index: usize,
    pub method: String,
    /// Status code, or `pending` / `failed`
    pub status: String,
    pub path: String,
    pub url: String,
    pub category: Category,
    pub type_label: String,
    pub size: String,
    pub time: String,
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub visible: bool,
    /// Local start time, `HH:MM:SS.mmm`
    pub started: String,
}

impl EntryRow {
    pub fn from_entry(entry: &Entry) -> Self {
        let (status, type_label, size, time, error) = match &entry.state {
            EntryState::Pending => (
                "pending".to_string(),
                entry.category.to_string(),
                "\u{2014}".to_string(),
                "\u{2014}".to_string(),
                None,
            ),
            EntryState::Failed(err) => (
                "failed".to_string(),
                entry.category.to_string(),
                "\u{2014}".to_string(),
                "\u{2014}".to_string(),
                Some(err.clone()),
            ),
            EntryState::Completed(c) => {
                let mime = c.record.mime_type();
                let label = if mime.is_empty() {
                    entry.category.to_string()
                } else {
                    short_type(mime)
                };
                (
                    c.record.response.status.to_string(),
                    label,
                    c.size.label(),
                    format_time(c.record.time),
                    None,
                )
            }
        };

        Self {
            index: entry.index,
            method: entry.method.clone(),
            status,
            path: path_of(&entry.url),
            url: entry.url.clone(),
            category: entry.category,
            type_label,
            size,
            time,
            state: entry.state.as_str(),
            error,
            visible: entry.visible,
            started: entry
                .started_at
                .map(|t| t.with_timezone(&chrono::Local).format("%H:%M:%S%.3f").to_string())
                .unwrap_or_default(),
        }
    }
}
