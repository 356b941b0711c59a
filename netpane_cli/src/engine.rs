//! Correlation engine
//!
//! Merges the observer's start/end/error stream with the stream of completed
//! HAR records into one ordered collection of entries. Starts are queued per
//! URL so that completions match them first-in first-out; a completion with no
//! queued start becomes a new entry of its own.

use crate::classify::{classify, classify_resource_type, Category};
use crate::detail::BodyFetcher;
use crate::format::{CacheInfo, SizeDisplay};
use crate::scope::Scope;
use chrono::{DateTime, Utc};
use netpane_common::{CompletedRecord, RequestEnd, RequestError, RequestId, RequestStart};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

/// How far apart a late start and an unmatched completion may have started
const LATE_START_WINDOW_MS: i64 = 1000;

/// A completed record as delivered by the high-level stream, with the
/// producer's optional lazy body fetcher
#[derive(Clone)]
pub struct Completion {
    pub record: CompletedRecord,
    pub fetcher: Option<Arc<dyn BodyFetcher>>,
}

impl Completion {
    pub fn new(record: CompletedRecord) -> Self {
        Self {
            record,
            fetcher: None,
        }
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn BodyFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }
}

impl From<CompletedRecord> for Completion {
    fn from(record: CompletedRecord) -> Self {
        Self::new(record)
    }
}

/// Data of a completed entry, shared with in-flight renders
pub struct CompletedEntry {
    pub record: CompletedRecord,
    pub size: SizeDisplay,
    pub(crate) fetcher: Option<Arc<dyn BodyFetcher>>,
}

impl fmt::Debug for CompletedEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletedEntry")
            .field("url", &self.record.request.url)
            .field("size", &self.size)
            .field("lazy_body", &self.fetcher.is_some())
            .finish()
    }
}

/// Lifecycle state of an entry. `Failed` and `Completed` are terminal.
#[derive(Debug, Clone)]
pub enum EntryState {
    Pending,
    Failed(String),
    Completed(Arc<CompletedEntry>),
}

impl EntryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntryState::Pending => "pending",
            EntryState::Failed(_) => "failed",
            EntryState::Completed(_) => "completed",
        }
    }
}

/// One row of the unified request timeline
#[derive(Debug, Clone)]
pub struct Entry {
    pub index: usize,
    pub url: String,
    pub method: String,
    pub category: Category,
    pub started_at: Option<DateTime<Utc>>,
    pub state: EntryState,
    /// Maintained by the view state for the active filter
    pub visible: bool,
}

impl Entry {
    pub fn is_pending(&self) -> bool {
        matches!(self.state, EntryState::Pending)
    }

    pub fn completed(&self) -> Option<&Arc<CompletedEntry>> {
        match &self.state {
            EntryState::Completed(c) => Some(c),
            _ => None,
        }
    }
}

/// Outcome of feeding one event to the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intake {
    /// Out of scope, unknown id or duplicate; nothing changed
    Ignored,
    /// A new entry was appended at this index
    Appended(usize),
    /// The entry at this index changed state
    Updated(usize),
}

impl Intake {
    pub fn index(&self) -> Option<usize> {
        match self {
            Intake::Ignored => None,
            Intake::Appended(i) | Intake::Updated(i) => Some(*i),
        }
    }
}

/// Ordered entries plus the pending-tracking state
#[derive(Debug, Default)]
pub struct Correlator {
    entries: Vec<Entry>,
    pending_by_id: HashMap<RequestId, usize>,
    url_queue: HashMap<String, VecDeque<RequestId>>,
    cache_info: HashMap<RequestId, CacheInfo>,
    /// Entries completed without a start, waiting for a late one
    unmatched: HashMap<String, VecDeque<usize>>,
    /// Late starts joined to an unmatched entry, by request id
    absorbed: HashMap<RequestId, AbsorbedStart>,
}

/// A late start that joined an unmatched completed entry. If its own
/// error or completion shows up later, it was a separate request after all.
#[derive(Debug, Clone)]
struct AbsorbedStart {
    url: String,
    method: String,
    category: Category,
    started_at: Option<DateTime<Utc>>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a request seen by the observer
    pub fn on_start(&mut self, scope: &Scope, start: RequestStart) -> Intake {
        if !scope.contains(&start.url) {
            return Intake::Ignored;
        }
        if self.pending_by_id.contains_key(&start.request_id)
            || self.absorbed.contains_key(&start.request_id)
        {
            tracing::debug!("Duplicate start for tracked request {}", start.request_id);
            return Intake::Ignored;
        }

        let category = classify_resource_type(start.resource_type.as_deref().unwrap_or_default());

        if let Some(index) = self.claim_unmatched(&start) {
            tracing::debug!("Late start {} joined completed entry {}", start.request_id, index);
            self.absorbed.insert(
                start.request_id,
                AbsorbedStart {
                    url: start.url,
                    method: start.method,
                    category,
                    started_at: started_at_millis(start.time_stamp),
                },
            );
            return Intake::Updated(index);
        }

        let index = self.entries.len();

        self.url_queue
            .entry(start.url.clone())
            .or_default()
            .push_back(start.request_id.clone());
        self.pending_by_id.insert(start.request_id, index);

        self.entries.push(Entry {
            index,
            url: start.url,
            method: start.method,
            category,
            started_at: started_at_millis(start.time_stamp),
            state: EntryState::Pending,
            visible: true,
        });

        Intake::Appended(index)
    }

    /// Remember the cache disposition until the completion arrives
    pub fn on_end(&mut self, end: RequestEnd) {
        self.cache_info.insert(
            end.request_id,
            CacheInfo {
                from_cache: end.from_cache,
                status_code: end.status_code,
            },
        );
    }

    /// Fail a pending request. Unknown or already resolved ids are a no-op.
    ///
    /// A late start that joined an unmatched entry and then errors was its own
    /// request: it gets a failed entry of its own.
    pub fn on_error(&mut self, error: RequestError) -> Intake {
        if let Some(absorbed) = self.absorbed.remove(&error.request_id) {
            tracing::debug!(
                "Absorbed start {} failed, adding it as its own entry: {}",
                error.request_id,
                error.error
            );
            let index = self.entries.len();
            self.entries.push(Entry {
                index,
                url: absorbed.url,
                method: absorbed.method,
                category: absorbed.category,
                started_at: absorbed.started_at,
                state: EntryState::Failed(error.error),
                visible: true,
            });
            return Intake::Appended(index);
        }

        let Some(index) = self.pending_by_id.remove(&error.request_id) else {
            return Intake::Ignored;
        };

        let entry = &mut self.entries[index];
        if !entry.is_pending() {
            return Intake::Ignored;
        }

        if let Some(queue) = self.url_queue.get_mut(&entry.url) {
            queue.retain(|id| *id != error.request_id);
            if queue.is_empty() {
                self.url_queue.remove(&entry.url);
            }
        }

        tracing::debug!("Request {} failed: {}", error.request_id, error.error);
        entry.state = EntryState::Failed(error.error);
        Intake::Updated(index)
    }

    /// Match a completed record with the oldest pending start for its URL,
    /// or append it as a new entry
    pub fn on_completed(&mut self, scope: &Scope, completion: Completion) -> Intake {
        let url = completion.record.request.url.clone();
        if !scope.contains(&url) {
            return Intake::Ignored;
        }

        if let Some(request_id) = self.pop_queued(&url) {
            let index = self.pending_by_id.remove(&request_id);
            let cache = self.cache_info.remove(&request_id);

            if let Some(index) = index.filter(|&i| self.entries[i].is_pending()) {
                let entry = &mut self.entries[index];
                entry.category = category_of(&completion.record);
                entry.method = completion.record.request.method.clone();
                entry.state = EntryState::Completed(Arc::new(complete(completion, cache.as_ref())));
                return Intake::Updated(index);
            }
        }

        // A second completion for an absorbed start: that start was a request of its own
        if let Some((request_id, absorbed)) = self.take_absorbed(&url) {
            let cache = self.cache_info.remove(&request_id);
            tracing::debug!("Absorbed start {} completed, adding it as its own entry", request_id);

            let index = self.entries.len();
            self.entries.push(Entry {
                index,
                url,
                method: completion.record.request.method.clone(),
                category: category_of(&completion.record),
                started_at: absorbed.started_at,
                state: EntryState::Completed(Arc::new(complete(completion, cache.as_ref()))),
                visible: true,
            });
            return Intake::Appended(index);
        }

        let index = self.entries.len();
        let method = completion.record.request.method.clone();
        let category = category_of(&completion.record);
        let started_at = completion
            .record
            .started_date_time
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc));

        self.unmatched.entry(url.clone()).or_default().push_back(index);
        self.entries.push(Entry {
            index,
            url,
            method,
            category,
            started_at,
            state: EntryState::Completed(Arc::new(complete(completion, None))),
            visible: true,
        });

        Intake::Appended(index)
    }

    /// Drop all entries and tracking state
    pub fn clear(&mut self) {
        self.entries.clear();
        self.pending_by_id.clear();
        self.url_queue.clear();
        self.cache_info.clear();
        self.unmatched.clear();
        self.absorbed.clear();
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub(crate) fn entries_mut(&mut self) -> &mut [Entry] {
        &mut self.entries
    }

    pub fn get(&self, index: usize) -> Option<&Entry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pending_count(&self) -> usize {
        self.pending_by_id.len()
    }

    /// Whether any tracking state is held (pending ids, queues, cache info)
    pub fn is_tracking(&self) -> bool {
        !self.pending_by_id.is_empty()
            || !self.url_queue.is_empty()
            || !self.cache_info.is_empty()
            || !self.unmatched.is_empty()
            || !self.absorbed.is_empty()
    }

    /// Find an entry completed without a start that this late start belongs to
    ///
    /// Both sides need a start time; without one a start is never absorbed.
    fn claim_unmatched(&mut self, start: &RequestStart) -> Option<usize> {
        let started = started_at_millis(start.time_stamp)?;
        let queue = self.unmatched.get_mut(&start.url)?;
        let entries = &self.entries;

        let pos = queue.iter().position(|&i| {
            entries[i]
                .started_at
                .is_some_and(|a| (a - started).num_milliseconds().abs() <= LATE_START_WINDOW_MS)
        })?;
        let index = queue.remove(pos)?;
        if queue.is_empty() {
            self.unmatched.remove(&start.url);
        }
        Some(index)
    }

    /// Oldest absorbed start for this URL, by entry start time
    fn take_absorbed(&mut self, url: &str) -> Option<(RequestId, AbsorbedStart)> {
        let request_id = self
            .absorbed
            .iter()
            .filter(|(_, a)| a.url == url)
            .min_by_key(|(_, a)| a.started_at)
            .map(|(id, _)| id.clone())?;
        self.absorbed.remove_entry(&request_id)
    }

    fn pop_queued(&mut self, url: &str) -> Option<RequestId> {
        let queue = self.url_queue.get_mut(url)?;
        let request_id = queue.pop_front();
        if queue.is_empty() {
            self.url_queue.remove(url);
        }
        request_id
    }
}

fn started_at_millis(time_stamp: f64) -> Option<DateTime<Utc>> {
    if time_stamp > 0.0 {
        DateTime::from_timestamp_millis(time_stamp as i64)
    } else {
        None
    }
}

fn category_of(record: &CompletedRecord) -> Category {
    classify(record.resource_type.as_deref(), Some(record.mime_type()))
}

fn complete(completion: Completion, cache: Option<&CacheInfo>) -> CompletedEntry {
    CompletedEntry {
        size: SizeDisplay::from_record(&completion.record, cache),
        record: completion.record,
        fetcher: completion.fetcher,
    }
}
