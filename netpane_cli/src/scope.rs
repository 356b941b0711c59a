//! Domain scope: which requests belong to the inspected page

use async_trait::async_trait;
use netpane_common::constants;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use url::Url;

/// Host of a URL, `None` for malformed or host-less URLs
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url).ok()?.host_str().map(str::to_string)
}

/// True iff the URL's host equals `scope_host` exactly
pub fn belongs_to_scope(url: &str, scope_host: &str) -> bool {
    !scope_host.is_empty() && host_of(url).as_deref() == Some(scope_host)
}

/// URL path, falling back to the raw string when the URL does not parse
pub fn path_of(url: &str) -> String {
    match Url::parse(url) {
        Ok(u) => u.path().to_string(),
        Err(_) => url.to_string(),
    }
}

/// Origin scope of the inspected page
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "host", rename_all = "lowercase")]
pub enum Scope {
    /// Resolution has not finished yet
    #[default]
    Unresolved,
    Known(String),
    /// Resolution gave up; nothing is in scope until the next navigation
    Unknown,
}

impl Scope {
    pub fn contains(&self, url: &str) -> bool {
        match self {
            Scope::Known(host) => belongs_to_scope(url, host),
            Scope::Unresolved | Scope::Unknown => false,
        }
    }

    pub fn host(&self) -> Option<&str> {
        match self {
            Scope::Known(host) => Some(host.as_str()),
            _ => None,
        }
    }

    /// Label for status bars
    pub fn label(&self) -> &str {
        match self {
            Scope::Known(host) => host.as_str(),
            Scope::Unresolved => "(resolving)",
            Scope::Unknown => "(unknown)",
        }
    }
}

/// Scope resolution errors
#[derive(Debug, Error)]
pub enum ScopeError {
    #[error("Inspected page has no host yet")]
    NoHost,

    #[error("Host lookup failed: {0}")]
    Lookup(String),
}

/// Reads the host of the currently inspected page
#[async_trait]
pub trait HostResolver: Send + Sync {
    async fn resolve_current_host(&self) -> Result<String, ScopeError>;
}

/// Resolver for a host known up front
#[derive(Debug, Clone)]
pub struct StaticHost(pub Option<String>);

impl StaticHost {
    /// Resolver for the host of a page URL
    pub fn from_page_url(url: Option<&str>) -> Self {
        Self(url.and_then(host_of))
    }
}

#[async_trait]
impl HostResolver for StaticHost {
    async fn resolve_current_host(&self) -> Result<String, ScopeError> {
        self.0.clone().ok_or(ScopeError::NoHost)
    }
}

/// Retry bounds for scope resolution
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: constants::SCOPE_RESOLVE_ATTEMPTS,
            delay: Duration::from_millis(constants::SCOPE_RETRY_DELAY_MS),
        }
    }
}

/// Shared counter of scope resolution epochs
///
/// Every navigation advances the epoch; a resolution loop holding an older
/// ticket is superseded.
#[derive(Debug, Clone, Default)]
pub struct ScopeEpoch(Arc<AtomicU64>);

impl ScopeEpoch {
    /// Start a new epoch, superseding all outstanding tickets
    pub fn advance(&self) -> ScopeTicket {
        let epoch = self.0.fetch_add(1, Ordering::SeqCst) + 1;
        ScopeTicket {
            epoch,
            tracker: self.clone(),
        }
    }

    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }
}

/// Handle for one scope resolution attempt
#[derive(Debug, Clone)]
pub struct ScopeTicket {
    epoch: u64,
    tracker: ScopeEpoch,
}

impl ScopeTicket {
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_current(&self) -> bool {
        self.tracker.current() == self.epoch
    }
}

/// Resolve the inspected page's host with bounded retries
///
/// Returns `None` when the ticket was superseded before resolution finished.
pub async fn resolve_scope<R>(resolver: &R, policy: RetryPolicy, ticket: &ScopeTicket) -> Option<Scope>
where
    R: HostResolver + ?Sized,
{
    let attempts = policy.attempts.max(1);

    for attempt in 1..=attempts {
        if !ticket.is_current() {
            tracing::debug!("Scope resolution epoch {} superseded", ticket.epoch());
            return None;
        }

        match resolver.resolve_current_host().await {
            Ok(host) if !host.is_empty() => {
                // Parsed URL hosts are lowercase
                let host = host.to_ascii_lowercase();
                tracing::debug!("Resolved scope host {} on attempt {}", host, attempt);
                return ticket.is_current().then_some(Scope::Known(host));
            }
            Ok(_) => tracing::debug!("Scope attempt {}/{}: empty host", attempt, attempts),
            Err(e) => tracing::debug!("Scope attempt {}/{}: {}", attempt, attempts, e),
        }

        if attempt < attempts {
            tokio::time::sleep(policy.delay).await;
        }
    }

    tracing::warn!("Could not resolve inspected host after {} attempts", attempts);
    ticket.is_current().then_some(Scope::Unknown)
}
