//! Client library for the registry API.
//!
//! Everything a front end needs between user input and rendering: the
//! retry-wrapped fetch layer, the keyed query cache with optional persistence,
//! the debounced search controller, search session and recent-search history.
//! State containers are explicit values backed by an injectable
//! [`ClientStorage`], so each one can be exercised in isolation.

pub mod api;
pub mod cache;
pub mod fetch;
pub mod history;
pub mod persist;
pub mod search;
pub mod session;
pub mod storage;

#[cfg(test)]
pub(crate) mod mock;

pub use api::{QueryData, RegistryClient};
pub use cache::KeyedCache;
pub use fetch::{
    fetch_bytes_with_retry, fetch_with_retry, HttpResponse, HttpTransport, ReqwestTransport,
    RetryPolicy,
};
pub use history::RecentSearches;
pub use persist::QueryPersister;
pub use search::{SearchController, SearchOutcome, SearchStatus, SearchView};
pub use session::SearchSession;
pub use storage::{ClientStorage, FileStorage, MemoryStorage};

use std::time::Duration;

use thiserror::Error;

/// Client-side failure, classified for retry decisions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// HTTP 4xx: bad or missing parameters, unknown identifier. Never retried.
    #[error("Request failed: {status} {body}")]
    ClientRequest { status: u16, body: String },
    /// Network failure, HTTP 5xx or malformed body. Retried with backoff.
    #[error("{0}")]
    Transient(String),
    /// The request was superseded by a newer one.
    #[error("Request cancelled")]
    Cancelled,
    /// The configured API root cannot be used to build request URLs.
    #[error("Invalid base URL: {0}")]
    InvalidUrl(String),
    /// Local I/O failure (saving an export, writing client storage).
    #[error("I/O error: {0}")]
    Io(String),
}

impl ClientError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, ClientError::Transient(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::ClientRequest { status: 404, .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, ClientError::Cancelled)
    }
}

impl From<std::io::Error> for ClientError {
    fn from(err: std::io::Error) -> Self {
        ClientError::Io(err.to_string())
    }
}

/// Tunables for the client library.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API root, e.g. `http://127.0.0.1:8080/api/`
    pub base_url: String,
    /// Quiet period before a search input fires
    pub debounce: Duration,
    /// Freshness of the search box's local result cache
    pub search_ttl: Duration,
    /// Freshness of list and detail queries
    pub stale_time: Duration,
    /// Retention of list and detail queries before they are swept
    pub gc_time: Duration,
    pub retry: RetryPolicy,
    /// Results per page
    pub page_size: u32,
    /// Recent searches kept
    pub history_size: usize,
    /// Oldest persisted query cache that is still rehydrated
    pub persisted_max_age: Duration,
    /// Window in which persisted cache writes are coalesced
    pub persist_throttle: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080/api/".to_string(),
            debounce: Duration::from_millis(1000),
            search_ttl: Duration::from_secs(5 * 60),
            stale_time: Duration::from_secs(5 * 60),
            gc_time: Duration::from_secs(10 * 60),
            retry: RetryPolicy::default(),
            page_size: session::PAGE_SIZE,
            history_size: history::DEFAULT_MAX_RECENT,
            persisted_max_age: Duration::from_secs(24 * 60 * 60),
            persist_throttle: Duration::from_secs(1),
        }
    }
}
