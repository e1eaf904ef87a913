//! Debounced search box controller.
//!
//! [`SearchController::submit`] is meant to be called on every keystroke or
//! filter change. After the input has been quiet for the debounce period the
//! latest submission is dispatched:
//!
//! 1. a canonical key is built from the filters, page and page size;
//! 2. a key equal to the last dispatched one is suppressed;
//! 3. a fresh cached page is served without touching the network;
//! 4. a request already in flight for the key is joined;
//! 5. otherwise the live request is cancelled and a new one issued.
//!
//! Results are published on a [`watch`] channel. A generation counter makes
//! sure a response belonging to a superseded dispatch is never published, and
//! while a request is loading the previous results stay visible.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::api::RegistryClient;
use super::cache::KeyedCache;
use super::history::RecentSearches;
use super::storage::ClientStorage;
use super::{ClientConfig, ClientError};
use crate::models::{Company, CompanyPage, SearchFilters};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStatus {
    Idle,
    Loading,
    Ready,
    Failed,
}

/// What a presentation layer renders for the search box.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchView {
    pub status: SearchStatus,
    pub companies: Vec<Company>,
    pub total: u64,
    pub has_more: bool,
    pub filters: SearchFilters,
    pub page: u32,
    pub error: Option<ClientError>,
}

impl Default for SearchView {
    fn default() -> Self {
        Self {
            status: SearchStatus::Idle,
            companies: Vec::new(),
            total: 0,
            has_more: false,
            filters: SearchFilters::default(),
            page: 1,
            error: None,
        }
    }
}

/// How a single dispatch ended.
#[derive(Debug, Clone, PartialEq)]
pub enum SearchOutcome {
    /// Same key as the previous dispatch; nothing happened.
    Suppressed,
    /// Served from the local cache.
    Cached(CompanyPage),
    /// Fetched (or joined an in-flight fetch) and published.
    Fetched(CompanyPage),
    /// Cancelled by a newer dispatch.
    Cancelled,
    /// Completed after a newer dispatch; the result was cached but not published.
    Superseded,
    Failed(ClientError),
}

struct LiveRequest {
    key: String,
    cancel: CancellationToken,
}

#[derive(Default)]
struct DispatchState {
    debounce_seq: u64,
    last_dispatched: Option<String>,
    generation: u64,
    live: Option<LiveRequest>,
}

struct Inner {
    client: RegistryClient,
    cache: KeyedCache<CompanyPage>,
    view: watch::Sender<SearchView>,
    debounce: Duration,
    page_size: u32,
    history: Mutex<RecentSearches>,
    dispatch: Mutex<DispatchState>,
}

/// Cheap to clone; clones drive the same search box.
#[derive(Clone)]
pub struct SearchController {
    inner: Arc<Inner>,
}

impl SearchController {
    pub fn new(
        client: RegistryClient,
        config: &ClientConfig,
        storage: Arc<dyn ClientStorage>,
    ) -> Self {
        let (view, _) = watch::channel(SearchView::default());

        Self {
            inner: Arc::new(Inner {
                client,
                cache: KeyedCache::with_ttl(config.search_ttl),
                view,
                debounce: config.debounce,
                page_size: config.page_size,
                history: Mutex::new(RecentSearches::load(storage, config.history_size)),
                dispatch: Mutex::new(DispatchState::default()),
            }),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SearchView> {
        self.inner.view.subscribe()
    }

    pub fn view(&self) -> SearchView {
        self.inner.view.borrow().clone()
    }

    pub fn cache(&self) -> &KeyedCache<CompanyPage> {
        &self.inner.cache
    }

    /// Purge expired results every TTL until the controller is dropped.
    pub fn start_cache_sweeper(&self) -> JoinHandle<()> {
        self.inner
            .cache
            .spawn_sweeper(self.inner.cache.stale_time())
    }

    pub fn recent_searches(&self) -> Vec<String> {
        self.history().entries().to_vec()
    }

    pub fn remove_recent_search(&self, term: &str) {
        self.history().remove(term);
    }

    pub fn clear_recent_searches(&self) {
        self.history().clear();
    }

    /// Queue a search. It is dispatched once no newer submission arrives
    /// within the debounce period; the handle yields `None` if it was replaced.
    pub fn submit(&self, filters: SearchFilters, page: u32) -> JoinHandle<Option<SearchOutcome>> {
        let seq = {
            let mut dispatch = self.dispatch();
            dispatch.debounce_seq += 1;
            dispatch.debounce_seq
        };

        let controller = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(controller.inner.debounce).await;
            let latest = controller.dispatch().debounce_seq;
            if latest != seq {
                return None;
            }
            Some(controller.search_now(filters, page).await)
        })
    }

    /// Dispatch a search immediately, skipping the debounce.
    pub async fn search_now(&self, filters: SearchFilters, page: u32) -> SearchOutcome {
        let page = page.max(1);
        let limit = self.inner.page_size;
        let key = filters.cache_key(page, limit);

        let (generation, cancel) = {
            let mut dispatch = self.dispatch();
            if dispatch.last_dispatched.as_deref() == Some(key.as_str()) {
                tracing::debug!("Suppressed repeated search {}", key);
                return SearchOutcome::Suppressed;
            }
            dispatch.last_dispatched = Some(key.clone());
            dispatch.generation += 1;

            if let Some(cached) = self.inner.cache.get_fresh(&key) {
                tracing::debug!("Serving search {} from cache", key);
                self.publish_page(&filters, page, &cached);
                drop(dispatch);
                self.record_history(&filters);
                return SearchOutcome::Cached(cached);
            }

            let joinable = dispatch
                .live
                .as_ref()
                .filter(|live| live.key == key && !live.cancel.is_cancelled())
                .map(|live| live.cancel.clone());

            let cancel = match joinable {
                Some(cancel) => cancel,
                None => {
                    if let Some(previous) = dispatch.live.take() {
                        previous.cancel.cancel();
                        self.inner.cache.abandon(&previous.key);
                        tracing::debug!("Cancelled superseded search {}", previous.key);
                    }
                    let cancel = CancellationToken::new();
                    dispatch.live = Some(LiveRequest {
                        key: key.clone(),
                        cancel: cancel.clone(),
                    });
                    cancel
                }
            };

            self.publish_loading(&filters, page);
            (dispatch.generation, cancel)
        };

        let client = self.inner.client.clone();
        let request_filters = filters.clone();
        let result = self
            .inner
            .cache
            .get_or_fetch(&key, move || async move {
                client
                    .fetch_companies(&request_filters, page, limit, &cancel)
                    .await
            })
            .await;

        let mut dispatch = self.dispatch();
        let current = dispatch.generation == generation;

        match result {
            Err(ref err) if err.is_cancelled() => {
                tracing::debug!("Search {} cancelled", key);
                SearchOutcome::Cancelled
            }
            _ if !current => {
                tracing::debug!("Discarding superseded search {}", key);
                SearchOutcome::Superseded
            }
            Ok(data) => {
                dispatch.live = None;
                self.publish_page(&filters, page, &data);
                drop(dispatch);
                self.record_history(&filters);
                SearchOutcome::Fetched(data)
            }
            Err(err) => {
                dispatch.live = None;
                dispatch.last_dispatched = None;
                tracing::warn!("Search {} failed: {}", key, err);
                self.publish_error(&filters, page, &err);
                SearchOutcome::Failed(err)
            }
        }
    }

    fn dispatch(&self) -> MutexGuard<'_, DispatchState> {
        self.inner
            .dispatch
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn history(&self) -> MutexGuard<'_, RecentSearches> {
        self.inner
            .history
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Writes to client storage; call without the dispatch lock held.
    fn record_history(&self, filters: &SearchFilters) {
        if let Some(query) = filters.query_constraint() {
            self.history().add(query);
        }
    }

    fn publish_loading(&self, filters: &SearchFilters, page: u32) {
        self.inner.view.send_modify(|view| {
            view.status = SearchStatus::Loading;
            view.filters = filters.clone();
            view.page = page;
            view.error = None;
        });
    }

    fn publish_page(&self, filters: &SearchFilters, page: u32, data: &CompanyPage) {
        self.inner.view.send_modify(|view| {
            view.status = SearchStatus::Ready;
            view.companies = data.companies.clone();
            view.total = data.total;
            view.has_more = data.has_more;
            view.filters = filters.clone();
            view.page = page;
            view.error = None;
        });
    }

    fn publish_error(&self, filters: &SearchFilters, page: u32, err: &ClientError) {
        self.inner.view.send_modify(|view| {
            view.status = SearchStatus::Failed;
            view.filters = filters.clone();
            view.page = page;
            view.error = Some(err.clone());
        });
    }
}
