//! Search session: the filters and page a user is looking at.
//!
//! Every change is written to client storage so a restart resumes on the same
//! page. Changing any filter field sends the user back to page 1.

use std::sync::Arc;

use crate::models::{FilterValue, SearchFilters};

use super::storage::{load_json, store_json, ClientStorage};

pub const FILTERS_KEY: &str = "companyFinderFilters";
pub const PAGE_KEY: &str = "companyFinderPage";

/// Fixed number of results per page.
pub const PAGE_SIZE: u32 = 12;

pub struct SearchSession {
    filters: SearchFilters,
    page: u32,
    storage: Arc<dyn ClientStorage>,
}

impl SearchSession {
    /// Fresh session with default filters on page 1. Nothing is persisted until a change.
    pub fn new(storage: Arc<dyn ClientStorage>) -> Self {
        Self {
            filters: SearchFilters::default(),
            page: 1,
            storage,
        }
    }

    /// Resume from storage, falling back to defaults for anything missing or unreadable.
    pub fn restore(storage: Arc<dyn ClientStorage>) -> Self {
        let filters = load_json(storage.as_ref(), FILTERS_KEY).unwrap_or_default();
        let page = load_json::<u32>(storage.as_ref(), PAGE_KEY)
            .unwrap_or(1)
            .max(1);

        Self {
            filters,
            page,
            storage,
        }
    }

    pub fn filters(&self) -> &SearchFilters {
        &self.filters
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn page_size(&self) -> u32 {
        PAGE_SIZE
    }

    /// Row offset of the current page, capped at `u32::MAX`.
    pub fn offset(&self) -> u32 {
        self.page.saturating_sub(1).saturating_mul(PAGE_SIZE)
    }

    pub fn set_query(&mut self, query: impl Into<String>) {
        let query = query.into();
        if self.filters.query != query {
            self.filters.query = query;
            self.filters_changed();
        }
    }

    pub fn set_industry(&mut self, industry: FilterValue) {
        if self.filters.industry != industry {
            self.filters.industry = industry;
            self.filters_changed();
        }
    }

    pub fn set_state(&mut self, state: FilterValue) {
        if self.filters.state != state {
            self.filters.state = state;
            self.filters_changed();
        }
    }

    pub fn set_status(&mut self, status: FilterValue) {
        if self.filters.status != status {
            self.filters.status = status;
            self.filters_changed();
        }
    }

    /// Replace all filters at once; the page resets if anything differs.
    pub fn set_filters(&mut self, filters: SearchFilters) {
        if self.filters != filters {
            self.filters = filters;
            self.filters_changed();
        }
    }

    pub fn set_page(&mut self, page: u32) {
        let page = page.max(1);
        if self.page != page {
            self.page = page;
            self.persist_page();
        }
    }

    pub fn next_page(&mut self) {
        self.set_page(self.page.saturating_add(1));
    }

    pub fn previous_page(&mut self) {
        self.set_page(self.page.saturating_sub(1));
    }

    /// Pages needed to show `total` results, at least one.
    pub fn total_pages(total: u64) -> u64 {
        total.div_ceil(u64::from(PAGE_SIZE)).max(1)
    }

    fn filters_changed(&mut self) {
        self.page = 1;
        if let Err(e) = store_json(self.storage.as_ref(), FILTERS_KEY, &self.filters) {
            tracing::warn!("Failed to save search filters: {}", e);
        }
        self.persist_page();
    }

    fn persist_page(&self) {
        if let Err(e) = store_json(self.storage.as_ref(), PAGE_KEY, &self.page) {
            tracing::warn!("Failed to save search page: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::storage::MemoryStorage;

    #[test]
    fn test_filter_change_resets_page() {
        let mut session = SearchSession::new(Arc::new(MemoryStorage::new()));
        session.set_page(4);
        assert_eq!(session.page(), 4);
        assert_eq!(session.offset(), 36);

        session.set_state(FilterValue::only("NSW"));
        assert_eq!(session.page(), 1);

        session.set_page(2);
        session.set_query("acme");
        assert_eq!(session.page(), 1);

        session.set_page(3);
        session.set_status(FilterValue::All);
        assert_eq!(session.page(), 3, "unchanged value keeps the page");
    }

    #[test]
    fn test_paging_never_goes_below_one() {
        let mut session = SearchSession::new(Arc::new(MemoryStorage::new()));
        session.previous_page();
        assert_eq!(session.page(), 1);
        session.next_page();
        session.next_page();
        assert_eq!(session.page(), 3);
        session.set_page(0);
        assert_eq!(session.page(), 1);
    }

    #[test]
    fn test_total_pages() {
        assert_eq!(SearchSession::total_pages(0), 1);
        assert_eq!(SearchSession::total_pages(12), 1);
        assert_eq!(SearchSession::total_pages(15), 2);
    }

    #[test]
    fn test_restore_after_reload() {
        let storage: Arc<dyn ClientStorage> = Arc::new(MemoryStorage::new());

        let mut session = SearchSession::new(storage.clone());
        session.set_query("acme");
        session.set_industry(FilterValue::only("Mining"));
        session.set_page(2);

        let restored = SearchSession::restore(storage.clone());
        assert_eq!(restored.filters().query, "acme");
        assert_eq!(restored.filters().industry, FilterValue::only("Mining"));
        assert!(restored.filters().state.is_all());
        assert_eq!(restored.page(), 2);

        let persisted = storage.get(FILTERS_KEY).unwrap();
        assert!(persisted.contains("\"state\":\"all\""));
    }

    #[test]
    fn test_restore_with_corrupt_state() {
        let storage: Arc<dyn ClientStorage> = Arc::new(MemoryStorage::new());
        storage.set(FILTERS_KEY, "{oops".into()).unwrap();
        storage.set(PAGE_KEY, "0".into()).unwrap();

        let session = SearchSession::restore(storage);
        assert_eq!(session.filters(), &SearchFilters::default());
        assert_eq!(session.page(), 1);
    }

    #[test]
    fn test_huge_restored_page_saturates_offset() {
        let storage: Arc<dyn ClientStorage> = Arc::new(MemoryStorage::new());
        storage.set(PAGE_KEY, u32::MAX.to_string()).unwrap();

        let mut session = SearchSession::restore(storage);
        assert_eq!(session.page(), u32::MAX);
        assert_eq!(session.offset(), u32::MAX);

        session.next_page();
        assert_eq!(session.page(), u32::MAX);
    }
}
