//! Recent-search history.

use std::sync::Arc;

use super::storage::{load_json, store_json, ClientStorage};

/// Storage key for the history list.
pub const RECENT_SEARCHES_KEY: &str = "recentSearches";

/// Entries kept by default.
pub const DEFAULT_MAX_RECENT: usize = 5;

/// Most-recent-first list of distinct search terms, bounded and persisted.
pub struct RecentSearches {
    entries: Vec<String>,
    max: usize,
    storage: Arc<dyn ClientStorage>,
}

impl RecentSearches {
    /// Load the persisted list, keeping at most `max` entries.
    pub fn load(storage: Arc<dyn ClientStorage>, max: usize) -> Self {
        let mut entries: Vec<String> =
            load_json(storage.as_ref(), RECENT_SEARCHES_KEY).unwrap_or_default();
        entries.retain(|entry| !entry.trim().is_empty());
        entries.truncate(max);

        Self {
            entries,
            max,
            storage,
        }
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    /// Record a term. Blank terms are ignored; a repeated term moves to the front.
    pub fn add(&mut self, term: &str) {
        let term = term.trim();
        if term.is_empty() {
            return;
        }

        self.entries.retain(|entry| entry != term);
        self.entries.insert(0, term.to_string());
        self.entries.truncate(self.max);
        self.persist();
    }

    pub fn remove(&mut self, term: &str) {
        let before = self.entries.len();
        self.entries.retain(|entry| entry != term);
        if self.entries.len() != before {
            self.persist();
        }
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        if let Err(e) = self.storage.remove(RECENT_SEARCHES_KEY) {
            tracing::warn!("Failed to clear recent searches: {}", e);
        }
    }

    fn persist(&self) {
        if let Err(e) = store_json(self.storage.as_ref(), RECENT_SEARCHES_KEY, &self.entries) {
            tracing::warn!("Failed to save recent searches: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::storage::MemoryStorage;

    fn history() -> (Arc<MemoryStorage>, RecentSearches) {
        let storage = Arc::new(MemoryStorage::new());
        let history = RecentSearches::load(storage.clone(), DEFAULT_MAX_RECENT);
        (storage, history)
    }

    #[test]
    fn test_most_recent_first_and_bounded() {
        let (_, mut history) = history();
        for term in ["a", "b", "c", "d", "e", "f"] {
            history.add(term);
        }
        assert_eq!(history.entries(), ["f", "e", "d", "c", "b"]);
    }

    #[test]
    fn test_repeat_moves_to_front() {
        let (_, mut history) = history();
        history.add("acme");
        history.add("globex");
        history.add("acme");
        assert_eq!(history.entries(), ["acme", "globex"]);
    }

    #[test]
    fn test_blank_terms_are_ignored() {
        let (storage, mut history) = history();
        history.add("   ");
        history.add("");
        assert!(history.entries().is_empty());
        assert!(storage.get(RECENT_SEARCHES_KEY).is_none());
    }

    #[test]
    fn test_persisted_across_loads() {
        let (storage, mut history) = history();
        history.add("acme");
        history.add("initech");
        history.remove("acme");

        let reloaded = RecentSearches::load(storage.clone(), DEFAULT_MAX_RECENT);
        assert_eq!(reloaded.entries(), ["initech"]);

        let mut reloaded = reloaded;
        reloaded.clear();
        assert!(RecentSearches::load(storage, DEFAULT_MAX_RECENT)
            .entries()
            .is_empty());
    }
}
