//! Persistence of the query cache across restarts.
//!
//! The whole cache is written as one JSON blob tagged with a version string.
//! On start-up the blob is rehydrated only when its tag matches and it is
//! younger than the configured maximum age; anything else is discarded.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::cache::KeyedCache;
use super::storage::{load_json, store_json, ClientStorage};
use super::ClientError;

pub const QUERY_CACHE_KEY: &str = "companyFinder.queryCache";

/// Bump when the shape of cached data changes.
pub const CACHE_BUSTER: &str = "v1";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedCache<V> {
    buster: String,
    /// Unix milliseconds when the blob was written
    timestamp: i64,
    entries: Vec<PersistedEntry<V>>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PersistedEntry<V> {
    key: String,
    data: V,
    updated_at: i64,
}

/// Writes a [`KeyedCache`] to client storage and reads it back.
pub struct QueryPersister<V> {
    cache: KeyedCache<V>,
    storage: Arc<dyn ClientStorage>,
    max_age: Duration,
    throttle: Duration,
    pending: Arc<AtomicBool>,
}

impl<V> Clone for QueryPersister<V> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            storage: Arc::clone(&self.storage),
            max_age: self.max_age,
            throttle: self.throttle,
            pending: Arc::clone(&self.pending),
        }
    }
}

impl<V> QueryPersister<V>
where
    V: Clone + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    pub fn new(
        cache: KeyedCache<V>,
        storage: Arc<dyn ClientStorage>,
        max_age: Duration,
        throttle: Duration,
    ) -> Self {
        Self {
            cache,
            storage,
            max_age,
            throttle,
            pending: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Load persisted entries into the cache. Returns how many were restored.
    pub fn restore(&self) -> usize {
        let Some(blob) = load_json::<PersistedCache<V>>(self.storage.as_ref(), QUERY_CACHE_KEY)
        else {
            return 0;
        };

        let now = Utc::now().timestamp_millis();
        let max_age_ms = i64::try_from(self.max_age.as_millis()).unwrap_or(i64::MAX);

        if blob.buster != CACHE_BUSTER || now.saturating_sub(blob.timestamp) >= max_age_ms {
            tracing::debug!("Discarding persisted query cache (buster {})", blob.buster);
            if let Err(e) = self.storage.remove(QUERY_CACHE_KEY) {
                tracing::warn!("Failed to discard persisted query cache: {}", e);
            }
            return 0;
        }

        let mut restored = 0;
        for entry in blob.entries {
            let age_ms = now.saturating_sub(entry.updated_at).max(0);
            if age_ms >= max_age_ms {
                continue;
            }
            let age = Duration::from_millis(u64::try_from(age_ms).unwrap_or(0));
            if self.cache.restore(entry.key, entry.data, age) {
                restored += 1;
            }
        }

        tracing::debug!("Restored {} persisted queries", restored);
        restored
    }

    /// Write the current cache contents immediately.
    pub fn persist_now(&self) -> Result<(), ClientError> {
        let now = Utc::now().timestamp_millis();
        let entries = self
            .cache
            .snapshot()
            .into_iter()
            .map(|(key, data, age)| PersistedEntry {
                key,
                data,
                updated_at: now - i64::try_from(age.as_millis()).unwrap_or(0),
            })
            .collect();

        let blob = PersistedCache {
            buster: CACHE_BUSTER.to_string(),
            timestamp: now,
            entries,
        };
        store_json(self.storage.as_ref(), QUERY_CACHE_KEY, &blob)
    }

    /// Persist after the throttle window; calls inside the window share one write.
    pub fn schedule_persist(&self) {
        if self.pending.swap(true, Ordering::AcqRel) {
            return;
        }

        let persister = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(persister.throttle).await;
            persister.pending.store(false, Ordering::Release);
            if let Err(e) = persister.persist_now() {
                tracing::warn!("Failed to persist query cache: {}", e);
            }
        });
    }
}
