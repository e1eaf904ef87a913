//! Keyed async deduplicator with a TTL cache.
//!
//! A lookup is served from cache while the entry is younger than `stale_time`.
//! Otherwise at most one fetch per key is in flight: concurrent callers for the
//! same key await the same shared future. Only successful results are stored.
//! Stale entries stay readable through [`KeyedCache::peek`] until they are
//! older than `gc_time` and a sweep removes them.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::ClientError;

type InFlight<V> = Shared<BoxFuture<'static, Result<V, ClientError>>>;

struct Entry<V> {
    value: V,
    stored_at: Instant,
}

struct Inner<V> {
    entries: HashMap<String, Entry<V>>,
    in_flight: HashMap<String, InFlight<V>>,
}

/// Shared handle; clones refer to the same cache.
pub struct KeyedCache<V> {
    inner: Arc<Mutex<Inner<V>>>,
    stale_time: Duration,
    gc_time: Duration,
}

impl<V> Clone for KeyedCache<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            stale_time: self.stale_time,
            gc_time: self.gc_time,
        }
    }
}

impl<V: Clone + Send + Sync + 'static> KeyedCache<V> {
    pub fn new(stale_time: Duration, gc_time: Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                entries: HashMap::new(),
                in_flight: HashMap::new(),
            })),
            stale_time,
            gc_time: gc_time.max(stale_time),
        }
    }

    /// Cache whose entries are fresh and retained for the same duration.
    pub fn with_ttl(ttl: Duration) -> Self {
        Self::new(ttl, ttl)
    }

    pub fn stale_time(&self) -> Duration {
        self.stale_time
    }

    fn lock(&self) -> MutexGuard<'_, Inner<V>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The cached value if it is still fresh.
    pub fn get_fresh(&self, key: &str) -> Option<V> {
        let inner = self.lock();
        inner
            .entries
            .get(key)
            .filter(|entry| entry.stored_at.elapsed() < self.stale_time)
            .map(|entry| entry.value.clone())
    }

    /// The cached value, fresh or stale, unless it is past retention.
    pub fn peek(&self, key: &str) -> Option<V> {
        let inner = self.lock();
        inner
            .entries
            .get(key)
            .filter(|entry| entry.stored_at.elapsed() < self.gc_time)
            .map(|entry| entry.value.clone())
    }

    pub fn insert(&self, key: impl Into<String>, value: V) {
        self.lock().entries.insert(
            key.into(),
            Entry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    /// Insert a value that was stored `age` ago, e.g. when rehydrating.
    ///
    /// Returns `false` and skips the entry when `age` reaches back further
    /// than the monotonic clock can represent.
    pub fn restore(&self, key: impl Into<String>, value: V, age: Duration) -> bool {
        let Some(stored_at) = Instant::now().checked_sub(age) else {
            return false;
        };
        self.lock()
            .entries
            .insert(key.into(), Entry { value, stored_at });
        true
    }

    /// Stop handing out the in-flight fetch for `key` to new callers.
    ///
    /// Callers already awaiting it still receive its result; the next lookup
    /// starts a fresh fetch.
    pub fn abandon(&self, key: &str) {
        self.lock().in_flight.remove(key);
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.lock().in_flight.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Retained entries with their age, oldest first.
    pub fn snapshot(&self) -> Vec<(String, V, Duration)> {
        let inner = self.lock();
        let mut entries: Vec<(String, V, Duration)> = inner
            .entries
            .iter()
            .map(|(key, entry)| (key.clone(), entry.value.clone(), entry.stored_at.elapsed()))
            .filter(|(_, _, age)| *age < self.gc_time)
            .collect();
        entries.sort_by(|a, b| b.2.cmp(&a.2));
        entries
    }

    /// Serve a fresh entry, join an in-flight fetch for the key, or start one.
    pub async fn get_or_fetch<F, Fut>(&self, key: &str, fetch: F) -> Result<V, ClientError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<V, ClientError>> + Send + 'static,
    {
        let request = {
            let mut inner = self.lock();
            if let Some(entry) = inner.entries.get(key) {
                if entry.stored_at.elapsed() < self.stale_time {
                    tracing::debug!("Cache hit for {}", key);
                    return Ok(entry.value.clone());
                }
            }

            match inner.in_flight.get(key) {
                Some(existing) => {
                    tracing::debug!("Joining in-flight request for {}", key);
                    existing.clone()
                }
                None => {
                    let request = fetch().boxed().shared();
                    inner.in_flight.insert(key.to_string(), request.clone());
                    request
                }
            }
        };

        let result = request.clone().await;

        let mut inner = self.lock();
        if inner
            .in_flight
            .get(key)
            .is_some_and(|current| current.ptr_eq(&request))
        {
            inner.in_flight.remove(key);
        }
        if let Ok(value) = &result {
            inner.entries.insert(
                key.to_string(),
                Entry {
                    value: value.clone(),
                    stored_at: Instant::now(),
                },
            );
        }
        result
    }

    /// Remove entries older than the retention window. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        sweep_entries(&self.inner, self.gc_time)
    }

    /// Sweep every `interval` until the cache is dropped.
    pub fn spawn_sweeper(&self, interval: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(&self.inner);
        let gc_time = self.gc_time;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let removed = sweep_entries(&inner, gc_time);
                if removed > 0 {
                    tracing::debug!("Swept {} expired cache entries", removed);
                }
            }
        })
    }
}

fn sweep_entries<V>(inner: &Mutex<Inner<V>>, gc_time: Duration) -> usize {
    let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
    let before = inner.entries.len();
    inner
        .entries
        .retain(|_, entry| entry.stored_at.elapsed() < gc_time);
    before - inner.entries.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TTL: Duration = Duration::from_secs(300);

    fn counting_fetch(
        counter: &Arc<AtomicUsize>,
        value: &'static str,
    ) -> impl Future<Output = Result<String, ClientError>> + Send + 'static {
        let counter = Arc::clone(counter);
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(value.to_string())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_within_ttl_fetches_once() {
        let cache = KeyedCache::with_ttl(TTL);
        let calls = Arc::new(AtomicUsize::new(0));

        let first = cache
            .get_or_fetch("q=acme", || counting_fetch(&calls, "page"))
            .await
            .unwrap();
        tokio::time::advance(Duration::from_secs(60)).await;
        let second = cache
            .get_or_fetch("q=acme", || counting_fetch(&calls, "other"))
            .await
            .unwrap();

        assert_eq!(first, "page");
        assert_eq!(second, "page");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_is_refetched() {
        let cache = KeyedCache::with_ttl(TTL);
        let calls = Arc::new(AtomicUsize::new(0));

        cache
            .get_or_fetch("q=acme", || counting_fetch(&calls, "old"))
            .await
            .unwrap();
        tokio::time::advance(TTL + Duration::from_secs(1)).await;
        let value = cache
            .get_or_fetch("q=acme", || counting_fetch(&calls, "new"))
            .await
            .unwrap();

        assert_eq!(value, "new");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_fetch() {
        let cache = KeyedCache::with_ttl(TTL);
        let calls = Arc::new(AtomicUsize::new(0));

        let (a, b) = tokio::join!(
            cache.get_or_fetch("q=acme", || counting_fetch(&calls, "shared")),
            cache.get_or_fetch("q=acme", || counting_fetch(&calls, "duplicate")),
        );

        assert_eq!(a.unwrap(), "shared");
        assert_eq!(b.unwrap(), "shared");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!cache.is_in_flight("q=acme"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failures_are_not_cached() {
        let cache: KeyedCache<String> = KeyedCache::with_ttl(TTL);
        let calls = Arc::new(AtomicUsize::new(0));

        let failing = Arc::clone(&calls);
        let result = cache
            .get_or_fetch("q=acme", || async move {
                failing.fetch_add(1, Ordering::SeqCst);
                Err(ClientError::Transient("503".into()))
            })
            .await;
        assert!(result.is_err());
        assert!(cache.is_empty());

        let cancelled = cache
            .get_or_fetch("q=acme", || async { Err(ClientError::Cancelled) })
            .await;
        assert_eq!(cancelled.unwrap_err(), ClientError::Cancelled);
        assert!(cache.is_empty());

        cache
            .get_or_fetch("q=acme", || counting_fetch(&calls, "ok"))
            .await
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_fetch_is_not_joined() {
        let cache = KeyedCache::with_ttl(TTL);
        let calls = Arc::new(AtomicUsize::new(0));

        let first = cache.get_or_fetch("q=acme", || counting_fetch(&calls, "first"));
        let second = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            cache.abandon("q=acme");
            cache
                .get_or_fetch("q=acme", || counting_fetch(&calls, "second"))
                .await
        };
        let (a, b) = tokio::join!(first, second);

        assert_eq!(a.unwrap(), "first");
        assert_eq!(b.unwrap(), "second");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_entries_are_peekable_until_swept() {
        let cache = KeyedCache::new(Duration::from_secs(60), Duration::from_secs(600));
        cache.insert("q=acme", "page".to_string());

        tokio::time::advance(Duration::from_secs(120)).await;
        assert!(cache.get_fresh("q=acme").is_none());
        assert_eq!(cache.peek("q=acme").as_deref(), Some("page"));
        assert_eq!(cache.sweep(), 0);

        tokio::time::advance(Duration::from_secs(600)).await;
        assert!(cache.peek("q=acme").is_none());
        assert_eq!(cache.sweep(), 1);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_restore_keeps_age() {
        let cache = KeyedCache::new(Duration::from_secs(60), Duration::from_secs(600));
        assert!(cache.restore("recent", "page".to_string(), Duration::from_secs(5)));
        assert_eq!(cache.get_fresh("recent").as_deref(), Some("page"));

        assert!(!cache.restore("ancient", "page".to_string(), Duration::MAX));
        assert!(cache.peek("ancient").is_none());
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sweeper() {
        let cache = KeyedCache::with_ttl(TTL);
        cache.insert("q=acme", "page".to_string());
        let sweeper = cache.spawn_sweeper(TTL);

        tokio::time::sleep(TTL * 2 + Duration::from_secs(1)).await;
        assert!(cache.is_empty());

        drop(cache);
        tokio::time::sleep(TTL * 2).await;
        assert!(sweeper.is_finished());
    }
}
