//! In-memory cache bounded by entry count and TTL.
//!
//! Expiry is lazy: entries are only checked when read, so [`Cache::size`] may
//! count stale entries that nobody has touched since they expired. Eviction is
//! FIFO by insertion order, tracked through an explicit sequence index rather
//! than access recency.
//!
//! [`Cache::get_or_set`] coalesces concurrent misses for the same key into a
//! single factory call. Every waiter observes the same settled result and a
//! failed factory never populates the cache. The flight settles itself as the
//! factory finishes, whether or not any caller is still waiting on it.

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::time::{Duration, Instant};
use tracing::debug;

/// A factory panic is carried as its message so the flight stays cloneable.
type Settled<T, E> = Result<Result<T, E>, String>;
type InFlight<T, E> = Shared<BoxFuture<'static, Settled<T, E>>>;

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "cache factory panicked".to_string())
}

struct CacheEntry<T> {
    value: T,
    expires_at: Instant,
    seq: u64,
}

impl<T> CacheEntry<T> {
    fn is_fresh(&self, now: Instant) -> bool {
        now < self.expires_at
    }
}

struct Inner<T, E> {
    entries: HashMap<String, CacheEntry<T>>,
    /// Insertion sequence -> key. The first element is always the oldest entry.
    order: BTreeMap<u64, String>,
    next_seq: u64,
    /// Key -> (flight id, flight).
    in_flight: HashMap<String, (u64, InFlight<T, E>)>,
    next_flight: u64,
}

impl<T: Clone, E> Inner<T, E> {
    fn remove(&mut self, key: &str) -> Option<CacheEntry<T>> {
        let entry = self.entries.remove(key)?;
        self.order.remove(&entry.seq);
        Some(entry)
    }

    /// Returns the value when fresh; drops the entry when it has expired.
    fn fresh(&mut self, key: &str, now: Instant) -> Option<T> {
        let fresh = self.entries.get(key).map(|e| e.is_fresh(now))?;
        if fresh {
            self.entries.get(key).map(|e| e.value.clone())
        } else {
            self.remove(key);
            None
        }
    }

    /// Inserts as the newest entry. Returns the evicted key, if any.
    fn insert(&mut self, key: &str, value: T, ttl: Duration, max_entries: usize) -> Option<String> {
        self.remove(key);

        let evicted = if self.entries.len() >= max_entries {
            self.order.pop_first().map(|(_, oldest)| {
                self.entries.remove(&oldest);
                oldest
            })
        } else {
            None
        };

        let now = Instant::now();
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.insert(seq, key.to_string());
        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                expires_at: now + ttl,
                seq,
            },
        );
        evicted
    }
}

/// Entry storage shared between the cache handle and running flights.
/// Critical sections never await.
struct Shelf<T, E> {
    inner: Mutex<Inner<T, E>>,
    max_entries: usize,
    evictions: AtomicU64,
}

impl<T: Clone, E> Shelf<T, E> {
    fn lock(&self) -> MutexGuard<'_, Inner<T, E>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn store(&self, inner: &mut Inner<T, E>, key: &str, value: T, ttl: Duration) {
        if let Some(evicted) = inner.insert(key, value, ttl, self.max_entries) {
            self.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(evicted = %evicted, "Evicted oldest cache entry");
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub max_entries: usize,
    pub default_ttl_seconds: u64,
    pub hits: u64,
    pub misses: u64,
    pub coalesced: u64,
    pub evictions: u64,
}

pub struct Cache<T, E> {
    shelf: Arc<Shelf<T, E>>,
    default_ttl: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    coalesced: AtomicU64,
}

impl<T, E> Cache<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    /// A `max_entries` of zero is treated as one.
    #[must_use]
    pub fn new(max_entries: usize, default_ttl: Duration) -> Self {
        Self {
            shelf: Arc::new(Shelf {
                inner: Mutex::new(Inner {
                    entries: HashMap::new(),
                    order: BTreeMap::new(),
                    next_seq: 0,
                    in_flight: HashMap::new(),
                    next_flight: 0,
                }),
                max_entries: max_entries.max(1),
                evictions: AtomicU64::new(0),
            }),
            default_ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            coalesced: AtomicU64::new(0),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T, E>> {
        self.shelf.lock()
    }

    pub async fn set(&self, key: &str, value: T, ttl: Option<Duration>) {
        let ttl = ttl.unwrap_or(self.default_ttl);
        let mut inner = self.lock();
        self.shelf.store(&mut inner, key, value, ttl);
    }

    pub async fn get(&self, key: &str) -> Option<T> {
        let value = self.lock().fresh(key, Instant::now());
        self.record_lookup(value.is_some());
        value
    }

    /// Existence and freshness check that leaves expired entries in place.
    pub async fn has(&self, key: &str) -> bool {
        let now = Instant::now();
        self.lock().entries.get(key).is_some_and(|e| e.is_fresh(now))
    }

    pub async fn delete(&self, key: &str) -> bool {
        self.lock().remove(key).is_some()
    }

    pub async fn clear(&self) {
        let mut inner = self.lock();
        inner.entries.clear();
        inner.order.clear();
    }

    /// Number of stored entries, including expired ones not yet read.
    pub async fn size(&self) -> usize {
        self.lock().entries.len()
    }

    /// Returns the fresh cached value or runs `factory` to produce one.
    ///
    /// Callers arriving while a factory for `key` is still running wait on
    /// that same call instead of starting their own.
    ///
    /// # Errors
    ///
    /// Returns the factory's error to every coalesced caller. Nothing is
    /// cached in that case, so the next miss runs the factory again.
    pub async fn get_or_set<F, Fut>(&self, key: &str, factory: F, ttl: Option<Duration>) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let flight = {
            let mut inner = self.lock();
            if let Some(value) = inner.fresh(key, Instant::now()) {
                self.record_lookup(true);
                return Ok(value);
            }

            if let Some((_, existing)) = inner.in_flight.get(key) {
                self.coalesced.fetch_add(1, Ordering::Relaxed);
                metrics::counter!("cache_requests_total", "result" => "coalesced").increment(1);
                debug!(key, "Joining in-flight cache population");
                existing.clone()
            } else {
                self.record_lookup(false);
                let id = inner.next_flight;
                inner.next_flight += 1;
                let ttl = ttl.unwrap_or(self.default_ttl);
                let flight = self.launch(key, id, factory(), ttl);
                inner.in_flight.insert(key.to_string(), (id, flight.clone()));
                flight
            }
        };

        match flight.await {
            Ok(result) => result,
            Err(message) => std::panic::resume_unwind(Box::new(message)),
        }
    }

    /// Wraps `work` so that finishing it clears the in-flight marker and
    /// stores a successful value in the same step.
    fn launch<Fut>(&self, key: &str, id: u64, work: Fut, ttl: Duration) -> InFlight<T, E>
    where
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let shelf = Arc::downgrade(&self.shelf);
        let key = key.to_string();

        async move {
            let settled: Settled<T, E> = AssertUnwindSafe(work)
                .catch_unwind()
                .await
                .map_err(|payload| panic_message(payload.as_ref()));

            if let Some(shelf) = Weak::upgrade(&shelf) {
                let mut inner = shelf.lock();
                if inner.in_flight.get(&key).is_some_and(|(current, _)| *current == id) {
                    inner.in_flight.remove(&key);
                    if let Ok(Ok(value)) = &settled {
                        shelf.store(&mut inner, &key, value.clone(), ttl);
                    }
                }
            }

            settled
        }
        .boxed()
        .shared()
    }

    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.size().await,
            max_entries: self.shelf.max_entries,
            default_ttl_seconds: self.default_ttl.as_secs(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            evictions: self.shelf.evictions.load(Ordering::Relaxed),
        }
    }

    fn record_lookup(&self, hit: bool) {
        if hit {
            self.hits.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("cache_requests_total", "result" => "hit").increment(1);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            metrics::counter!("cache_requests_total", "result" => "miss").increment(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    type TestCache = Cache<String, String>;

    fn cache(max: usize) -> TestCache {
        Cache::new(max, Duration::from_secs(60))
    }

    #[tokio::test(start_paused = true)]
    async fn get_respects_ttl() {
        let cache = cache(10);
        cache
            .set("k", "v".to_string(), Some(Duration::from_secs(5)))
            .await;

        tokio::time::advance(Duration::from_millis(4_999)).await;
        assert_eq!(cache.get("k").await.as_deref(), Some("v"));

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_eq!(cache.get("k").await, None);
    }

    #[tokio::test(start_paused = true)]
    async fn size_counts_stale_entries_until_read() {
        let cache = cache(10);
        cache
            .set("k", "v".to_string(), Some(Duration::from_secs(1)))
            .await;
        tokio::time::advance(Duration::from_secs(2)).await;

        assert!(!cache.has("k").await);
        assert_eq!(cache.size().await, 1);

        assert_eq!(cache.get("k").await, None);
        assert_eq!(cache.size().await, 0);
    }

    #[tokio::test]
    async fn default_ttl_applies_when_none_given() {
        let cache: TestCache = Cache::new(4, Duration::from_secs(30));
        cache.set("k", "v".to_string(), None).await;
        assert!(cache.has("k").await);
    }

    #[tokio::test]
    async fn overflow_evicts_oldest_insertion() {
        let cache = cache(3);
        for key in ["a", "b", "c"] {
            cache.set(key, key.to_uppercase(), None).await;
        }
        // Reading "a" must not protect it: eviction is by insertion, not access.
        assert!(cache.get("a").await.is_some());

        cache.set("d", "D".to_string(), None).await;

        assert_eq!(cache.size().await, 3);
        assert_eq!(cache.get("a").await, None);
        for key in ["b", "c", "d"] {
            assert!(cache.get(key).await.is_some(), "{key} should survive");
        }
        assert_eq!(cache.stats().await.evictions, 1);
    }

    #[tokio::test]
    async fn overwrite_moves_key_to_newest() {
        let cache = cache(2);
        cache.set("a", "1".to_string(), None).await;
        cache.set("b", "2".to_string(), None).await;
        cache.set("a", "3".to_string(), None).await;
        assert_eq!(cache.size().await, 2);

        cache.set("c", "4".to_string(), None).await;
        assert_eq!(cache.get("b").await, None);
        assert_eq!(cache.get("a").await.as_deref(), Some("3"));
        assert_eq!(cache.get("c").await.as_deref(), Some("4"));
    }

    #[tokio::test]
    async fn delete_and_clear() {
        let cache = cache(4);
        cache.set("a", "1".to_string(), None).await;
        cache.set("b", "2".to_string(), None).await;

        assert!(cache.delete("a").await);
        assert!(!cache.delete("a").await);
        assert_eq!(cache.size().await, 1);

        cache.clear().await;
        assert_eq!(cache.size().await, 0);
        assert!(!cache.has("b").await);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_get_or_set_runs_factory_once() {
        let cache = Arc::new(cache(10));
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks = (0..8).map(|_| {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            async move {
                cache
                    .get_or_set(
                        "shared",
                        move || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(50)).await;
                            Ok::<_, String>("value".to_string())
                        },
                        None,
                    )
                    .await
            }
        });
        let results = futures::future::join_all(tasks).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| r.as_deref() == Ok("value")));
        assert_eq!(cache.get("shared").await.as_deref(), Some("value"));

        let stats = cache.stats().await;
        assert_eq!(stats.coalesced, 7);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_factory_reaches_all_waiters_and_is_not_cached() {
        let cache = Arc::new(cache(10));
        let calls = Arc::new(AtomicUsize::new(0));

        let tasks = (0..4).map(|_| {
            let cache = Arc::clone(&cache);
            let calls = Arc::clone(&calls);
            async move {
                cache
                    .get_or_set(
                        "broken",
                        move || async move {
                            calls.fetch_add(1, Ordering::SeqCst);
                            tokio::time::sleep(Duration::from_millis(10)).await;
                            Err::<String, _>("upstream down".to_string())
                        },
                        None,
                    )
                    .await
            }
        });
        let results = futures::future::join_all(tasks).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|r| r == &Err("upstream down".to_string())));
        assert_eq!(cache.size().await, 0);

        // The marker is gone, so the next miss retries.
        let retried = cache
            .get_or_set("broken", || async { Ok::<_, String>("ok".to_string()) }, None)
            .await;
        assert_eq!(retried.as_deref(), Ok("ok"));
    }

    #[tokio::test]
    async fn get_or_set_serves_fresh_value_without_factory() {
        let cache = cache(4);
        cache.set("k", "cached".to_string(), None).await;
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let value = cache
            .get_or_set(
                "k",
                move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, String>("fresh".to_string())
                },
                None,
            )
            .await;
        assert_eq!(value.as_deref(), Ok("cached"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(cache.stats().await.hits, 1);
    }

    fn explode() -> Result<String, String> {
        panic!("factory blew up")
    }

    #[tokio::test]
    async fn panicking_factory_does_not_wedge_key() {
        let cache = Arc::new(cache(4));

        let task = tokio::spawn({
            let cache = Arc::clone(&cache);
            async move {
                cache
                    .get_or_set(
                        "k",
                        || async { explode() },
                        None,
                    )
                    .await
            }
        });
        let err = task.await.unwrap_err();
        assert!(err.is_panic());

        let value = cache
            .get_or_set("k", || async { Ok::<_, String>("ok".to_string()) }, None)
            .await;
        assert_eq!(value.as_deref(), Ok("ok"));
    }

    #[tokio::test]
    async fn flight_settles_when_no_caller_is_left() {
        let cache = cache(4);
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        let mut leader = Box::pin(cache.get_or_set(
            "k",
            move || async move {
                let _ = rx.await;
                Err::<String, _>("upstream down".to_string())
            },
            None,
        ));
        assert!(futures::poll!(&mut leader).is_pending());

        let flight = cache
            .lock()
            .in_flight
            .get("k")
            .map(|(_, f)| f.clone())
            .unwrap();
        drop(leader);

        tx.send(()).unwrap();
        assert_eq!(flight.await, Ok(Err("upstream down".to_string())));
        assert!(cache.lock().in_flight.is_empty());

        let value = cache
            .get_or_set("k", || async { Ok::<_, String>("fresh".to_string()) }, None)
            .await;
        assert_eq!(value.as_deref(), Ok("fresh"));
        assert_eq!(cache.stats().await.coalesced, 0);
    }
}
