//! Adjacent-page prefetching.
//!
//! After a page is shown, [`Prefetcher::warm`] schedules background fetches
//! for the page before and after it so that paging feels instant. Warming is
//! best effort: failures never reach the caller, only the configured
//! [`PrefetchObserver`].

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use feedcache_core::{FeedError, FeedResult, StorageError};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::task::JoinHandle;

use super::key::CacheKey;
use super::read_through::FetchCache;
use super::store::KeyedStore;

/// What happened to one page the prefetcher was asked to warm.
#[derive(Debug, Clone, PartialEq)]
pub enum PrefetchOutcome {
    /// Fetched and stored.
    Warmed,
    /// A valid entry already existed; no fetch.
    AlreadyCached,
    /// Another warm call is fetching the same key; no fetch.
    InFlight,
    /// The cache was cleared while fetching; the result was dropped.
    Discarded,
    /// The fetch or the store write failed. Nothing was cached.
    Failed(FeedError),
}

/// Hook for observing background prefetch results.
pub trait PrefetchObserver: Send + Sync {
    fn on_outcome(&self, page: u32, key: &CacheKey, outcome: &PrefetchOutcome);
}

/// Default observer: logs every outcome, failures at `warn`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl PrefetchObserver for TracingObserver {
    fn on_outcome(&self, page: u32, key: &CacheKey, outcome: &PrefetchOutcome) {
        match outcome {
            PrefetchOutcome::Warmed => tracing::debug!(page, %key, "prefetched page"),
            PrefetchOutcome::AlreadyCached
            | PrefetchOutcome::InFlight
            | PrefetchOutcome::Discarded => {
                tracing::trace!(page, %key, ?outcome, "prefetch skipped")
            }
            PrefetchOutcome::Failed(e) => tracing::warn!(page, %key, error = %e, "prefetch failed"),
        }
    }
}

/// Handle to the background tasks started by one [`Prefetcher::warm`] call.
///
/// Dropping the handle detaches the tasks; they still run to completion
/// unless [`abort`](PrefetchHandle::abort) is called first.
#[derive(Debug)]
pub struct PrefetchHandle {
    tasks: Vec<JoinHandle<(u32, PrefetchOutcome)>>,
}

impl PrefetchHandle {
    fn noop() -> Self {
        Self { tasks: Vec::new() }
    }

    /// True if nothing was scheduled (no neighbours, prefetch disabled, or no
    /// runtime).
    pub fn is_noop(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Number of pages scheduled.
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// True once every scheduled page has been handled.
    pub fn is_finished(&self) -> bool {
        self.tasks.iter().all(JoinHandle::is_finished)
    }

    /// Cancel every task that has not finished yet.
    pub fn abort(&self) {
        for task in &self.tasks {
            task.abort();
        }
    }

    /// Wait for every scheduled page and return its outcome. Aborted tasks
    /// contribute nothing.
    pub async fn join(self) -> Vec<(u32, PrefetchOutcome)> {
        let mut outcomes = Vec::with_capacity(self.tasks.len());
        for task in self.tasks {
            match task.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) if e.is_cancelled() => {}
                Err(e) => tracing::warn!(error = %e, "prefetch task did not complete"),
            }
        }
        outcomes
    }
}

/// Releases an in-flight claim when the warming task ends, however it ends.
struct InFlightGuard {
    in_flight: Arc<Mutex<HashSet<String>>>,
    key: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if let Ok(mut in_flight) = self.in_flight.lock() {
            in_flight.remove(&self.key);
        }
    }
}

/// Warms the pages adjacent to the one just shown.
pub struct Prefetcher<S: KeyedStore> {
    cache: FetchCache<S>,
    in_flight: Arc<Mutex<HashSet<String>>>,
    observer: Arc<dyn PrefetchObserver>,
}

impl<S: KeyedStore + 'static> Prefetcher<S> {
    /// Create a prefetcher writing into `cache`, logging through tracing.
    pub fn new(cache: FetchCache<S>) -> Self {
        Self {
            cache,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            observer: Arc::new(TracingObserver),
        }
    }

    /// Replace the outcome observer.
    pub fn with_observer(mut self, observer: Arc<dyn PrefetchObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Whether a warm for `key` is currently fetching.
    pub fn is_in_flight(&self, key: &CacheKey) -> bool {
        self.in_flight
            .lock()
            .map(|set| set.contains(&key.encode()))
            .unwrap_or(false)
    }

    /// Schedule warming of `current - 1` and `current + 1`, where they exist.
    ///
    /// Each neighbour is handled in its own task: wait the configured delay,
    /// derive the key, skip if already cached or already being warmed,
    /// otherwise fetch and store with `ttl`. Returns immediately.
    pub fn warm<T, K, F, Fut>(
        &self,
        current: u32,
        total_pages: u32,
        ttl: Duration,
        key_for: K,
        fetch: F,
    ) -> PrefetchHandle
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        K: Fn(u32) -> CacheKey + Send + Sync + 'static,
        F: Fn(u32) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FeedResult<T>> + Send + 'static,
    {
        if !self.cache.config().prefetch_enabled {
            return PrefetchHandle::noop();
        }

        let mut pages = Vec::with_capacity(2);
        if current.saturating_add(1) < total_pages {
            pages.push(current + 1);
        }
        if current >= 1 {
            pages.push(current - 1);
        }
        if pages.is_empty() {
            return PrefetchHandle::noop();
        }

        let runtime = match tokio::runtime::Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                tracing::warn!(current, "no tokio runtime, skipping prefetch");
                return PrefetchHandle::noop();
            }
        };

        let delay = self.cache.config().prefetch_delay;
        let key_for = Arc::new(key_for);
        let fetch = Arc::new(fetch);

        let tasks = pages
            .into_iter()
            .map(|page| {
                let cache = self.cache.clone();
                let in_flight = Arc::clone(&self.in_flight);
                let observer = Arc::clone(&self.observer);
                let key_for = Arc::clone(&key_for);
                let fetch = Arc::clone(&fetch);

                runtime.spawn(async move {
                    tokio::time::sleep(delay).await;
                    let key = key_for(page);
                    let outcome =
                        warm_page(&cache, &in_flight, &key, ttl, || fetch(page)).await;
                    observer.on_outcome(page, &key, &outcome);
                    (page, outcome)
                })
            })
            .collect();

        PrefetchHandle { tasks }
    }
}

async fn warm_page<S, T, F, Fut>(
    cache: &FetchCache<S>,
    in_flight: &Arc<Mutex<HashSet<String>>>,
    key: &CacheKey,
    ttl: Duration,
    fetch: F,
) -> PrefetchOutcome
where
    S: KeyedStore,
    T: Serialize,
    F: FnOnce() -> Fut,
    Fut: Future<Output = FeedResult<T>>,
{
    let encoded = key.encode();
    let _guard = {
        let mut set = match in_flight.lock() {
            Ok(set) => set,
            Err(_) => return PrefetchOutcome::Failed(StorageError::LockPoisoned.into()),
        };
        if !set.insert(encoded.clone()) {
            return PrefetchOutcome::InFlight;
        }
        InFlightGuard {
            in_flight: Arc::clone(in_flight),
            key: encoded,
        }
    };

    if cache.contains_valid(key) {
        return PrefetchOutcome::AlreadyCached;
    }

    let generation = cache.generation();
    let value = match fetch().await {
        Ok(value) => value,
        Err(e) => return PrefetchOutcome::Failed(e),
    };
    match cache.put_if_current(key, &value, ttl, generation) {
        Ok(true) => PrefetchOutcome::Warmed,
        Ok(false) => PrefetchOutcome::Discarded,
        Err(e) => PrefetchOutcome::Failed(e),
    }
}

impl<S: KeyedStore> Clone for Prefetcher<S> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            in_flight: Arc::clone(&self.in_flight),
            observer: Arc::clone(&self.observer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::clock::ManualClock;
    use crate::cache::key::ViewerScope;
    use crate::cache::read_through::CacheConfig;
    use crate::cache::store::InMemorySessionStore;
    use feedcache_core::{TransportError, ViewerId};
    use std::sync::atomic::{AtomicUsize, Ordering};

    const TTL: Duration = Duration::from_secs(60);

    #[derive(Default)]
    struct RecordingObserver {
        seen: Mutex<Vec<(u32, PrefetchOutcome)>>,
    }

    impl PrefetchObserver for RecordingObserver {
        fn on_outcome(&self, page: u32, _key: &CacheKey, outcome: &PrefetchOutcome) {
            self.seen.lock().unwrap().push((page, outcome.clone()));
        }
    }

    fn setup(config: CacheConfig) -> (FetchCache<InMemorySessionStore>, Prefetcher<InMemorySessionStore>) {
        let cache = FetchCache::new(
            Arc::new(InMemorySessionStore::new()),
            Arc::new(ManualClock::default()),
            config,
        );
        let prefetcher = Prefetcher::new(cache.clone());
        (cache, prefetcher)
    }

    fn key_for(page: u32) -> CacheKey {
        CacheKey::page("posts/all", ViewerScope::viewer(ViewerId::from("alice")), page, 9)
    }

    /// A fetch that counts calls per page and returns the page number.
    fn counting_fetch(
        calls: Arc<Mutex<Vec<u32>>>,
    ) -> impl Fn(u32) -> std::future::Ready<FeedResult<u32>> + Send + Sync + 'static {
        move |page| {
            calls.lock().unwrap().push(page);
            std::future::ready(Ok(page))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_page_warms_only_next() {
        let (cache, prefetcher) = setup(CacheConfig::default());
        let calls = Arc::new(Mutex::new(Vec::new()));

        let handle = prefetcher.warm(0, 3, TTL, key_for, counting_fetch(calls.clone()));
        assert_eq!(handle.len(), 1);
        assert_eq!(handle.join().await, vec![(1, PrefetchOutcome::Warmed)]);

        assert_eq!(*calls.lock().unwrap(), vec![1]);
        assert_eq!(cache.peek::<u32>(&key_for(1)), Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_delay_before_fetching() {
        let (cache, prefetcher) = setup(CacheConfig::default());
        let calls = Arc::new(Mutex::new(Vec::new()));

        let handle = prefetcher.warm(1, 3, TTL, key_for, counting_fetch(calls.clone()));
        tokio::time::sleep(Duration::from_millis(299)).await;
        assert!(calls.lock().unwrap().is_empty());
        assert!(!cache.contains_valid(&key_for(2)));

        let mut outcomes = handle.join().await;
        outcomes.sort_by_key(|(page, _)| *page);
        assert_eq!(
            outcomes,
            vec![(0, PrefetchOutcome::Warmed), (2, PrefetchOutcome::Warmed)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_warm_fetches_each_page_once() {
        let (_cache, prefetcher) = setup(CacheConfig::default());
        let calls = Arc::new(Mutex::new(Vec::new()));

        let first = prefetcher.warm(2, 5, TTL, key_for, counting_fetch(calls.clone()));
        let second = prefetcher.warm(2, 5, TTL, key_for, counting_fetch(calls.clone()));
        first.join().await;
        let skipped = second.join().await;

        let mut fetched = calls.lock().unwrap().clone();
        fetched.sort_unstable();
        assert_eq!(fetched, vec![1, 3]);
        assert!(skipped.iter().all(|(_, outcome)| matches!(
            outcome,
            PrefetchOutcome::AlreadyCached | PrefetchOutcome::InFlight
        )));
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_flight_page_is_not_fetched_twice() {
        let (_cache, prefetcher) = setup(CacheConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));

        let slow_fetch = {
            let calls = calls.clone();
            move |page: u32| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    Ok::<u32, FeedError>(page)
                }
            }
        };

        let first = prefetcher.warm(0, 2, TTL, key_for, slow_fetch.clone());
        let second = prefetcher.warm(0, 2, TTL, key_for, slow_fetch);
        let mut outcomes = first.join().await;
        outcomes.extend(second.join().await);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(outcomes.contains(&(1, PrefetchOutcome::Warmed)));
        assert!(outcomes.contains(&(1, PrefetchOutcome::InFlight)));
        assert!(!prefetcher.is_in_flight(&key_for(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_swallowed_and_observed() {
        let (cache, prefetcher) = setup(CacheConfig::default());
        let observer = Arc::new(RecordingObserver::default());
        let prefetcher = prefetcher.with_observer(observer.clone());

        let handle = prefetcher.warm(0, 2, TTL, key_for, |_page| async {
            Err::<u32, FeedError>(
                TransportError::RequestFailed {
                    url: "http://backend/api/posts/all".to_string(),
                    reason: "connection refused".to_string(),
                }
                .into(),
            )
        });
        let outcomes = handle.join().await;

        assert!(matches!(outcomes.as_slice(), [(1, PrefetchOutcome::Failed(_))]));
        assert!(!cache.contains_valid(&key_for(1)));
        assert_eq!(observer.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_while_fetching_drops_result() {
        let (cache, prefetcher) = setup(CacheConfig::default());
        let slow_fetch = |page: u32| async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            Ok::<u32, FeedError>(page)
        };

        let handle = prefetcher.warm(0, 2, TTL, key_for, slow_fetch);
        tokio::time::sleep(Duration::from_millis(500)).await;
        cache.clear().unwrap();

        assert_eq!(handle.join().await, vec![(1, PrefetchOutcome::Discarded)]);
        assert!(cache.store().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_abort_cancels_pending_pages() {
        let (cache, prefetcher) = setup(CacheConfig::default());
        let calls = Arc::new(Mutex::new(Vec::new()));

        let handle = prefetcher.warm(1, 3, TTL, key_for, counting_fetch(calls.clone()));
        handle.abort();
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert!(handle.join().await.is_empty());
        assert!(calls.lock().unwrap().is_empty());
        assert!(cache.store().is_empty());
        assert!(!prefetcher.is_in_flight(&key_for(0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_page_and_disabled_are_noops() {
        let (_cache, prefetcher) = setup(CacheConfig::default());
        let calls = Arc::new(Mutex::new(Vec::new()));
        assert!(prefetcher
            .warm(0, 1, TTL, key_for, counting_fetch(calls.clone()))
            .is_noop());

        let (_cache, disabled) = setup(CacheConfig::default().with_prefetch(false));
        assert!(disabled
            .warm(1, 3, TTL, key_for, counting_fetch(calls.clone()))
            .is_noop());
        assert!(calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_without_runtime_is_noop() {
        let (_cache, prefetcher) = setup(CacheConfig::default());
        let handle = prefetcher.warm(1, 3, TTL, key_for, |page| async move { Ok::<u32, FeedError>(page) });
        assert!(handle.is_noop());
    }
}
