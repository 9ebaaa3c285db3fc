//! Read-through cache over a session store.
//!
//! This module implements the core caching logic: serve a valid entry if one
//! exists, otherwise run the caller's fetch, store the result with a TTL and
//! return it.

use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use feedcache_core::{FeedResult, StorageError};
use serde::de::{DeserializeOwned, IgnoredAny};
use serde::Serialize;

use super::clock::{Clock, SystemClock};
use super::entry::{decode_entry, encode_entry, CacheEntry, Decoded};
use super::key::CacheKey;
use super::store::KeyedStore;

/// Configuration for the read-through cache and its prefetcher.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// TTL for post listings when the caller does not pick one.
    pub default_ttl: Duration,
    /// TTL for comment pages, which change faster than post listings.
    pub comments_ttl: Duration,
    /// Delay before warming adjacent pages.
    pub prefetch_delay: Duration,
    /// Whether adjacent pages are warmed at all.
    pub prefetch_enabled: bool,
    /// Prepended to every stored key so several caches can share one store.
    pub namespace: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            default_ttl: Duration::from_secs(60),
            comments_ttl: Duration::from_secs(30),
            prefetch_delay: Duration::from_millis(300),
            prefetch_enabled: true,
            namespace: String::new(),
        }
    }
}

impl CacheConfig {
    /// Create a new cache config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the default TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = ttl;
        self
    }

    /// Set the comment page TTL.
    pub fn with_comments_ttl(mut self, ttl: Duration) -> Self {
        self.comments_ttl = ttl;
        self
    }

    /// Set the prefetch delay.
    pub fn with_prefetch_delay(mut self, delay: Duration) -> Self {
        self.prefetch_delay = delay;
        self
    }

    /// Enable or disable prefetching.
    pub fn with_prefetch(mut self, enabled: bool) -> Self {
        self.prefetch_enabled = enabled;
        self
    }

    /// Set the key namespace.
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Reads served from the store.
    pub hits: u64,
    /// Reads that had to fetch.
    pub misses: u64,
    /// Entries found expired and removed on access.
    pub expired: u64,
    /// Corrupt entries removed on access.
    pub healed: u64,
    /// Fetches that failed and were propagated.
    pub fetch_failures: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Read-through cache.
///
/// Cheap to clone; clones share the store, clock and statistics.
///
/// # Concurrency
///
/// Two reads of the same key that both miss will both fetch, and the later
/// write wins. Entries are idempotent snapshots of server state, so this is
/// the accepted behavior rather than a lost update.
///
/// A value fetched before [`clear`](Self::clear) is never stored after it:
/// every clear starts a new generation, and writes carry the generation
/// they were fetched in.
pub struct FetchCache<S: KeyedStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    config: CacheConfig,
    stats: Arc<RwLock<CacheStats>>,
    generation: Arc<RwLock<u64>>,
}

impl<S: KeyedStore> FetchCache<S> {
    /// Create a new read-through cache.
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, config: CacheConfig) -> Self {
        Self {
            store,
            clock,
            config,
            stats: Arc::new(RwLock::new(CacheStats::default())),
            generation: Arc::new(RwLock::new(0)),
        }
    }

    /// Create a cache on the system clock with default configuration.
    pub fn with_defaults(store: Arc<S>) -> Self {
        Self::new(store, Arc::new(SystemClock), CacheConfig::default())
    }

    /// Get the cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Get a reference to the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Current clear generation. Pass it to
    /// [`put_if_current`](Self::put_if_current) to drop writes that raced a
    /// clear.
    pub fn generation(&self) -> u64 {
        self.generation.read().map(|g| *g).unwrap_or(u64::MAX)
    }

    /// Snapshot of the usage counters.
    pub fn stats(&self) -> CacheStats {
        self.stats.read().map(|s| s.clone()).unwrap_or_default()
    }

    /// Return the cached value for `key` if valid, otherwise fetch, store and
    /// return it.
    ///
    /// A failing `fetch` is propagated and nothing is written, so a transport
    /// error never turns into a cached empty result.
    pub async fn read<T, F, Fut>(&self, key: &CacheKey, ttl: Duration, fetch: F) -> FeedResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = FeedResult<T>>,
    {
        let encoded = self.storage_key(&key.encode());

        if let Some(entry) = self.lookup::<T>(&encoded) {
            self.record(|s| s.hits += 1);
            tracing::debug!(key = %encoded, "cache hit");
            return Ok(entry.into_value());
        }

        self.record(|s| s.misses += 1);
        tracing::debug!(key = %encoded, "cache miss, fetching");
        let generation = self.generation();

        let value = match fetch().await {
            Ok(value) => value,
            Err(e) => {
                self.record(|s| s.fetch_failures += 1);
                tracing::debug!(key = %encoded, error = %e, "fetch failed, nothing cached");
                return Err(e);
            }
        };

        if let Err(e) = self.store_in_generation(&encoded, &value, ttl, generation) {
            tracing::warn!(key = %encoded, error = %e, "failed to store fetched value");
        }
        Ok(value)
    }

    /// The cached value for `key` if it is present and valid. Never fetches.
    pub fn peek<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        self.lookup::<T>(&self.storage_key(&key.encode()))
            .map(CacheEntry::into_value)
    }

    /// Whether `key` currently holds a valid entry, without decoding the value
    /// into a concrete type.
    pub fn contains_valid(&self, key: &CacheKey) -> bool {
        self.lookup::<IgnoredAny>(&self.storage_key(&key.encode()))
            .is_some()
    }

    /// Write `value` under `key`, replacing any previous entry.
    pub fn put<T: Serialize>(&self, key: &CacheKey, value: &T, ttl: Duration) -> FeedResult<()> {
        self.store_value(&self.storage_key(&key.encode()), value, ttl)
    }

    /// Like [`put`](Self::put), but only if no clear happened since
    /// `generation` was read. Returns whether the value was stored.
    pub fn put_if_current<T: Serialize>(
        &self,
        key: &CacheKey,
        value: &T,
        ttl: Duration,
        generation: u64,
    ) -> FeedResult<bool> {
        self.store_in_generation(&self.storage_key(&key.encode()), value, ttl, generation)
    }

    /// Remove a single key.
    pub fn invalidate(&self, key: &CacheKey) -> FeedResult<()> {
        let encoded = self.storage_key(&key.encode());
        if self.store.remove(&encoded)? {
            tracing::debug!(key = %encoded, "invalidated");
        }
        Ok(())
    }

    /// Remove every key starting with `prefix`. Returns the number removed.
    pub fn invalidate_prefix(&self, prefix: &str) -> FeedResult<u64> {
        let removed = self.store.remove_prefix(&self.storage_key(prefix))?;
        tracing::debug!(prefix, removed, "invalidated prefix");
        Ok(removed)
    }

    /// Remove everything in this cache's namespace, e.g. when the viewer
    /// changes.
    pub fn clear(&self) -> FeedResult<u64> {
        // Held across the removal so no older-generation write lands after it.
        let mut generation = self
            .generation
            .write()
            .map_err(|_| StorageError::LockPoisoned)?;
        *generation += 1;
        let removed = if self.config.namespace.is_empty() {
            self.store.clear()?
        } else {
            self.store.remove_prefix(&self.config.namespace)?
        };
        tracing::info!(removed, generation = *generation, "cache cleared");
        Ok(removed)
    }

    fn storage_key(&self, encoded: &str) -> String {
        format!("{}{}", self.config.namespace, encoded)
    }

    /// Look up and validate an entry, deleting it if it is corrupt or expired.
    fn lookup<T: DeserializeOwned>(&self, encoded: &str) -> Option<CacheEntry<T>> {
        let raw = match self.store.get(encoded) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(key = %encoded, error = %e, "session store read failed, treating as miss");
                return None;
            }
        };

        match decode_entry::<T>(&raw) {
            Decoded::Entry(entry) if entry.is_valid(self.clock.now()) => Some(entry),
            Decoded::Entry(_) => {
                self.record(|s| s.expired += 1);
                self.discard(encoded);
                None
            }
            Decoded::Corrupt(reason) => {
                self.record(|s| s.healed += 1);
                tracing::warn!(key = %encoded, %reason, "removing corrupt cache entry");
                self.discard(encoded);
                None
            }
        }
    }

    fn store_value<T: Serialize>(&self, encoded: &str, value: &T, ttl: Duration) -> FeedResult<()> {
        let serialized = encode_entry(value, ttl, self.clock.now()).map_err(|e| {
            StorageError::SerializationFailed {
                key: encoded.to_string(),
                reason: e.to_string(),
            }
        })?;
        self.store.set(encoded, &serialized)
    }

    fn store_in_generation<T: Serialize>(
        &self,
        encoded: &str,
        value: &T,
        ttl: Duration,
        generation: u64,
    ) -> FeedResult<bool> {
        let current = self
            .generation
            .read()
            .map_err(|_| StorageError::LockPoisoned)?;
        if *current != generation {
            tracing::debug!(key = %encoded, "cache cleared while fetching, not storing");
            return Ok(false);
        }
        self.store_value(encoded, value, ttl)?;
        Ok(true)
    }

    fn discard(&self, encoded: &str) {
        if let Err(e) = self.store.remove(encoded) {
            tracing::warn!(key = %encoded, error = %e, "failed to remove stale cache entry");
        }
    }

    fn record(&self, update: impl FnOnce(&mut CacheStats)) {
        if let Ok(mut stats) = self.stats.write() {
            update(&mut stats);
        }
    }
}

impl<S: KeyedStore> Clone for FetchCache<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            config: self.config.clone(),
            stats: Arc::clone(&self.stats),
            generation: Arc::clone(&self.generation),
        }
    }
}
