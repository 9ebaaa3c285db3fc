//! Session-scoped key/value store.
//!
//! The store is the only shared mutable state in the cache. Implementations
//! serialise access internally, so the get-decode-validate-fetch-store
//! sequence in [`FetchCache`](super::FetchCache) can race only in the
//! documented last-write-wins way.

use std::collections::BTreeMap;
use std::sync::RwLock;

use feedcache_core::{FeedResult, StorageError};

/// Key/value persistence surface with string keys and serialized values.
///
/// # Contract
///
/// - Missing keys are not errors: `get` returns `None`, `remove` returns `false`.
/// - A `set` is visible to every subsequent `get` on the same store.
/// - Entries live as long as the session that owns the store.
pub trait KeyedStore: Send + Sync {
    /// Write a serialized value, replacing any previous one.
    fn set(&self, key: &str, serialized: &str) -> FeedResult<()>;

    /// Read a serialized value.
    fn get(&self, key: &str) -> FeedResult<Option<String>>;

    /// Delete a key. Returns whether anything was removed.
    fn remove(&self, key: &str) -> FeedResult<bool>;

    /// All keys currently stored.
    fn keys(&self) -> FeedResult<Vec<String>>;

    /// Delete every key starting with `prefix`. Returns the number removed.
    fn remove_prefix(&self, prefix: &str) -> FeedResult<u64> {
        let mut removed = 0u64;
        for key in self.keys()?.iter().filter(|k| k.starts_with(prefix)) {
            if self.remove(key)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Delete everything. Returns the number removed.
    fn clear(&self) -> FeedResult<u64> {
        self.remove_prefix("")
    }
}

/// In-memory store whose lifetime is the owning session object.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    entries: RwLock<BTreeMap<String, String>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyedStore for InMemorySessionStore {
    fn set(&self, key: &str, serialized: &str) -> FeedResult<()> {
        let mut entries = self.entries.write().map_err(|_| StorageError::LockPoisoned)?;
        entries.insert(key.to_string(), serialized.to_string());
        Ok(())
    }

    fn get(&self, key: &str) -> FeedResult<Option<String>> {
        let entries = self.entries.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn remove(&self, key: &str) -> FeedResult<bool> {
        let mut entries = self.entries.write().map_err(|_| StorageError::LockPoisoned)?;
        Ok(entries.remove(key).is_some())
    }

    fn keys(&self) -> FeedResult<Vec<String>> {
        let entries = self.entries.read().map_err(|_| StorageError::LockPoisoned)?;
        Ok(entries.keys().cloned().collect())
    }

    fn remove_prefix(&self, prefix: &str) -> FeedResult<u64> {
        let mut entries = self.entries.write().map_err(|_| StorageError::LockPoisoned)?;
        let doomed: Vec<String> = entries
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            entries.remove(key);
        }
        Ok(doomed.len() as u64)
    }

    fn clear(&self) -> FeedResult<u64> {
        let mut entries = self.entries.write().map_err(|_| StorageError::LockPoisoned)?;
        let count = entries.len() as u64;
        entries.clear();
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_get_remove() {
        let store = InMemorySessionStore::new();
        store.set("a", "1").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));

        store.set("a", "2").unwrap();
        assert_eq!(store.get("a").unwrap().as_deref(), Some("2"));

        assert!(store.remove("a").unwrap());
        assert!(store.get("a").unwrap().is_none());
    }

    #[test]
    fn test_missing_keys_are_not_errors() {
        let store = InMemorySessionStore::new();
        assert!(store.get("nope").unwrap().is_none());
        assert!(!store.remove("nope").unwrap());
    }

    #[test]
    fn test_remove_prefix_is_exact() {
        let store = InMemorySessionStore::new();
        store.set("comments_post_42|anon|p0:10", "x").unwrap();
        store.set("comments_post_42|anon|p1:10", "x").unwrap();
        store.set("comments_post_7|anon|p0:10", "x").unwrap();
        store.set("posts/all|anon|p0:9", "x").unwrap();

        assert_eq!(store.remove_prefix("comments_post_42").unwrap(), 2);
        let keys = store.keys().unwrap();
        assert_eq!(keys.len(), 2);
        assert!(keys.iter().all(|k| !k.starts_with("comments_post_42")));
    }

    #[test]
    fn test_clear() {
        let store = InMemorySessionStore::new();
        store.set("a", "1").unwrap();
        store.set("b", "2").unwrap();
        assert_eq!(store.clear().unwrap(), 2);
        assert!(store.is_empty());
    }

    /// A store relying on the trait's default prefix removal.
    #[derive(Default)]
    struct MinimalStore(InMemorySessionStore);

    impl KeyedStore for MinimalStore {
        fn set(&self, key: &str, serialized: &str) -> FeedResult<()> {
            self.0.set(key, serialized)
        }
        fn get(&self, key: &str) -> FeedResult<Option<String>> {
            self.0.get(key)
        }
        fn remove(&self, key: &str) -> FeedResult<bool> {
            self.0.remove(key)
        }
        fn keys(&self) -> FeedResult<Vec<String>> {
            self.0.keys()
        }
    }

    #[test]
    fn test_default_remove_prefix_and_clear() {
        let store = MinimalStore::default();
        store.set("x:1", "a").unwrap();
        store.set("x:2", "b").unwrap();
        store.set("y:1", "c").unwrap();

        assert_eq!(store.remove_prefix("x:").unwrap(), 2);
        assert_eq!(store.keys().unwrap(), vec!["y:1".to_string()]);
        assert_eq!(store.clear().unwrap(), 1);
        assert!(store.keys().unwrap().is_empty());
    }
}
