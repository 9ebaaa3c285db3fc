//! LMDB-backed session store.
//!
//! Uses the heed crate (Rust bindings for LMDB) to keep cache entries in a
//! per-session directory, so a restarted client process in the same session
//! finds its warm cache again. The caller owns the directory and removes it
//! when the session ends.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The store uses:
//! - Read transactions for `get` and `keys`
//! - Write transactions for `set`, `remove`, `remove_prefix` and `clear`

use std::path::Path;

use feedcache_core::{FeedResult, StorageError};
use heed::types::Str;
use heed::{Database, Env, EnvOpenOptions};

use super::store::KeyedStore;

fn txn_error(e: heed::Error) -> StorageError {
    StorageError::TransactionFailed {
        reason: e.to_string(),
    }
}

/// LMDB-backed [`KeyedStore`].
///
/// # Example
///
/// ```ignore
/// use feedcache_storage::{FetchCache, LmdbSessionStore};
///
/// let store = LmdbSessionStore::new("/tmp/feedcache-session", 64)?;
/// let cache = FetchCache::with_defaults(Arc::new(store));
/// ```
pub struct LmdbSessionStore {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Str, Str>,
}

impl LmdbSessionStore {
    /// Open (or create) a session store.
    ///
    /// # Arguments
    ///
    /// * `path` - Session directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, StorageError> {
        let display = path.as_ref().display().to_string();
        let open_failed = |reason: String| StorageError::OpenFailed {
            path: display.clone(),
            reason,
        };

        std::fs::create_dir_all(&path).map_err(|e| open_failed(e.to_string()))?;

        // SAFETY: the session directory is owned by this process for the
        // lifetime of the session; no other code maps the same files.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| open_failed(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_error)?;
        let db: Database<Str, Str> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| open_failed(e.to_string()))?;
        wtxn.commit().map_err(txn_error)?;

        Ok(Self { env, db })
    }

    /// Number of stored entries.
    pub fn len(&self) -> FeedResult<u64> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        Ok(self.db.len(&rtxn).map_err(txn_error)?)
    }

    pub fn is_empty(&self) -> FeedResult<bool> {
        Ok(self.len()? == 0)
    }

    /// Iterate over keys matching a prefix and collect them.
    fn collect_keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>, StorageError> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        let iter = self.db.iter(&rtxn).map_err(txn_error)?;

        let mut keys = Vec::new();
        for result in iter {
            match result {
                Ok((key, _)) if key.starts_with(prefix) => keys.push(key.to_string()),
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable session store entry");
                }
            }
        }
        Ok(keys)
    }
}

impl KeyedStore for LmdbSessionStore {
    fn set(&self, key: &str, serialized: &str) -> FeedResult<()> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        self.db.put(&mut wtxn, key, serialized).map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(())
    }

    fn get(&self, key: &str) -> FeedResult<Option<String>> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        let value = self.db.get(&rtxn, key).map_err(txn_error)?;
        Ok(value.map(str::to_string))
    }

    fn remove(&self, key: &str) -> FeedResult<bool> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let deleted = self.db.delete(&mut wtxn, key).map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(deleted)
    }

    fn keys(&self) -> FeedResult<Vec<String>> {
        Ok(self.collect_keys_with_prefix("")?)
    }

    fn remove_prefix(&self, prefix: &str) -> FeedResult<u64> {
        let doomed = self.collect_keys_with_prefix(prefix)?;

        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let mut deleted = 0u64;
        for key in &doomed {
            if self.db.delete(&mut wtxn, key).map_err(txn_error)? {
                deleted += 1;
            }
        }
        wtxn.commit().map_err(txn_error)?;

        Ok(deleted)
    }

    fn clear(&self) -> FeedResult<u64> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let count = self.db.len(&wtxn).map_err(txn_error)?;
        self.db.clear(&mut wtxn).map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (LmdbSessionStore, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let store = LmdbSessionStore::new(temp_dir.path(), 10).expect("store creation should succeed");
        (store, temp_dir)
    }

    #[test]
    fn test_set_get_remove() {
        let (store, _dir) = create_test_store();

        store.set("posts/all|anon|p0:9", "{}").unwrap();
        assert_eq!(store.get("posts/all|anon|p0:9").unwrap().as_deref(), Some("{}"));

        assert!(store.remove("posts/all|anon|p0:9").unwrap());
        assert!(store.get("posts/all|anon|p0:9").unwrap().is_none());
        assert!(!store.remove("posts/all|anon|p0:9").unwrap());
    }

    #[test]
    fn test_remove_prefix_leaves_other_keys() {
        let (store, _dir) = create_test_store();
        store.set("comments_post_42|anon|p0:10", "a").unwrap();
        store.set("comments_post_42|anon|p1:10", "b").unwrap();
        store.set("comments_post_43|anon|p0:10", "c").unwrap();

        assert_eq!(store.remove_prefix("comments_post_42").unwrap(), 2);
        assert_eq!(store.keys().unwrap(), vec!["comments_post_43|anon|p0:10".to_string()]);
    }

    #[test]
    fn test_entries_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        {
            let store = LmdbSessionStore::new(temp_dir.path(), 10).unwrap();
            store.set("k", "v").unwrap();
        }
        let reopened = LmdbSessionStore::new(temp_dir.path(), 10).unwrap();
        assert_eq!(reopened.get("k").unwrap().as_deref(), Some("v"));
    }

    #[test]
    fn test_clear() {
        let (store, _dir) = create_test_store();
        store.set("a", "1").unwrap();
        store.set("b", "2").unwrap();

        assert_eq!(store.clear().unwrap(), 2);
        assert!(store.is_empty().unwrap());
    }
}
