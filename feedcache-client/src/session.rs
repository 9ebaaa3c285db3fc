//! Session assembly from configuration.
//!
//! Picks the session store (LMDB when `session_dir` is set, in-memory
//! otherwise) and wires it to a [`RestClient`] in a [`FeedService`].

use std::sync::Arc;

use feedcache_core::{FeedResult, ViewerId};
use feedcache_storage::{
    FetchCache, InMemorySessionStore, KeyedStore, LmdbSessionStore, SystemClock,
};

use crate::api_client::RestClient;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::feed::FeedService;

/// Store backing one browsing session.
pub enum SessionStore {
    Memory(InMemorySessionStore),
    Lmdb(LmdbSessionStore),
}

impl SessionStore {
    pub fn from_config(config: &ClientConfig) -> Result<Self, ClientError> {
        match &config.session_dir {
            Some(dir) => {
                let store = LmdbSessionStore::new(dir, config.session_max_size_mb)?;
                tracing::info!(path = %dir.display(), "using LMDB session store");
                Ok(SessionStore::Lmdb(store))
            }
            None => Ok(SessionStore::Memory(InMemorySessionStore::new())),
        }
    }

    pub fn is_persistent(&self) -> bool {
        matches!(self, SessionStore::Lmdb(_))
    }
}

impl KeyedStore for SessionStore {
    fn set(&self, key: &str, serialized: &str) -> FeedResult<()> {
        match self {
            SessionStore::Memory(store) => store.set(key, serialized),
            SessionStore::Lmdb(store) => store.set(key, serialized),
        }
    }

    fn get(&self, key: &str) -> FeedResult<Option<String>> {
        match self {
            SessionStore::Memory(store) => store.get(key),
            SessionStore::Lmdb(store) => store.get(key),
        }
    }

    fn remove(&self, key: &str) -> FeedResult<bool> {
        match self {
            SessionStore::Memory(store) => store.remove(key),
            SessionStore::Lmdb(store) => store.remove(key),
        }
    }

    fn keys(&self) -> FeedResult<Vec<String>> {
        match self {
            SessionStore::Memory(store) => store.keys(),
            SessionStore::Lmdb(store) => store.keys(),
        }
    }

    fn remove_prefix(&self, prefix: &str) -> FeedResult<u64> {
        match self {
            SessionStore::Memory(store) => store.remove_prefix(prefix),
            SessionStore::Lmdb(store) => store.remove_prefix(prefix),
        }
    }

    fn clear(&self) -> FeedResult<u64> {
        match self {
            SessionStore::Memory(store) => store.clear(),
            SessionStore::Lmdb(store) => store.clear(),
        }
    }
}

/// Build a service for `viewer` from configuration.
pub fn connect(
    config: &ClientConfig,
    viewer: Option<ViewerId>,
) -> Result<FeedService<RestClient, SessionStore>, ClientError> {
    config.validate()?;
    let api = RestClient::new(config)?;
    let store = SessionStore::from_config(config)?;
    let cache = FetchCache::new(
        Arc::new(store),
        Arc::new(SystemClock),
        config.cache.to_cache_config(),
    );

    Ok(FeedService::new(Arc::new(api), cache)
        .with_page_sizes(config.posts_page_size, config.comments_page_size)
        .with_viewer(viewer))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_store_without_session_dir() {
        let config = ClientConfig::for_base_url("http://localhost:8080");
        let store = SessionStore::from_config(&config).unwrap();
        assert!(!store.is_persistent());
    }

    #[test]
    fn test_lmdb_store_with_session_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ClientConfig::for_base_url("http://localhost:8080");
        config.session_dir = Some(dir.path().join("session"));
        config.session_max_size_mb = 8;

        let store = SessionStore::from_config(&config).unwrap();
        assert!(store.is_persistent());
        store.set("genres|shared", "[]").unwrap();
        assert_eq!(store.keys().unwrap(), vec!["genres|shared".to_string()]);
        assert_eq!(store.remove_prefix("genres|").unwrap(), 1);
    }

    #[test]
    fn test_connect_rejects_invalid_config() {
        let mut config = ClientConfig::for_base_url("http://localhost:8080");
        config.posts_page_size = 0;
        assert!(matches!(connect(&config, None), Err(ClientError::Config(_))));
    }

    #[test]
    fn test_connect_builds_service() {
        let config = ClientConfig::for_base_url("http://localhost:8080");
        let service = connect(&config, Some(ViewerId::from("user_1"))).unwrap();
        assert_eq!(service.viewer(), Some(ViewerId::from("user_1")));
        assert_eq!(service.posts_page_size(), 9);
    }
}
