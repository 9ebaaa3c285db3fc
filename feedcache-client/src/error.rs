//! Error types for assembling a feed client session.

use feedcache_core::FeedError;

use crate::api_client::ApiClientError;
use crate::config::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Api(#[from] ApiClientError),
    #[error(transparent)]
    Feed(#[from] FeedError),
    #[error("Failed to initialise logging: {0}")]
    Telemetry(String),
}

impl From<feedcache_core::StorageError> for ClientError {
    fn from(err: feedcache_core::StorageError) -> Self {
        ClientError::Feed(err.into())
    }
}
