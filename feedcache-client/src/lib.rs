//! Feedcache Client - Cached REST Access
//!
//! REST client for the feed backend, configuration loading, tracing setup
//! and the [`FeedService`] that puts the session cache in front of it.

pub mod api_client;
pub mod config;
pub mod error;
pub mod feed;
pub mod session;
pub mod telemetry;

pub use api_client::{ApiClientError, FeedApi, NewComment, NewProfile, PostEdit, RestClient};
pub use config::{CacheSection, ClientConfig, ConfigError, LoggingConfig};
pub use error::ClientError;
pub use feed::{resources, validate_genre_selection, FeedService};
pub use session::{connect, SessionStore};
pub use telemetry::init_tracing;
