//! Read-through cache with TTL expiry and viewer-isolated keys.
//!
//! This module provides the cache that sits between feed views and the
//! backend: reads go through [`FetchCache`], which serves valid entries from
//! a [`KeyedStore`] and falls back to the caller's fetch function on a miss.
//!
//! # Viewer Isolation
//!
//! Listing responses carry per-viewer fields (`liked`, `starred`). A
//! [`CacheKey`] cannot be built without choosing a [`ViewerScope`], so a
//! personalised page cached for one viewer is never served to another.
//!
//! # Example
//!
//! ```ignore
//! let key = CacheKey::new("posts/all", ViewerScope::viewer(viewer), Some(PageParams::new(0, 9)));
//! let page: Page<Post> = cache
//!     .read(&key, Duration::from_secs(60), || api.list_posts(0, 9, Some(&viewer)))
//!     .await?;
//!
//! // Warm the neighbours in the background
//! prefetcher.warm(0, page.total_pages, ttl, |p| key_for(p), move |p| fetch_page(p));
//! ```

pub mod clock;
pub mod entry;
pub mod key;
pub mod lmdb_backend;
pub mod optimistic;
pub mod prefetch;
pub mod read_through;
pub mod staleness;
pub mod store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use entry::{decode_entry, encode_entry, CacheEntry, Decoded};
pub use key::{CacheKey, PageParams, ViewerScope};
pub use lmdb_backend::LmdbSessionStore;
pub use optimistic::{
    MutationPhase, PendingMutation, ReactionTarget, ReactionView, ToggleCoordinator,
    ToggleOutcome,
};
pub use prefetch::{PrefetchHandle, PrefetchObserver, PrefetchOutcome, Prefetcher, TracingObserver};
pub use read_through::{CacheConfig, CacheStats, FetchCache};
pub use staleness::{StalenessGuard, Ticket};
pub use store::{InMemorySessionStore, KeyedStore};
