//! Feedcache Storage - Session Cache
//!
//! Read-through cache over a session-scoped key/value store, with TTL
//! expiry, adjacent-page prefetching and optimistic toggle coordination.
//! The HTTP side lives in feedcache-client.

pub mod cache;

pub use cache::{
    decode_entry, encode_entry, CacheConfig, CacheEntry, CacheKey, CacheStats, Clock, Decoded,
    FetchCache, InMemorySessionStore, KeyedStore, LmdbSessionStore, ManualClock, MutationPhase,
    PageParams, PendingMutation, PrefetchHandle, PrefetchObserver, PrefetchOutcome, Prefetcher,
    ReactionTarget, ReactionView, StalenessGuard, SystemClock, Ticket, ToggleCoordinator,
    ToggleOutcome, TracingObserver, ViewerScope,
};
