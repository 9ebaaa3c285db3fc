//! Feedcache Core - Entity Types
//!
//! Wire shapes returned by the feed backend, strongly-typed identifiers,
//! the experience level table and the error taxonomy shared by every
//! other crate in the workspace.

pub mod entities;
pub mod error;
pub mod identity;
pub mod level;

pub use entities::{
    Comment, Genre, LikeResult, Page, Post, PostImage, ReactionState, StarResult, UserProfile,
};
pub use error::{FeedError, FeedResult, StorageError, TransportError, ValidationError};
pub use identity::{
    new_entity_id, CommentId, EntityId, EntityIdType, GenreId, PostId, Timestamp, ViewerId,
};
pub use level::{exp_for_next, level_for, LEVEL_THRESHOLDS, MAX_LEVEL};

/// Maximum number of favorite genres a viewer may select.
pub const MAX_FAVORITE_GENRES: usize = 3;

