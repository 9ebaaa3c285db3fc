//! Optimistic toggle coordination for likes and stars.
//!
//! A toggle moves one control through `Idle -> Pending -> {Committed,
//! RolledBack}` and back to `Idle`. The guessed state is shown immediately
//! through a [`ReactionView`]; it is never written to the cache.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};

use feedcache_core::{
    CommentId, EntityId, EntityIdType, FeedError, FeedResult, PostId, ReactionState, StorageError,
};

use super::read_through::FetchCache;
use super::store::KeyedStore;

/// The control a toggle applies to. Liking and starring the same post are
/// independent controls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReactionTarget {
    PostLike(PostId),
    PostStar(PostId),
    CommentLike(CommentId),
}

impl ReactionTarget {
    /// Id of the post or comment being reacted to.
    pub fn entity_id(&self) -> EntityId {
        match self {
            ReactionTarget::PostLike(id) | ReactionTarget::PostStar(id) => id.as_uuid(),
            ReactionTarget::CommentLike(id) => id.as_uuid(),
        }
    }
}

impl fmt::Display for ReactionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReactionTarget::PostLike(id) => write!(f, "post-like:{}", id),
            ReactionTarget::PostStar(id) => write!(f, "post-star:{}", id),
            ReactionTarget::CommentLike(id) => write!(f, "comment-like:{}", id),
        }
    }
}

/// Phase of a toggle, passed to the view with every render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationPhase {
    Idle,
    /// Request in flight; the view should disable the control.
    Pending,
    Committed,
    RolledBack,
}

/// A toggle waiting on the backend. Lives only for the duration of the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingMutation {
    pub target: ReactionTarget,
    pub previous: ReactionState,
    pub proposed: ReactionState,
}

impl PendingMutation {
    /// Flip `previous` for `target`.
    pub fn toggle(target: ReactionTarget, previous: ReactionState) -> Self {
        Self {
            target,
            previous,
            proposed: previous.toggled(),
        }
    }
}

/// Where the coordinator renders reaction state.
pub trait ReactionView: Send + Sync {
    fn render(&self, target: ReactionTarget, state: ReactionState, phase: MutationPhase);
}

/// Result of a toggle request.
#[derive(Debug, Clone, PartialEq)]
pub enum ToggleOutcome {
    /// Backend accepted; carries the authoritative state.
    Committed(ReactionState),
    /// Backend call failed; the previous state was restored.
    RolledBack {
        restored: ReactionState,
        error: FeedError,
    },
    /// A toggle for the same control was already pending.
    Ignored,
}

impl ToggleOutcome {
    /// The state the view shows after this outcome, if the toggle ran.
    pub fn state(&self) -> Option<ReactionState> {
        match self {
            ToggleOutcome::Committed(state) => Some(*state),
            ToggleOutcome::RolledBack { restored, .. } => Some(*restored),
            ToggleOutcome::Ignored => None,
        }
    }
}

struct PendingGuard {
    pending: Arc<Mutex<HashSet<ReactionTarget>>>,
    target: ReactionTarget,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.remove(&self.target);
        }
    }
}

/// Runs toggles against the backend, one at a time per control.
pub struct ToggleCoordinator<S: KeyedStore> {
    cache: FetchCache<S>,
    pending: Arc<Mutex<HashSet<ReactionTarget>>>,
}

impl<S: KeyedStore> ToggleCoordinator<S> {
    pub fn new(cache: FetchCache<S>) -> Self {
        Self {
            cache,
            pending: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    /// `Pending` while a toggle for `target` is in flight, otherwise `Idle`.
    pub fn phase(&self, target: ReactionTarget) -> MutationPhase {
        match self.pending.lock() {
            Ok(pending) if pending.contains(&target) => MutationPhase::Pending,
            _ => MutationPhase::Idle,
        }
    }

    /// Apply `mutation` optimistically, run `call`, then commit or roll back.
    ///
    /// On success the server's state is rendered and every prefix in
    /// `affected_prefixes` is invalidated. On failure the previous state is
    /// rendered and the cache is left untouched.
    pub async fn toggle<R, F, Fut>(
        &self,
        mutation: PendingMutation,
        view: &dyn ReactionView,
        affected_prefixes: &[String],
        call: F,
    ) -> ToggleOutcome
    where
        R: Into<ReactionState>,
        F: FnOnce() -> Fut,
        Fut: Future<Output = FeedResult<R>>,
    {
        let target = mutation.target;
        let _guard = match self.claim(target) {
            Ok(Some(guard)) => guard,
            Ok(None) => {
                tracing::debug!(%target, "toggle already pending, ignoring");
                return ToggleOutcome::Ignored;
            }
            Err(error) => {
                return ToggleOutcome::RolledBack {
                    restored: mutation.previous,
                    error,
                }
            }
        };

        view.render(target, mutation.proposed, MutationPhase::Pending);

        match call().await {
            Ok(result) => {
                let state: ReactionState = result.into();
                view.render(target, state, MutationPhase::Committed);
                for prefix in affected_prefixes {
                    if let Err(e) = self.cache.invalidate_prefix(prefix) {
                        tracing::warn!(%target, prefix = %prefix, error = %e, "failed to invalidate after toggle");
                    }
                }
                tracing::debug!(%target, active = state.active, count = state.count, "toggle committed");
                ToggleOutcome::Committed(state)
            }
            Err(error) => {
                view.render(target, mutation.previous, MutationPhase::RolledBack);
                tracing::warn!(%target, error = %error, "toggle rolled back");
                ToggleOutcome::RolledBack {
                    restored: mutation.previous,
                    error,
                }
            }
        }
    }

    fn claim(&self, target: ReactionTarget) -> FeedResult<Option<PendingGuard>> {
        let mut pending = self.pending.lock().map_err(|_| StorageError::LockPoisoned)?;
        if !pending.insert(target) {
            return Ok(None);
        }
        Ok(Some(PendingGuard {
            pending: Arc::clone(&self.pending),
            target,
        }))
    }
}

impl<S: KeyedStore> Clone for ToggleCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            cache: self.cache.clone(),
            pending: Arc::clone(&self.pending),
        }
    }
}
