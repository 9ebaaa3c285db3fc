//! Cached feed service.
//!
//! [`FeedService`] is what views talk to. It reads through the session
//! cache, warms adjacent pages, runs like/star toggles through the
//! optimistic coordinator and invalidates whatever a mutation makes stale.
//! One instance serves one viewer at a time; [`FeedService::switch_viewer`]
//! drops everything cached for the previous identity.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use feedcache_core::{
    Comment, CommentId, FeedResult, Genre, GenreId, Page, Post, PostId, ReactionState, UserProfile,
    ValidationError, ViewerId, MAX_FAVORITE_GENRES,
};
use feedcache_storage::{
    CacheKey, FetchCache, KeyedStore, PendingMutation, PrefetchHandle, PrefetchObserver,
    PrefetchOutcome, Prefetcher, ReactionTarget, ReactionView, StalenessGuard, ToggleCoordinator,
    ToggleOutcome, ViewerScope,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::api_client::{FeedApi, NewComment, NewProfile, PostEdit};

/// Resource names used in cache keys.
pub mod resources {
    use feedcache_core::{PostId, ViewerId};

    /// Every post listing (feed, profile tabs, search) starts with this.
    pub const POSTS_PREFIX: &str = "posts/";
    pub const POSTS_ALL: &str = "posts/all";
    /// Every comment thread starts with this.
    pub const COMMENTS_PREFIX: &str = "comments_post_";
    pub const GENRES: &str = "genres";

    pub fn user_posts(author: &str) -> String {
        format!("posts/user/{}", author)
    }

    pub fn liked_posts(owner: &str) -> String {
        format!("posts/liked/{}", owner)
    }

    pub fn starred_posts(owner: &str) -> String {
        format!("posts/starred/{}", owner)
    }

    pub fn search(query: &str) -> String {
        format!("posts/search/{}", query)
    }

    pub fn comments(post: PostId) -> String {
        format!("{}{}", COMMENTS_PREFIX, post)
    }

    pub fn profile(user: &str) -> String {
        format!("users/{}", user)
    }

    pub fn favorite_genres(user: &ViewerId) -> String {
        format!("genres/users/{}", user)
    }
}

/// What a listing view is showing; responses for anything else are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ListingView {
    scope: ViewerScope,
    resource: String,
    page: u32,
}

type ViewGuard = StalenessGuard<Option<ListingView>>;

/// Cached access to the feed backend for one viewer session.
pub struct FeedService<A, S: KeyedStore> {
    api: Arc<A>,
    cache: FetchCache<S>,
    prefetcher: Prefetcher<S>,
    toggles: ToggleCoordinator<S>,
    viewer: RwLock<Option<ViewerId>>,
    feed_view: ViewGuard,
    profile_view: ViewGuard,
    search_view: ViewGuard,
    comments_view: ViewGuard,
    warming: Mutex<Vec<PrefetchHandle>>,
    posts_page_size: u32,
    comments_page_size: u32,
}

impl<A, S> FeedService<A, S>
where
    A: FeedApi + 'static,
    S: KeyedStore + 'static,
{
    pub fn new(api: Arc<A>, cache: FetchCache<S>) -> Self {
        Self {
            api,
            prefetcher: Prefetcher::new(cache.clone()),
            toggles: ToggleCoordinator::new(cache.clone()),
            cache,
            viewer: RwLock::new(None),
            feed_view: StalenessGuard::new(None),
            profile_view: StalenessGuard::new(None),
            search_view: StalenessGuard::new(None),
            comments_view: StalenessGuard::new(None),
            warming: Mutex::new(Vec::new()),
            posts_page_size: 9,
            comments_page_size: 10,
        }
    }

    pub fn with_page_sizes(mut self, posts: u32, comments: u32) -> Self {
        self.posts_page_size = posts;
        self.comments_page_size = comments;
        self
    }

    pub fn with_viewer(mut self, viewer: Option<ViewerId>) -> Self {
        self.viewer = RwLock::new(viewer);
        self
    }

    /// Replace the observer notified of background prefetch results.
    pub fn with_prefetch_observer(mut self, observer: Arc<dyn PrefetchObserver>) -> Self {
        self.prefetcher = Prefetcher::new(self.cache.clone()).with_observer(observer);
        self
    }

    pub fn viewer(&self) -> Option<ViewerId> {
        self.viewer.read().ok().and_then(|viewer| viewer.clone())
    }

    pub fn posts_page_size(&self) -> u32 {
        self.posts_page_size
    }

    pub fn comments_page_size(&self) -> u32 {
        self.comments_page_size
    }

    pub fn cache(&self) -> &FetchCache<S> {
        &self.cache
    }

    pub fn api(&self) -> &A {
        &self.api
    }

    // ------------------------------------------------------------------------
    // Listings
    // ------------------------------------------------------------------------

    /// One page of the main feed. `None` if the feed moved to another page
    /// (or viewer) before the response arrived.
    pub async fn load_posts(&self, page: u32) -> FeedResult<Option<Page<Post>>> {
        let viewer = self.viewer();
        let size = self.posts_page_size;
        let api = Arc::clone(&self.api);
        let fetch_viewer = viewer.clone();
        let fetch = move |p: u32| {
            let api = Arc::clone(&api);
            let viewer = fetch_viewer.clone();
            async move { api.list_posts(p, size, viewer.as_ref()).await }
        };
        self.load_listing(
            &self.feed_view,
            viewer,
            resources::POSTS_ALL.to_string(),
            page,
            size,
            self.cache.config().default_ttl,
            fetch,
        )
        .await
    }

    /// Posts written by `author`.
    pub async fn load_user_posts(&self, author: &str, page: u32) -> FeedResult<Option<Page<Post>>> {
        let viewer = self.viewer();
        let size = self.posts_page_size;
        let api = Arc::clone(&self.api);
        let fetch_viewer = viewer.clone();
        let owner = author.to_string();
        let fetch = move |p: u32| {
            let api = Arc::clone(&api);
            let viewer = fetch_viewer.clone();
            let owner = owner.clone();
            async move { api.list_user_posts(&owner, p, size, viewer.as_ref()).await }
        };
        self.load_listing(
            &self.profile_view,
            viewer,
            resources::user_posts(author),
            page,
            size,
            self.cache.config().default_ttl,
            fetch,
        )
        .await
    }

    /// Posts `owner` has liked.
    pub async fn load_liked_posts(&self, owner: &str, page: u32) -> FeedResult<Option<Page<Post>>> {
        let viewer = self.viewer();
        let size = self.posts_page_size;
        let api = Arc::clone(&self.api);
        let fetch_viewer = viewer.clone();
        let owner_id = owner.to_string();
        let fetch = move |p: u32| {
            let api = Arc::clone(&api);
            let viewer = fetch_viewer.clone();
            let owner = owner_id.clone();
            async move { api.list_liked_posts(&owner, p, size, viewer.as_ref()).await }
        };
        self.load_listing(
            &self.profile_view,
            viewer,
            resources::liked_posts(owner),
            page,
            size,
            self.cache.config().default_ttl,
            fetch,
        )
        .await
    }

    /// Posts `owner` has starred.
    pub async fn load_starred_posts(&self, owner: &str, page: u32) -> FeedResult<Option<Page<Post>>> {
        let viewer = self.viewer();
        let size = self.posts_page_size;
        let api = Arc::clone(&self.api);
        let fetch_viewer = viewer.clone();
        let owner_id = owner.to_string();
        let fetch = move |p: u32| {
            let api = Arc::clone(&api);
            let viewer = fetch_viewer.clone();
            let owner = owner_id.clone();
            async move { api.list_starred_posts(&owner, p, size, viewer.as_ref()).await }
        };
        self.load_listing(
            &self.profile_view,
            viewer,
            resources::starred_posts(owner),
            page,
            size,
            self.cache.config().default_ttl,
            fetch,
        )
        .await
    }

    /// Full-text search over posts. Blank queries are rejected locally.
    pub async fn search_posts(&self, query: &str, page: u32) -> FeedResult<Option<Page<Post>>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "query".to_string(),
            }
            .into());
        }

        let viewer = self.viewer();
        let size = self.posts_page_size;
        let api = Arc::clone(&self.api);
        let fetch_viewer = viewer.clone();
        let q = query.to_string();
        let fetch = move |p: u32| {
            let api = Arc::clone(&api);
            let viewer = fetch_viewer.clone();
            let q = q.clone();
            async move { api.search_posts(&q, p, size, viewer.as_ref()).await }
        };
        self.load_listing(
            &self.search_view,
            viewer,
            resources::search(query),
            page,
            size,
            self.cache.config().default_ttl,
            fetch,
        )
        .await
    }

    /// One page of top-level comments (with nested replies) on `post`.
    pub async fn load_comments(&self, post: PostId, page: u32) -> FeedResult<Option<Page<Comment>>> {
        let viewer = self.viewer();
        let size = self.comments_page_size;
        let api = Arc::clone(&self.api);
        let fetch_viewer = viewer.clone();
        let fetch = move |p: u32| {
            let api = Arc::clone(&api);
            let viewer = fetch_viewer.clone();
            async move { api.list_comments(post, p, size, viewer.as_ref()).await }
        };
        self.load_listing(
            &self.comments_view,
            viewer,
            resources::comments(post),
            page,
            size,
            self.cache.config().comments_ttl,
            fetch,
        )
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn load_listing<T, F, Fut>(
        &self,
        guard: &ViewGuard,
        viewer: Option<ViewerId>,
        resource: String,
        page: u32,
        size: u32,
        ttl: Duration,
        fetch: F,
    ) -> FeedResult<Option<Page<T>>>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: Fn(u32) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = FeedResult<Page<T>>> + Send + 'static,
    {
        let scope = ViewerScope::personal(viewer.as_ref());
        let ticket = guard.begin(Some(ListingView {
            scope: scope.clone(),
            resource: resource.clone(),
            page,
        }));

        let key = CacheKey::page(resource.clone(), scope.clone(), page, size);
        let fetched = self.cache.read(&key, ttl, || fetch(page)).await?;

        if !ticket.is_current() {
            tracing::debug!(%key, "listing superseded while loading");
            return Ok(None);
        }

        let key_for = move |p: u32| CacheKey::page(resource.clone(), scope.clone(), p, size);
        let handle = self.prefetcher.warm(page, fetched.total_pages, ttl, key_for, fetch);
        self.track(handle);

        Ok(Some(fetched))
    }

    fn track(&self, handle: PrefetchHandle) {
        if handle.is_noop() {
            return;
        }
        if let Ok(mut warming) = self.warming.lock() {
            warming.retain(|h| !h.is_finished());
            warming.push(handle);
        }
    }

    /// Wait for every scheduled prefetch and return the outcomes.
    pub async fn settle(&self) -> Vec<(u32, PrefetchOutcome)> {
        let handles = match self.warming.lock() {
            Ok(mut warming) => std::mem::take(&mut *warming),
            Err(_) => Vec::new(),
        };
        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.extend(handle.join().await);
        }
        outcomes
    }

    // ------------------------------------------------------------------------
    // Single resources
    // ------------------------------------------------------------------------

    pub async fn profile(&self, user: &str) -> FeedResult<UserProfile> {
        let key = profile_key(user);
        let api = &self.api;
        self.cache
            .read(&key, self.cache.config().default_ttl, || api.user_profile(user))
            .await
    }

    /// The genre catalogue.
    pub async fn genres(&self) -> FeedResult<Vec<Genre>> {
        let key = CacheKey::new(resources::GENRES, ViewerScope::Shared, None);
        let api = &self.api;
        self.cache
            .read(&key, self.cache.config().default_ttl, || api.list_genres())
            .await
    }

    /// The signed-in viewer's favorite genres.
    pub async fn favorite_genres(&self) -> FeedResult<Vec<Genre>> {
        let viewer = self.require_viewer()?;
        let key = favorites_key(&viewer);
        let api = &self.api;
        self.cache
            .read(&key, self.cache.config().default_ttl, || api.favorite_genres(&viewer))
            .await
    }

    // ------------------------------------------------------------------------
    // Mutations
    // ------------------------------------------------------------------------

    /// Replace the viewer's favorite genres. At most three, no repeats;
    /// violations are rejected before any request is made.
    pub async fn update_favorite_genres(&self, genre_ids: &[GenreId]) -> FeedResult<Vec<Genre>> {
        validate_genre_selection(genre_ids)?;
        let viewer = self.require_viewer()?;

        let saved = self.api.set_favorite_genres(&viewer, genre_ids).await?;
        if let Err(e) = self
            .cache
            .put(&favorites_key(&viewer), &saved, self.cache.config().default_ttl)
        {
            tracing::warn!(error = %e, "failed to cache saved favorite genres");
        }
        Ok(saved)
    }

    pub async fn toggle_post_like(
        &self,
        post: PostId,
        current: ReactionState,
        view: &dyn ReactionView,
    ) -> FeedResult<ToggleOutcome> {
        let viewer = self.require_viewer()?;
        let mutation = PendingMutation::toggle(ReactionTarget::PostLike(post), current);
        let affected = [resources::POSTS_PREFIX.to_string()];
        let api = &self.api;
        Ok(self
            .toggles
            .toggle(mutation, view, &affected, || api.toggle_post_like(post, &viewer))
            .await)
    }

    pub async fn toggle_post_star(
        &self,
        post: PostId,
        current: ReactionState,
        view: &dyn ReactionView,
    ) -> FeedResult<ToggleOutcome> {
        let viewer = self.require_viewer()?;
        let mutation = PendingMutation::toggle(ReactionTarget::PostStar(post), current);
        let affected = [resources::POSTS_PREFIX.to_string()];
        let api = &self.api;
        Ok(self
            .toggles
            .toggle(mutation, view, &affected, || api.toggle_post_star(post, &viewer))
            .await)
    }

    /// Like or unlike a comment on `post`.
    pub async fn toggle_comment_like(
        &self,
        post: PostId,
        comment: CommentId,
        current: ReactionState,
        view: &dyn ReactionView,
    ) -> FeedResult<ToggleOutcome> {
        let viewer = self.require_viewer()?;
        let mutation = PendingMutation::toggle(ReactionTarget::CommentLike(comment), current);
        let affected = [CacheKey::resource_prefix(&resources::comments(post))];
        let api = &self.api;
        Ok(self
            .toggles
            .toggle(mutation, view, &affected, || api.toggle_comment_like(comment, &viewer))
            .await)
    }

    /// Post a comment or reply, then drop every cached page of that post's
    /// comments.
    pub async fn add_comment(
        &self,
        post: PostId,
        content: &str,
        parent: Option<CommentId>,
    ) -> FeedResult<Comment> {
        let content = required("content", content)?;
        let viewer = self.require_viewer()?;

        let created = self
            .api
            .create_comment(&NewComment {
                post_id: post,
                user_id: viewer,
                content,
                parent_comment_id: parent,
            })
            .await?;

        let prefix = CacheKey::resource_prefix(&resources::comments(post));
        if let Err(e) = self.cache.invalidate_prefix(&prefix) {
            tracing::warn!(%prefix, error = %e, "failed to invalidate comments after create");
        }
        Ok(created)
    }

    /// Edit one of the viewer's posts. Every post listing is dropped since the
    /// post may appear in any of them.
    pub async fn update_post(&self, post: PostId, title: &str, content: &str) -> FeedResult<Post> {
        let title = required("title", title)?;
        let content = required("content", content)?;
        let viewer = self.require_viewer()?;

        let updated = self
            .api
            .update_post(
                post,
                &PostEdit {
                    user_id: viewer,
                    title,
                    content,
                },
            )
            .await?;
        self.drop_prefixes(&[resources::POSTS_PREFIX.to_string()]);
        Ok(updated)
    }

    /// Delete one of the viewer's posts along with its cached comments.
    pub async fn delete_post(&self, post: PostId) -> FeedResult<()> {
        let viewer = self.require_viewer()?;
        self.api.delete_post(post, &viewer).await?;
        self.drop_prefixes(&[
            resources::POSTS_PREFIX.to_string(),
            CacheKey::resource_prefix(&resources::comments(post)),
        ]);
        Ok(())
    }

    /// Rename the viewer. Posts and comments embed the author's username,
    /// so every listing goes along with the cached profile, which is
    /// replaced by the server's copy.
    pub async fn update_username(&self, username: &str) -> FeedResult<UserProfile> {
        let username = required("username", username)?;
        let viewer = self.require_viewer()?;

        let profile = self.api.update_username(&viewer, &username).await?;
        self.drop_prefixes(&[
            resources::POSTS_PREFIX.to_string(),
            resources::COMMENTS_PREFIX.to_string(),
        ]);
        self.store_profile(&profile);
        Ok(profile)
    }

    /// Whether the viewer has a backend profile yet. Always asks the backend.
    pub async fn is_registered(&self) -> FeedResult<bool> {
        let viewer = self.require_viewer()?;
        self.api.profile_exists(&viewer).await
    }

    /// Create the viewer's backend profile on first sign-in.
    pub async fn register(&self, username: &str, email: &str) -> FeedResult<UserProfile> {
        let username = required("username", username)?;
        let email = required("email", email)?;
        let viewer = self.require_viewer()?;

        let profile = self
            .api
            .register_profile(&NewProfile {
                user_id: viewer,
                username,
                email,
            })
            .await?;
        self.store_profile(&profile);
        Ok(profile)
    }

    fn store_profile(&self, profile: &UserProfile) {
        let key = profile_key(&profile.user_id);
        if let Err(e) = self.cache.put(&key, profile, self.cache.config().default_ttl) {
            tracing::warn!(%key, error = %e, "failed to cache profile");
        }
    }

    fn drop_prefixes(&self, prefixes: &[String]) {
        for prefix in prefixes {
            if let Err(e) = self.cache.invalidate_prefix(prefix) {
                tracing::warn!(%prefix, error = %e, "failed to invalidate after mutation");
            }
        }
    }

    /// A post was created elsewhere; every cached listing may now be stale.
    pub fn note_post_created(&self) -> FeedResult<u64> {
        self.cache.invalidate_prefix(resources::POSTS_PREFIX)
    }

    /// Change identity. Everything cached is dropped, scheduled prefetches
    /// are cancelled and in-flight responses for the old identity are
    /// neither returned nor stored. Switching to the current viewer is a
    /// no-op.
    pub fn switch_viewer(&self, viewer: Option<ViewerId>) -> FeedResult<u64> {
        {
            let mut current = self
                .viewer
                .write()
                .map_err(|_| feedcache_core::StorageError::LockPoisoned)?;
            if *current == viewer {
                return Ok(0);
            }
            *current = viewer;
        }

        // Pages still being warmed belong to the old viewer.
        let pending = match self.warming.lock() {
            Ok(mut warming) => std::mem::take(&mut *warming),
            Err(_) => Vec::new(),
        };
        for handle in &pending {
            handle.abort();
        }

        for guard in [
            &self.feed_view,
            &self.profile_view,
            &self.search_view,
            &self.comments_view,
        ] {
            guard.set(None);
        }

        let removed = self.cache.clear()?;
        tracing::info!(removed, "viewer changed, session cache cleared");
        Ok(removed)
    }

    fn require_viewer(&self) -> FeedResult<ViewerId> {
        self.viewer().ok_or_else(|| {
            ValidationError::RequiredFieldMissing {
                field: "viewer".to_string(),
            }
            .into()
        })
    }
}

fn profile_key(user: &str) -> CacheKey {
    CacheKey::new(resources::profile(user), ViewerScope::Shared, None)
}

/// Trimmed `value`, or a validation error if nothing is left.
fn required(field: &str, value: &str) -> Result<String, ValidationError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ValidationError::RequiredFieldMissing {
            field: field.to_string(),
        });
    }
    Ok(value.to_string())
}

fn favorites_key(viewer: &ViewerId) -> CacheKey {
    CacheKey::new(
        resources::favorite_genres(viewer),
        ViewerScope::viewer(viewer.clone()),
        None,
    )
}

/// Reject selections the backend would refuse.
pub fn validate_genre_selection(genre_ids: &[GenreId]) -> Result<(), ValidationError> {
    if genre_ids.len() > MAX_FAVORITE_GENRES {
        return Err(ValidationError::LimitExceeded {
            field: "genres".to_string(),
            selected: genre_ids.len(),
            limit: MAX_FAVORITE_GENRES,
        });
    }
    let mut seen = HashSet::with_capacity(genre_ids.len());
    for id in genre_ids {
        if !seen.insert(id) {
            return Err(ValidationError::InvalidValue {
                field: "genres".to_string(),
                reason: format!("genre {} selected twice", id),
            });
        }
    }
    Ok(())
}
