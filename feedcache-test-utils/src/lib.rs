//! Feedcache Test Utilities
//!
//! Shared test infrastructure for the feedcache workspace:
//! - A scripted in-process backend implementing [`FeedApi`]
//! - Recording sinks for toggle renders and prefetch outcomes
//! - Fixtures for posts, comments, genres and profiles
//! - Proptest generators for wire entities
//! - Custom assertions on [`FeedResult`] values

pub use feedcache_client::FeedApi;
pub use feedcache_core::{
    Comment, CommentId, EntityIdType, FeedError, FeedResult, Genre, GenreId, LikeResult, Page, Post,
    PostId, ReactionState, StarResult, TransportError, UserProfile, ValidationError, ViewerId,
};

use chrono::NaiveDateTime;
use uuid::Uuid;

/// Deterministic UUID for fixture number `n`.
pub fn fixture_uuid(n: u128) -> Uuid {
    Uuid::from_u128(0xfeed_0000_0000_0000_0000_0000_0000_0000 | n)
}

fn fixture_time(minutes: u32) -> NaiveDateTime {
    chrono::DateTime::from_timestamp(1_700_000_000 + i64::from(minutes) * 60, 0)
        .map(|t| t.naive_utc())
        .unwrap_or(NaiveDateTime::MIN)
}

/// Split `items` into the page the backend would return.
pub fn paginate<T: Clone>(items: &[T], page: u32, size: u32) -> Page<T> {
    let size = size.max(1);
    let total = items.len() as u32;
    let total_pages = total.div_ceil(size);
    let start = (page.saturating_mul(size) as usize).min(items.len());
    let end = (start + size as usize).min(items.len());
    Page {
        content: items[start..end].to_vec(),
        total_pages,
        number: page,
        size: Some(size),
        total_elements: Some(u64::from(total)),
    }
}

// ============================================================================
// SCRIPTED BACKEND
// ============================================================================

pub mod mock {
    //! In-process backend with real per-viewer reaction state.

    use super::*;
    use async_trait::async_trait;
    use feedcache_client::{NewComment, NewProfile, PostEdit};
    use feedcache_storage::{
        CacheKey, MutationPhase, PrefetchObserver, PrefetchOutcome, ReactionTarget, ReactionView,
    };
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Which endpoint a call went to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum Endpoint {
        ListPosts,
        ListUserPosts,
        ListLikedPosts,
        ListStarredPosts,
        SearchPosts,
        ListComments,
        CreateComment,
        TogglePostLike,
        TogglePostStar,
        ToggleCommentLike,
        UserProfile,
        ListGenres,
        FavoriteGenres,
        SetFavoriteGenres,
        UpdatePost,
        DeletePost,
        UpdateUsername,
        RegisterProfile,
        ProfileExists,
    }

    /// One recorded request.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct ApiCall {
        pub endpoint: Endpoint,
        pub page: Option<u32>,
        pub viewer: Option<String>,
    }

    #[derive(Default)]
    struct MockState {
        posts: Vec<Post>,
        comments: HashMap<PostId, Vec<Comment>>,
        genres: Vec<Genre>,
        favorites: HashMap<String, Vec<GenreId>>,
        profiles: HashMap<String, UserProfile>,
        post_likes: HashSet<(String, PostId)>,
        post_stars: HashSet<(String, PostId)>,
        comment_likes: HashSet<(String, CommentId)>,
        calls: Vec<ApiCall>,
        failing: HashMap<Endpoint, u16>,
        next_comment: u128,
    }

    /// Scripted [`FeedApi`] that paginates fixture data and tracks reactions
    /// per viewer the way the real backend does.
    #[derive(Default)]
    pub struct MockFeedApi {
        state: Mutex<MockState>,
        latency: Option<Duration>,
    }

    impl MockFeedApi {
        pub fn new() -> Self {
            Self::default()
        }

        /// Backend holding `count` posts, newest first.
        pub fn with_posts(count: u32) -> Self {
            let api = Self::new();
            api.set_posts(fixtures::posts(count));
            api
        }

        /// Delay every response by `latency` (use with paused tokio time).
        pub fn with_latency(mut self, latency: Duration) -> Self {
            self.latency = Some(latency);
            self
        }

        pub fn set_posts(&self, posts: Vec<Post>) {
            self.with_state(|state| state.posts = posts);
        }

        pub fn set_comments(&self, post: PostId, comments: Vec<Comment>) {
            self.with_state(|state| {
                state.comments.insert(post, comments);
            });
        }

        pub fn set_genres(&self, genres: Vec<Genre>) {
            self.with_state(|state| state.genres = genres);
        }

        pub fn add_profile(&self, profile: UserProfile) {
            self.with_state(|state| {
                state.profiles.insert(profile.user_id.clone(), profile);
            });
        }

        /// Make `endpoint` answer with HTTP `status` until [`recover`](Self::recover).
        pub fn fail(&self, endpoint: Endpoint, status: u16) {
            self.with_state(|state| {
                state.failing.insert(endpoint, status);
            });
        }

        pub fn recover(&self, endpoint: Endpoint) {
            self.with_state(|state| {
                state.failing.remove(&endpoint);
            });
        }

        /// Every request so far, in order.
        pub fn calls(&self) -> Vec<ApiCall> {
            self.with_state(|state| state.calls.clone())
        }

        /// Number of requests to `endpoint`.
        pub fn count(&self, endpoint: Endpoint) -> usize {
            self.with_state(|state| state.calls.iter().filter(|c| c.endpoint == endpoint).count())
        }

        /// Pages requested from `endpoint`, in order.
        pub fn pages_requested(&self, endpoint: Endpoint) -> Vec<u32> {
            self.with_state(|state| {
                state
                    .calls
                    .iter()
                    .filter(|c| c.endpoint == endpoint)
                    .filter_map(|c| c.page)
                    .collect()
            })
        }

        pub fn reset_calls(&self) {
            self.with_state(|state| state.calls.clear());
        }

        /// Whether `viewer` currently likes `post` on the backend.
        pub fn likes(&self, viewer: &str, post: PostId) -> bool {
            self.with_state(|state| state.post_likes.contains(&(viewer.to_string(), post)))
        }

        fn with_state<R>(&self, f: impl FnOnce(&mut MockState) -> R) -> R {
            let mut state = self.state.lock().unwrap_or_else(|p| p.into_inner());
            f(&mut state)
        }

        /// Record the call, wait out the latency, then fail if scripted to.
        async fn begin(&self, endpoint: Endpoint, page: Option<u32>, viewer: Option<&str>) -> FeedResult<()> {
            let failing = self.with_state(|state| {
                state.calls.push(ApiCall {
                    endpoint,
                    page,
                    viewer: viewer.map(str::to_string),
                });
                state.failing.get(&endpoint).copied()
            });
            if let Some(latency) = self.latency {
                tokio::time::sleep(latency).await;
            }
            match failing {
                Some(status) => Err(TransportError::Status {
                    url: format!("mock://{:?}", endpoint),
                    status,
                }
                .into()),
                None => Ok(()),
            }
        }

        fn personalise(state: &MockState, post: &Post, viewer: Option<&ViewerId>) -> Post {
            let mut post = post.clone();
            let viewer = viewer.map(|v| v.as_str().to_string());
            post.liked = viewer
                .as_ref()
                .is_some_and(|v| state.post_likes.contains(&(v.clone(), post.id)));
            post.starred = viewer
                .as_ref()
                .is_some_and(|v| state.post_stars.contains(&(v.clone(), post.id)));
            post
        }

        fn personalise_comment(state: &MockState, comment: &Comment, viewer: Option<&ViewerId>) -> Comment {
            let mut comment = comment.clone();
            comment.liked = viewer.is_some_and(|v| {
                state
                    .comment_likes
                    .contains(&(v.as_str().to_string(), comment.id))
            });
            comment.replies = comment
                .replies
                .iter()
                .map(|reply| Self::personalise_comment(state, reply, viewer))
                .collect();
            comment
        }

        fn post_page(
            &self,
            filter: impl Fn(&MockState, &Post) -> bool,
            page: u32,
            size: u32,
            viewer: Option<&ViewerId>,
        ) -> Page<Post> {
            self.with_state(|state| {
                let matching: Vec<Post> = state
                    .posts
                    .iter()
                    .filter(|p| filter(state, p))
                    .map(|p| Self::personalise(state, p, viewer))
                    .collect();
                paginate(&matching, page, size)
            })
        }
    }

    fn viewer_str(viewer: Option<&ViewerId>) -> Option<&str> {
        viewer.map(ViewerId::as_str)
    }

    fn not_found(what: &str) -> FeedError {
        status_error(what, 404)
    }

    fn status_error(what: &str, status: u16) -> FeedError {
        TransportError::Status {
            url: format!("mock://{}", what),
            status,
        }
        .into()
    }

    /// The post, if it exists and `viewer` wrote it.
    fn owned_post<'a>(state: &'a mut MockState, post: PostId, viewer: &ViewerId) -> FeedResult<&'a mut Post> {
        let entry = state
            .posts
            .iter_mut()
            .find(|p| p.id == post)
            .ok_or_else(|| not_found("post"))?;
        if entry.user_id != viewer.as_str() {
            return Err(status_error("post", 403));
        }
        Ok(entry)
    }

    #[async_trait]
    impl FeedApi for MockFeedApi {
        async fn list_posts(&self, page: u32, size: u32, viewer: Option<&ViewerId>) -> FeedResult<Page<Post>> {
            self.begin(Endpoint::ListPosts, Some(page), viewer_str(viewer)).await?;
            Ok(self.post_page(|_, _| true, page, size, viewer))
        }

        async fn list_user_posts(
            &self,
            author: &str,
            page: u32,
            size: u32,
            viewer: Option<&ViewerId>,
        ) -> FeedResult<Page<Post>> {
            self.begin(Endpoint::ListUserPosts, Some(page), viewer_str(viewer)).await?;
            Ok(self.post_page(|_, p| p.user_id == author, page, size, viewer))
        }

        async fn list_liked_posts(
            &self,
            owner: &str,
            page: u32,
            size: u32,
            viewer: Option<&ViewerId>,
        ) -> FeedResult<Page<Post>> {
            self.begin(Endpoint::ListLikedPosts, Some(page), viewer_str(viewer)).await?;
            Ok(self.post_page(
                |s, p| s.post_likes.contains(&(owner.to_string(), p.id)),
                page,
                size,
                viewer,
            ))
        }

        async fn list_starred_posts(
            &self,
            owner: &str,
            page: u32,
            size: u32,
            viewer: Option<&ViewerId>,
        ) -> FeedResult<Page<Post>> {
            self.begin(Endpoint::ListStarredPosts, Some(page), viewer_str(viewer)).await?;
            Ok(self.post_page(
                |s, p| s.post_stars.contains(&(owner.to_string(), p.id)),
                page,
                size,
                viewer,
            ))
        }

        async fn search_posts(
            &self,
            query: &str,
            page: u32,
            size: u32,
            viewer: Option<&ViewerId>,
        ) -> FeedResult<Page<Post>> {
            self.begin(Endpoint::SearchPosts, Some(page), viewer_str(viewer)).await?;
            let needle = query.to_lowercase();
            Ok(self.post_page(
                |_, p| p.title.to_lowercase().contains(&needle) || p.content.to_lowercase().contains(&needle),
                page,
                size,
                viewer,
            ))
        }

        async fn list_comments(
            &self,
            post: PostId,
            page: u32,
            size: u32,
            viewer: Option<&ViewerId>,
        ) -> FeedResult<Page<Comment>> {
            self.begin(Endpoint::ListComments, Some(page), viewer_str(viewer)).await?;
            Ok(self.with_state(|state| {
                let comments: Vec<Comment> = state
                    .comments
                    .get(&post)
                    .map(|list| {
                        list.iter()
                            .map(|c| Self::personalise_comment(state, c, viewer))
                            .collect()
                    })
                    .unwrap_or_default();
                paginate(&comments, page, size)
            }))
        }

        async fn create_comment(&self, comment: &NewComment) -> FeedResult<Comment> {
            self.begin(Endpoint::CreateComment, None, Some(comment.user_id.as_str()))
                .await?;
            Ok(self.with_state(|state| {
                state.next_comment += 1;
                let mut created = fixtures::comment(comment.post_id, 10_000 + state.next_comment);
                created.user_id = comment.user_id.as_str().to_string();
                created.content = comment.content.clone();
                created.parent_id = comment.parent_comment_id;
                let thread = state.comments.entry(comment.post_id).or_default();
                match comment.parent_comment_id {
                    Some(parent) => {
                        if let Some(parent) = thread.iter_mut().find(|c| c.id == parent) {
                            parent.replies.push(created.clone());
                        }
                    }
                    None => thread.insert(0, created.clone()),
                }
                created
            }))
        }

        async fn toggle_post_like(&self, post: PostId, viewer: &ViewerId) -> FeedResult<LikeResult> {
            self.begin(Endpoint::TogglePostLike, None, Some(viewer.as_str())).await?;
            self.with_state(|state| -> FeedResult<LikeResult> {
                let key = (viewer.as_str().to_string(), post);
                let liked = if state.post_likes.remove(&key) {
                    false
                } else {
                    state.post_likes.insert(key);
                    true
                };
                let entry = state
                    .posts
                    .iter_mut()
                    .find(|p| p.id == post)
                    .ok_or_else(|| not_found("post"))?;
                entry.likes_count = if liked {
                    entry.likes_count + 1
                } else {
                    entry.likes_count.saturating_sub(1)
                };
                Ok(LikeResult {
                    liked,
                    likes: entry.likes_count,
                })
            })
        }

        async fn toggle_post_star(&self, post: PostId, viewer: &ViewerId) -> FeedResult<StarResult> {
            self.begin(Endpoint::TogglePostStar, None, Some(viewer.as_str())).await?;
            self.with_state(|state| -> FeedResult<StarResult> {
                let key = (viewer.as_str().to_string(), post);
                let starred = if state.post_stars.remove(&key) {
                    false
                } else {
                    state.post_stars.insert(key);
                    true
                };
                let entry = state
                    .posts
                    .iter_mut()
                    .find(|p| p.id == post)
                    .ok_or_else(|| not_found("post"))?;
                entry.stars_count = if starred {
                    entry.stars_count + 1
                } else {
                    entry.stars_count.saturating_sub(1)
                };
                Ok(StarResult {
                    starred,
                    stars: entry.stars_count,
                })
            })
        }

        async fn toggle_comment_like(&self, comment: CommentId, viewer: &ViewerId) -> FeedResult<LikeResult> {
            self.begin(Endpoint::ToggleCommentLike, None, Some(viewer.as_str())).await?;
            self.with_state(|state| -> FeedResult<LikeResult> {
                let key = (viewer.as_str().to_string(), comment);
                let liked = if state.comment_likes.remove(&key) {
                    false
                } else {
                    state.comment_likes.insert(key);
                    true
                };
                let entry = state
                    .comments
                    .values_mut()
                    .flat_map(|thread| thread.iter_mut())
                    .find(|c| c.id == comment)
                    .ok_or_else(|| not_found("comment"))?;
                entry.likes_count = if liked {
                    entry.likes_count + 1
                } else {
                    entry.likes_count.saturating_sub(1)
                };
                Ok(LikeResult {
                    liked,
                    likes: entry.likes_count,
                })
            })
        }

        async fn user_profile(&self, user: &str) -> FeedResult<UserProfile> {
            self.begin(Endpoint::UserProfile, None, None).await?;
            self.with_state(|state| state.profiles.get(user).cloned())
                .ok_or_else(|| not_found("user"))
        }

        async fn list_genres(&self) -> FeedResult<Vec<Genre>> {
            self.begin(Endpoint::ListGenres, None, None).await?;
            Ok(self.with_state(|state| state.genres.clone()))
        }

        async fn favorite_genres(&self, user: &ViewerId) -> FeedResult<Vec<Genre>> {
            self.begin(Endpoint::FavoriteGenres, None, Some(user.as_str())).await?;
            Ok(self.with_state(|state| {
                let ids = state.favorites.get(user.as_str()).cloned().unwrap_or_default();
                state
                    .genres
                    .iter()
                    .filter(|g| ids.contains(&g.id))
                    .cloned()
                    .collect()
            }))
        }

        async fn set_favorite_genres(&self, user: &ViewerId, genre_ids: &[GenreId]) -> FeedResult<Vec<Genre>> {
            self.begin(Endpoint::SetFavoriteGenres, None, Some(user.as_str())).await?;
            Ok(self.with_state(|state| {
                state
                    .favorites
                    .insert(user.as_str().to_string(), genre_ids.to_vec());
                state
                    .genres
                    .iter()
                    .filter(|g| genre_ids.contains(&g.id))
                    .cloned()
                    .collect()
            }))
        }

        async fn update_post(&self, post: PostId, edit: &PostEdit) -> FeedResult<Post> {
            self.begin(Endpoint::UpdatePost, None, Some(edit.user_id.as_str()))
                .await?;
            self.with_state(|state| -> FeedResult<Post> {
                let entry = owned_post(state, post, &edit.user_id)?;
                entry.title = edit.title.clone();
                entry.content = edit.content.clone();
                let updated = entry.clone();
                Ok(Self::personalise(state, &updated, Some(&edit.user_id)))
            })
        }

        async fn delete_post(&self, post: PostId, viewer: &ViewerId) -> FeedResult<()> {
            self.begin(Endpoint::DeletePost, None, Some(viewer.as_str())).await?;
            self.with_state(|state| -> FeedResult<()> {
                owned_post(state, post, viewer)?;
                state.posts.retain(|p| p.id != post);
                state.comments.remove(&post);
                Ok(())
            })
        }

        async fn update_username(&self, user: &ViewerId, username: &str) -> FeedResult<UserProfile> {
            self.begin(Endpoint::UpdateUsername, None, Some(user.as_str())).await?;
            self.with_state(|state| -> FeedResult<UserProfile> {
                let profile = state
                    .profiles
                    .get_mut(user.as_str())
                    .ok_or_else(|| not_found("user"))?;
                profile.username = username.to_string();
                let profile = profile.clone();
                for post in state.posts.iter_mut().filter(|p| p.user_id == user.as_str()) {
                    post.username = username.to_string();
                }
                for comment in state
                    .comments
                    .values_mut()
                    .flat_map(|thread| thread.iter_mut())
                    .filter(|c| c.user_id == user.as_str())
                {
                    comment.username = username.to_string();
                }
                Ok(profile)
            })
        }

        async fn register_profile(&self, profile: &NewProfile) -> FeedResult<UserProfile> {
            self.begin(Endpoint::RegisterProfile, None, Some(profile.user_id.as_str()))
                .await?;
            self.with_state(|state| -> FeedResult<UserProfile> {
                let id = profile.user_id.as_str().to_string();
                if state.profiles.contains_key(&id) {
                    return Err(status_error("user", 409));
                }
                let mut created = fixtures::profile(&id, 0);
                created.username = profile.username.clone();
                created.email = profile.email.clone();
                state.profiles.insert(id, created.clone());
                Ok(created)
            })
        }

        async fn profile_exists(&self, user: &ViewerId) -> FeedResult<bool> {
            self.begin(Endpoint::ProfileExists, None, Some(user.as_str())).await?;
            Ok(self.with_state(|state| state.profiles.contains_key(user.as_str())))
        }
    }

    /// [`ReactionView`] that records every render.
    #[derive(Default)]
    pub struct RecordingView {
        renders: Mutex<Vec<(ReactionTarget, ReactionState, MutationPhase)>>,
    }

    impl RecordingView {
        pub fn renders(&self) -> Vec<(ReactionTarget, ReactionState, MutationPhase)> {
            self.renders.lock().map(|r| r.clone()).unwrap_or_default()
        }

        /// The state currently displayed, if anything was rendered.
        pub fn displayed(&self) -> Option<ReactionState> {
            self.renders().last().map(|(_, state, _)| *state)
        }
    }

    impl ReactionView for RecordingView {
        fn render(&self, target: ReactionTarget, state: ReactionState, phase: MutationPhase) {
            if let Ok(mut renders) = self.renders.lock() {
                renders.push((target, state, phase));
            }
        }
    }

    /// [`PrefetchObserver`] that records every outcome.
    #[derive(Default)]
    pub struct RecordingObserver {
        seen: Mutex<Vec<(u32, String, PrefetchOutcome)>>,
    }

    impl RecordingObserver {
        pub fn outcomes(&self) -> Vec<(u32, String, PrefetchOutcome)> {
            self.seen.lock().map(|s| s.clone()).unwrap_or_default()
        }

        pub fn failures(&self) -> usize {
            self.outcomes()
                .iter()
                .filter(|(_, _, o)| matches!(o, PrefetchOutcome::Failed(_)))
                .count()
        }
    }

    impl PrefetchObserver for RecordingObserver {
        fn on_outcome(&self, page: u32, key: &CacheKey, outcome: &PrefetchOutcome) {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push((page, key.encode(), outcome.clone()));
            }
        }
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Deterministic entities for common scenarios.

    use super::*;
    pub use super::fixture_uuid;

    pub fn post_id(n: u32) -> PostId {
        PostId::new(fixture_uuid(u128::from(n)))
    }

    /// Comment number `n` under `post`; distinct across posts.
    pub fn comment_id(post: PostId, n: u128) -> CommentId {
        let thread = post.as_uuid().as_u128() & 0xffff_ffff;
        CommentId::new(fixture_uuid(1 << 64 | thread << 32 | n))
    }

    /// Post number `n` by `user_{n % 3}`.
    pub fn post(n: u32) -> Post {
        Post {
            id: post_id(n),
            user_id: format!("user_{}", n % 3),
            username: format!("author{}", n % 3),
            level: Some(1),
            title: format!("Post {}", n),
            content: format!("Body of post {}", n),
            images: Vec::new(),
            created_at: fixture_time(n),
            likes_count: n % 5,
            stars_count: n % 2,
            liked: false,
            starred: false,
            genres: Vec::new(),
        }
    }

    /// `count` posts, newest first, as the feed endpoint orders them.
    pub fn posts(count: u32) -> Vec<Post> {
        (0..count).rev().map(post).collect()
    }

    pub fn comment(post: PostId, n: u128) -> Comment {
        Comment {
            id: comment_id(post, n),
            post_id: post,
            user_id: "user_1".to_string(),
            username: "author1".to_string(),
            content: format!("Comment {}", n),
            parent_id: None,
            replies: Vec::new(),
            likes_count: 0,
            liked: false,
            created_at: fixture_time(n as u32),
        }
    }

    pub fn comments(post: PostId, count: u128) -> Vec<Comment> {
        (0..count).map(|n| comment(post, n)).collect()
    }

    pub fn genres() -> Vec<Genre> {
        ["Fantasy", "Sci-Fi", "Horror", "Romance", "Mystery"]
            .iter()
            .enumerate()
            .map(|(i, name)| Genre {
                id: i as GenreId + 1,
                name: name.to_string(),
                description: None,
            })
            .collect()
    }

    pub fn profile(user: &str, experience: u32) -> UserProfile {
        UserProfile {
            user_id: user.to_string(),
            username: user.trim_start_matches("user_").to_string(),
            email: format!("{}@example.com", user),
            profile_image_url: None,
            experience,
            level: feedcache_core::level_for(experience),
            created_at: fixture_time(0),
        }
    }

    pub fn page_of(count: u32, page: u32, size: u32) -> Page<Post> {
        paginate(&posts(count), page, size)
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for wire entities.

    use super::*;
    use proptest::prelude::*;

    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    pub fn arb_post_id() -> impl Strategy<Value = PostId> {
        arb_uuid().prop_map(PostId::new)
    }

    /// Viewer ids including the separator and escape characters.
    pub fn arb_viewer_id() -> impl Strategy<Value = ViewerId> {
        "[a-zA-Z0-9_|%=]{1,24}".prop_map(ViewerId::new)
    }

    pub fn arb_reaction_state() -> impl Strategy<Value = ReactionState> {
        (any::<bool>(), 0u32..10_000).prop_map(|(active, count)| {
            // An active reaction implies at least one.
            ReactionState::new(active, if active { count.max(1) } else { count })
        })
    }

    pub fn arb_post() -> impl Strategy<Value = Post> {
        (arb_post_id(), "[a-z ]{1,40}", 0u32..1000, 0u32..1000, any::<bool>(), any::<bool>()).prop_map(
            |(id, title, likes, stars, liked, starred)| Post {
                id,
                title,
                likes_count: likes,
                stars_count: stars,
                liked,
                starred,
                ..fixtures::post(0)
            },
        )
    }

    pub fn arb_post_page() -> impl Strategy<Value = Page<Post>> {
        (prop::collection::vec(arb_post(), 0..9), 0u32..5).prop_map(|(content, number)| Page {
            total_pages: number + 1,
            number,
            size: Some(9),
            total_elements: None,
            content,
        })
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions on [`FeedResult`] error variants.

    use super::*;

    #[track_caller]
    pub fn assert_transport_error<T: std::fmt::Debug>(result: &FeedResult<T>) {
        match result {
            Err(FeedError::Transport(_)) => {}
            other => panic!("Expected Transport error, got: {:?}", other),
        }
    }

    #[track_caller]
    pub fn assert_validation_error<T: std::fmt::Debug>(result: &FeedResult<T>) {
        match result {
            Err(FeedError::Validation(_)) => {}
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    /// Assert a [`ValidationError::LimitExceeded`] with the given counts.
    #[track_caller]
    pub fn assert_limit_exceeded<T: std::fmt::Debug>(result: &FeedResult<T>, selected: usize, limit: usize) {
        match result {
            Err(FeedError::Validation(ValidationError::LimitExceeded {
                selected: s,
                limit: l,
                ..
            })) => {
                assert_eq!((*s, *l), (selected, limit), "Wrong counts in LimitExceeded");
            }
            other => panic!("Expected LimitExceeded, got: {:?}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_paginate_splits_evenly() {
        let posts = fixtures::posts(27);
        let last = paginate(&posts, 2, 9);
        assert_eq!(last.total_pages, 3);
        assert_eq!(last.content.len(), 9);
        assert!(!last.has_next());

        let beyond = paginate(&posts, 5, 9);
        assert!(beyond.content.is_empty());
        assert_eq!(paginate::<Post>(&[], 0, 9).total_pages, 0);
    }

    #[test]
    fn test_fixture_ids_are_distinct() {
        assert_ne!(fixtures::post_id(1), fixtures::post_id(2));
        assert_ne!(
            fixtures::comment_id(fixtures::post_id(1), 0),
            fixtures::comment_id(fixtures::post_id(2), 0)
        );
        assert_ne!(
            fixtures::comment_id(fixtures::post_id(1), 1).as_uuid(),
            fixtures::post_id(1).as_uuid()
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(50))]

        #[test]
        fn prop_generated_reaction_state_toggles_back(state in generators::arb_reaction_state()) {
            prop_assert_eq!(state.toggled().toggled(), state);
        }

        #[test]
        fn prop_generated_page_number_in_range(page in generators::arb_post_page()) {
            prop_assert!(page.number < page.total_pages);
        }
    }
}
