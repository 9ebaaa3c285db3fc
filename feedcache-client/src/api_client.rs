//! REST client for the feed backend.
//!
//! [`FeedApi`] is the seam the cached service talks to; [`RestClient`] is
//! the reqwest implementation used in production and tests substitute a
//! scripted one.

use std::time::Duration;

use async_trait::async_trait;
use feedcache_core::{
    Comment, CommentId, FeedResult, Genre, GenreId, LikeResult, Page, Post, PostId, StarResult,
    TransportError, UserProfile, ViewerId,
};
use reqwest::Method;
use serde::de::IgnoredAny;
use serde::Serialize;

use crate::config::ClientConfig;

#[derive(Debug, thiserror::Error)]
pub enum ApiClientError {
    #[error("HTTP error for {url}: {source}")]
    Http {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("HTTP {status} from {url}: {body}")]
    Status { url: String, status: u16, body: String },
    #[error("Unexpected response from {url}: {reason}")]
    InvalidResponse { url: String, reason: String },
    #[error("Config error: {0}")]
    Config(String),
}

impl From<ApiClientError> for TransportError {
    fn from(err: ApiClientError) -> Self {
        match err {
            ApiClientError::Http { url, source } if source.is_decode() => {
                TransportError::InvalidResponse {
                    url,
                    reason: source.to_string(),
                }
            }
            ApiClientError::Http { url, source } => TransportError::RequestFailed {
                url,
                reason: source.to_string(),
            },
            ApiClientError::Status { url, status, .. } => TransportError::Status { url, status },
            ApiClientError::InvalidResponse { url, reason } => {
                TransportError::InvalidResponse { url, reason }
            }
            ApiClientError::Config(reason) => TransportError::RequestFailed {
                url: String::new(),
                reason,
            },
        }
    }
}

impl From<ApiClientError> for feedcache_core::FeedError {
    fn from(err: ApiClientError) -> Self {
        TransportError::from(err).into()
    }
}

/// Body of a new comment or reply. Sent as form fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub post_id: PostId,
    pub user_id: ViewerId,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_comment_id: Option<CommentId>,
}

/// New title and body for an existing post. Sent as form fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PostEdit {
    pub user_id: ViewerId,
    pub title: String,
    pub content: String,
}

/// Registration for a viewer seen for the first time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewProfile {
    pub user_id: ViewerId,
    pub username: String,
    pub email: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenreSelection<'a> {
    genre_ids: &'a [GenreId],
}

#[derive(Debug, Serialize)]
struct UsernameChange<'a> {
    username: &'a str,
}

/// Backend operations the cached service depends on.
///
/// `viewer` parameters personalise `liked`/`starred` fields; `None` fetches
/// the anonymous view.
#[async_trait]
pub trait FeedApi: Send + Sync {
    /// `GET /api/posts/all`
    async fn list_posts(&self, page: u32, size: u32, viewer: Option<&ViewerId>) -> FeedResult<Page<Post>>;

    /// `GET /api/posts/user/{userId}`
    async fn list_user_posts(
        &self,
        author: &str,
        page: u32,
        size: u32,
        viewer: Option<&ViewerId>,
    ) -> FeedResult<Page<Post>>;

    /// `GET /api/posts/liked/{userId}`
    async fn list_liked_posts(
        &self,
        owner: &str,
        page: u32,
        size: u32,
        viewer: Option<&ViewerId>,
    ) -> FeedResult<Page<Post>>;

    /// `GET /api/posts/starred/{userId}`
    async fn list_starred_posts(
        &self,
        owner: &str,
        page: u32,
        size: u32,
        viewer: Option<&ViewerId>,
    ) -> FeedResult<Page<Post>>;

    /// `GET /api/posts/search/posts`
    async fn search_posts(
        &self,
        query: &str,
        page: u32,
        size: u32,
        viewer: Option<&ViewerId>,
    ) -> FeedResult<Page<Post>>;

    /// `GET /api/comments/post/{postId}`
    async fn list_comments(
        &self,
        post: PostId,
        page: u32,
        size: u32,
        viewer: Option<&ViewerId>,
    ) -> FeedResult<Page<Comment>>;

    /// `POST /api/comments/create`
    async fn create_comment(&self, comment: &NewComment) -> FeedResult<Comment>;

    /// `POST /api/posts/{postId}/like`
    async fn toggle_post_like(&self, post: PostId, viewer: &ViewerId) -> FeedResult<LikeResult>;

    /// `POST /api/posts/{postId}/star`
    async fn toggle_post_star(&self, post: PostId, viewer: &ViewerId) -> FeedResult<StarResult>;

    /// `POST /api/comments/{commentId}/like`
    async fn toggle_comment_like(&self, comment: CommentId, viewer: &ViewerId) -> FeedResult<LikeResult>;

    /// `GET /api/users/{userId}`
    async fn user_profile(&self, user: &str) -> FeedResult<UserProfile>;

    /// `GET /api/genres`
    async fn list_genres(&self) -> FeedResult<Vec<Genre>>;

    /// `GET /api/genres/users/{userId}`
    async fn favorite_genres(&self, user: &ViewerId) -> FeedResult<Vec<Genre>>;

    /// `PUT /api/genres/users/{userId}`
    async fn set_favorite_genres(&self, user: &ViewerId, genre_ids: &[GenreId]) -> FeedResult<Vec<Genre>>;

    /// `PUT /api/posts/{postId}`; only the author may edit.
    async fn update_post(&self, post: PostId, edit: &PostEdit) -> FeedResult<Post>;

    /// `DELETE /api/posts/{postId}?userId`; only the author may delete.
    async fn delete_post(&self, post: PostId, viewer: &ViewerId) -> FeedResult<()>;

    /// `PATCH /api/users/{userId}/username`
    async fn update_username(&self, user: &ViewerId, username: &str) -> FeedResult<UserProfile>;

    /// `POST /api/users/register`
    async fn register_profile(&self, profile: &NewProfile) -> FeedResult<UserProfile>;

    /// `GET /api/users/exists/{userId}`
    async fn profile_exists(&self, user: &ViewerId) -> FeedResult<bool>;
}

#[derive(Clone)]
pub struct RestClient {
    client: reqwest::Client,
    base_url: String,
}

impl RestClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ApiClientError> {
        let timeout = Duration::from_millis(config.request_timeout_ms);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ApiClientError::Config(e.to_string()))?;

        Ok(Self {
            client,
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for `segments`, each percent-encoded as one path segment.
    fn url(&self, segments: &[&str]) -> Result<String, ApiClientError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| ApiClientError::Config(format!("invalid base url {}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| ApiClientError::Config(format!("base url {} cannot take a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url.to_string())
    }

    async fn get_json<T, Q>(&self, segments: &[&str], query: Option<&Q>) -> Result<T, ApiClientError>
    where
        T: serde::de::DeserializeOwned,
        Q: Serialize + ?Sized,
    {
        let url = self.url(segments)?;
        let mut request = self.client.get(&url);
        if let Some(query) = query {
            request = request.query(query);
        }
        let response = request.send().await.map_err(|source| ApiClientError::Http {
            url: url.clone(),
            source,
        })?;
        parse_response(url, response).await
    }

    async fn send_json<T, Q, B>(
        &self,
        method: Method,
        segments: &[&str],
        query: Option<&Q>,
        body: Option<&B>,
    ) -> Result<T, ApiClientError>
    where
        T: serde::de::DeserializeOwned,
        Q: Serialize + ?Sized,
        B: Serialize + ?Sized,
    {
        let url = self.url(segments)?;
        let mut request = self.client.request(method, &url);
        if let Some(query) = query {
            request = request.query(query);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await.map_err(|source| ApiClientError::Http {
            url: url.clone(),
            source,
        })?;
        parse_response(url, response).await
    }

    async fn send_form<T, B>(&self, method: Method, segments: &[&str], form: &B) -> Result<T, ApiClientError>
    where
        T: serde::de::DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let url = self.url(segments)?;
        let response = self
            .client
            .request(method, &url)
            .form(form)
            .send()
            .await
            .map_err(|source| ApiClientError::Http {
                url: url.clone(),
                source,
            })?;
        parse_response(url, response).await
    }

    async fn post_query<T>(&self, segments: &[&str], query: &[(&str, &str)]) -> Result<T, ApiClientError>
    where
        T: serde::de::DeserializeOwned,
    {
        self.send_json::<T, _, ()>(Method::POST, segments, Some(query), None)
            .await
    }
}

/// Query string for paginated listings. `viewer_param` differs per endpoint.
fn page_query(page: u32, size: u32, viewer_param: &'static str, viewer: Option<&ViewerId>) -> Vec<(&'static str, String)> {
    let mut query = vec![("page", page.to_string()), ("size", size.to_string())];
    if let Some(viewer) = viewer {
        query.push((viewer_param, viewer.as_str().to_string()));
    }
    query
}

async fn parse_response<T: serde::de::DeserializeOwned>(
    url: String,
    response: reqwest::Response,
) -> Result<T, ApiClientError> {
    let status = response.status();
    if status.is_success() {
        let bytes = response.bytes().await.map_err(|source| ApiClientError::Http {
            url: url.clone(),
            source,
        })?;
        serde_json::from_slice(&bytes).map_err(|e| ApiClientError::InvalidResponse {
            url,
            reason: e.to_string(),
        })
    } else {
        let body = response.text().await.unwrap_or_default();
        tracing::debug!(%url, status = status.as_u16(), "backend returned error status");
        Err(ApiClientError::Status {
            url,
            status: status.as_u16(),
            body,
        })
    }
}

#[async_trait]
impl FeedApi for RestClient {
    async fn list_posts(&self, page: u32, size: u32, viewer: Option<&ViewerId>) -> FeedResult<Page<Post>> {
        let query = page_query(page, size, "userId", viewer);
        Ok(self.get_json(&["api", "posts", "all"], Some(&query)).await?)
    }

    async fn list_user_posts(
        &self,
        author: &str,
        page: u32,
        size: u32,
        viewer: Option<&ViewerId>,
    ) -> FeedResult<Page<Post>> {
        let query = page_query(page, size, "currentUserId", viewer);
        Ok(self
            .get_json(&["api", "posts", "user", author], Some(&query))
            .await?)
    }

    async fn list_liked_posts(
        &self,
        owner: &str,
        page: u32,
        size: u32,
        viewer: Option<&ViewerId>,
    ) -> FeedResult<Page<Post>> {
        let query = page_query(page, size, "currentUserId", viewer);
        Ok(self
            .get_json(&["api", "posts", "liked", owner], Some(&query))
            .await?)
    }

    async fn list_starred_posts(
        &self,
        owner: &str,
        page: u32,
        size: u32,
        viewer: Option<&ViewerId>,
    ) -> FeedResult<Page<Post>> {
        let query = page_query(page, size, "currentUserId", viewer);
        Ok(self
            .get_json(&["api", "posts", "starred", owner], Some(&query))
            .await?)
    }

    async fn search_posts(
        &self,
        query: &str,
        page: u32,
        size: u32,
        viewer: Option<&ViewerId>,
    ) -> FeedResult<Page<Post>> {
        let mut params = vec![("q", query.to_string())];
        params.extend(page_query(page, size, "currentUserId", viewer));
        Ok(self
            .get_json(&["api", "posts", "search", "posts"], Some(&params))
            .await?)
    }

    async fn list_comments(
        &self,
        post: PostId,
        page: u32,
        size: u32,
        viewer: Option<&ViewerId>,
    ) -> FeedResult<Page<Comment>> {
        let post = post.to_string();
        let query = page_query(page, size, "userId", viewer);
        Ok(self
            .get_json(&["api", "comments", "post", &post], Some(&query))
            .await?)
    }

    async fn create_comment(&self, comment: &NewComment) -> FeedResult<Comment> {
        Ok(self
            .send_form(Method::POST, &["api", "comments", "create"], comment)
            .await?)
    }

    async fn toggle_post_like(&self, post: PostId, viewer: &ViewerId) -> FeedResult<LikeResult> {
        let post = post.to_string();
        Ok(self
            .post_query(&["api", "posts", &post, "like"], &[("userId", viewer.as_str())])
            .await?)
    }

    async fn toggle_post_star(&self, post: PostId, viewer: &ViewerId) -> FeedResult<StarResult> {
        let post = post.to_string();
        Ok(self
            .post_query(&["api", "posts", &post, "star"], &[("userId", viewer.as_str())])
            .await?)
    }

    async fn toggle_comment_like(&self, comment: CommentId, viewer: &ViewerId) -> FeedResult<LikeResult> {
        let comment = comment.to_string();
        Ok(self
            .post_query(&["api", "comments", &comment, "like"], &[("userId", viewer.as_str())])
            .await?)
    }

    async fn user_profile(&self, user: &str) -> FeedResult<UserProfile> {
        Ok(self
            .get_json::<UserProfile, ()>(&["api", "users", user], None)
            .await?)
    }

    async fn list_genres(&self) -> FeedResult<Vec<Genre>> {
        Ok(self.get_json::<Vec<Genre>, ()>(&["api", "genres"], None).await?)
    }

    async fn favorite_genres(&self, user: &ViewerId) -> FeedResult<Vec<Genre>> {
        Ok(self
            .get_json::<Vec<Genre>, ()>(&["api", "genres", "users", user.as_str()], None)
            .await?)
    }

    async fn set_favorite_genres(&self, user: &ViewerId, genre_ids: &[GenreId]) -> FeedResult<Vec<Genre>> {
        let body = GenreSelection { genre_ids };
        Ok(self
            .send_json::<_, (), _>(
                Method::PUT,
                &["api", "genres", "users", user.as_str()],
                None,
                Some(&body),
            )
            .await?)
    }

    async fn update_post(&self, post: PostId, edit: &PostEdit) -> FeedResult<Post> {
        let post = post.to_string();
        Ok(self
            .send_form(Method::PUT, &["api", "posts", &post], edit)
            .await?)
    }

    async fn delete_post(&self, post: PostId, viewer: &ViewerId) -> FeedResult<()> {
        let post = post.to_string();
        // Body is a confirmation message; only the status matters.
        self.send_json::<IgnoredAny, _, ()>(
            Method::DELETE,
            &["api", "posts", &post],
            Some(&[("userId", viewer.as_str())]),
            None,
        )
        .await?;
        Ok(())
    }

    async fn update_username(&self, user: &ViewerId, username: &str) -> FeedResult<UserProfile> {
        Ok(self
            .send_json::<_, (), _>(
                Method::PATCH,
                &["api", "users", user.as_str(), "username"],
                None,
                Some(&UsernameChange { username }),
            )
            .await?)
    }

    async fn register_profile(&self, profile: &NewProfile) -> FeedResult<UserProfile> {
        Ok(self
            .send_json::<_, (), _>(Method::POST, &["api", "users", "register"], None, Some(profile))
            .await?)
    }

    async fn profile_exists(&self, user: &ViewerId) -> FeedResult<bool> {
        Ok(self
            .get_json::<bool, ()>(&["api", "users", "exists", user.as_str()], None)
            .await?)
    }
}
