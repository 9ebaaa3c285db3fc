//! Wire entities returned by the feed backend.
//!
//! Field names follow the backend's camelCase JSON. Timestamps are emitted
//! by the backend without an offset, so they decode as `NaiveDateTime`.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::identity::{CommentId, GenreId, PostId};

/// An image attached to a post. Position 0 is the cover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostImage {
    pub id: uuid::Uuid,
    pub position: i32,
    pub url: String,
}

/// A content genre that posts are tagged with and viewers can favorite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Genre {
    pub id: GenreId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A post as seen by a particular viewer.
///
/// `liked` and `starred` are personalised: the same post carries different
/// values for different viewers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: PostId,
    pub user_id: String,
    pub username: String,
    #[serde(default)]
    pub level: Option<i32>,
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub images: Vec<PostImage>,
    pub created_at: NaiveDateTime,
    #[serde(default)]
    pub likes_count: u32,
    #[serde(default)]
    pub stars_count: u32,
    #[serde(default)]
    pub liked: bool,
    #[serde(default)]
    pub starred: bool,
    #[serde(default)]
    pub genres: Vec<Genre>,
}

impl Post {
    /// Current like state of this post for the viewer it was fetched for.
    pub fn like_state(&self) -> ReactionState {
        ReactionState::new(self.liked, self.likes_count)
    }

    /// Current star state of this post for the viewer it was fetched for.
    pub fn star_state(&self) -> ReactionState {
        ReactionState::new(self.starred, self.stars_count)
    }

    /// Cover image, if the post has any images.
    pub fn cover(&self) -> Option<&PostImage> {
        self.images.iter().min_by_key(|image| image.position)
    }
}

/// A comment with its nested replies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: CommentId,
    pub post_id: PostId,
    pub user_id: String,
    pub username: String,
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<CommentId>,
    #[serde(default)]
    pub replies: Vec<Comment>,
    #[serde(default)]
    pub likes_count: u32,
    #[serde(default)]
    pub liked: bool,
    pub created_at: NaiveDateTime,
}

impl Comment {
    pub fn like_state(&self) -> ReactionState {
        ReactionState::new(self.liked, self.likes_count)
    }

    /// Find a comment by id in this thread, including nested replies.
    pub fn find(&self, id: CommentId) -> Option<&Comment> {
        if self.id == id {
            return Some(self);
        }
        self.replies.iter().find_map(|reply| reply.find(id))
    }
}

/// Paginated listing envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub total_pages: u32,
    /// Zero-based index of this page.
    pub number: u32,
    #[serde(default)]
    pub size: Option<u32>,
    #[serde(default)]
    pub total_elements: Option<u64>,
}

impl<T> Page<T> {
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }

    pub fn has_next(&self) -> bool {
        self.number + 1 < self.total_pages
    }

    pub fn has_previous(&self) -> bool {
        self.number > 0
    }
}

/// Authoritative result of a like toggle on a post or comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LikeResult {
    pub liked: bool,
    pub likes: u32,
}

impl From<LikeResult> for ReactionState {
    fn from(result: LikeResult) -> Self {
        ReactionState::new(result.liked, result.likes)
    }
}

/// Authoritative result of a star toggle on a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StarResult {
    pub starred: bool,
    pub stars: u32,
}

impl From<StarResult> for ReactionState {
    fn from(result: StarResult) -> Self {
        ReactionState::new(result.starred, result.stars)
    }
}

/// Toggle-style reaction as displayed to the viewer: "did I react" plus the
/// total count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ReactionState {
    pub active: bool,
    pub count: u32,
}

impl ReactionState {
    pub fn new(active: bool, count: u32) -> Self {
        Self { active, count }
    }

    /// The state the viewer expects to see after toggling.
    pub fn toggled(self) -> Self {
        if self.active {
            Self::new(false, self.count.saturating_sub(1))
        } else {
            Self::new(true, self.count.saturating_add(1))
        }
    }
}

/// Viewer profile with experience and level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub user_id: String,
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub profile_image_url: Option<String>,
    #[serde(default)]
    pub experience: u32,
    #[serde(default = "default_level")]
    pub level: u32,
    pub created_at: NaiveDateTime,
}

fn default_level() -> u32 {
    1
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::EntityIdType;

    #[test]
    fn test_post_decodes_backend_json() {
        let id = uuid::Uuid::now_v7();
        let json = format!(
            r#"{{
                "id": "{id}",
                "userId": "user_1",
                "username": "alice",
                "level": 3,
                "title": "Hello",
                "content": "World",
                "images": [
                    {{"id": "{id}", "position": 1, "url": "b.png"}},
                    {{"id": "{id}", "position": 0, "url": "a.png"}}
                ],
                "createdAt": "2024-05-01T12:30:00",
                "likesCount": 4,
                "starsCount": 1,
                "liked": true,
                "starred": false,
                "genres": [{{"id": 2, "name": "Jazz", "description": null}}]
            }}"#
        );

        let post: Post = serde_json::from_str(&json).unwrap();
        assert_eq!(post.id.as_uuid(), id);
        assert_eq!(post.like_state(), ReactionState::new(true, 4));
        assert_eq!(post.star_state(), ReactionState::new(false, 1));
        assert_eq!(post.cover().map(|i| i.url.as_str()), Some("a.png"));
        assert_eq!(post.genres[0].name, "Jazz");
    }

    #[test]
    fn test_post_optional_fields_default() {
        let id = uuid::Uuid::now_v7();
        let json = format!(
            r#"{{"id":"{id}","userId":"u","username":"n","title":"t","content":"c","createdAt":"2024-05-01T12:30:00"}}"#
        );
        let post: Post = serde_json::from_str(&json).unwrap();
        assert!(post.images.is_empty());
        assert!(post.cover().is_none());
        assert_eq!(post.like_state(), ReactionState::default());
    }

    #[test]
    fn test_page_navigation_flags() {
        let page: Page<u8> = Page {
            content: vec![1, 2, 3],
            total_pages: 3,
            number: 0,
            size: Some(3),
            total_elements: Some(9),
        };
        assert!(page.has_next());
        assert!(!page.has_previous());

        let last = Page { number: 2, ..page };
        assert!(!last.has_next());
        assert!(last.has_previous());
    }

    #[test]
    fn test_reaction_toggle() {
        let off = ReactionState::new(false, 4);
        assert_eq!(off.toggled(), ReactionState::new(true, 5));
        assert_eq!(off.toggled().toggled(), off);

        let zero_active = ReactionState::new(true, 0);
        assert_eq!(zero_active.toggled(), ReactionState::new(false, 0));
    }

    #[test]
    fn test_reaction_results_convert() {
        let like = LikeResult { liked: true, likes: 9 };
        assert_eq!(ReactionState::from(like), ReactionState::new(true, 9));
        let star = StarResult { starred: false, stars: 2 };
        assert_eq!(ReactionState::from(star), ReactionState::new(false, 2));
    }

    #[test]
    fn test_comment_find_nested_reply() {
        let created_at = NaiveDateTime::parse_from_str("2024-05-01T12:30:00", "%Y-%m-%dT%H:%M:%S")
            .unwrap();
        let post_id = PostId::now_v7();
        let reply = Comment {
            id: CommentId::now_v7(),
            post_id,
            user_id: "u2".into(),
            username: "bob".into(),
            content: "reply".into(),
            parent_id: None,
            replies: vec![],
            likes_count: 0,
            liked: false,
            created_at,
        };
        let root = Comment {
            id: CommentId::now_v7(),
            replies: vec![reply.clone()],
            content: "root".into(),
            ..reply.clone()
        };

        assert_eq!(root.find(reply.id).map(|c| c.content.as_str()), Some("reply"));
        assert!(root.find(CommentId::now_v7()).is_none());
    }
}
