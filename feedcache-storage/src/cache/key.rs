//! Viewer-scoped cache keys.
//!
//! A [`CacheKey`] cannot be constructed without a [`ViewerScope`]: the caller
//! has to say whether a resource is shared between viewers or personalised.
//! Personalised pages (posts carry `liked`/`starred`) are keyed per viewer so
//! one viewer's reactions are never served to another on the same device.
//!
//! # String Format
//!
//! ```text
//! <resource>|<scope>[|p<index>:<size>]
//! ```
//!
//! - `resource`: escaped resource path, e.g. `posts/all`, `comments_post_<id>`
//! - `scope`: `shared`, `anon`, or `v=<escaped viewer id>`
//! - pagination is optional
//!
//! `%` and `|` are percent-escaped inside segments, so the encoding is
//! injective and every key for a resource starts with
//! [`CacheKey::resource_prefix`].

use std::fmt;

use feedcache_core::ViewerId;

/// Separator between key segments.
const SEPARATOR: char = '|';

/// Whose view of a resource is being cached.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ViewerScope {
    /// Identical for every viewer (e.g. the genre catalogue).
    Shared,
    /// Personalised resource requested without a signed-in viewer.
    Anonymous,
    /// Personalised resource for a specific viewer.
    Viewer(ViewerId),
}

impl ViewerScope {
    pub fn viewer(id: ViewerId) -> Self {
        ViewerScope::Viewer(id)
    }

    /// Personalised scope for an optional viewer.
    pub fn personal(viewer: Option<&ViewerId>) -> Self {
        match viewer {
            Some(id) => ViewerScope::Viewer(id.clone()),
            None => ViewerScope::Anonymous,
        }
    }

    fn encode(&self) -> String {
        match self {
            ViewerScope::Shared => "shared".to_string(),
            ViewerScope::Anonymous => "anon".to_string(),
            ViewerScope::Viewer(id) => format!("v={}", escape(id.as_str())),
        }
    }

    fn decode(segment: &str) -> Option<Self> {
        match segment {
            "shared" => Some(ViewerScope::Shared),
            "anon" => Some(ViewerScope::Anonymous),
            other => {
                let id = other.strip_prefix("v=")?;
                Some(ViewerScope::Viewer(ViewerId::new(unescape(id)?)))
            }
        }
    }
}

/// Pagination parameters that take part in key derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageParams {
    pub index: u32,
    pub size: u32,
}

impl PageParams {
    pub fn new(index: u32, size: u32) -> Self {
        Self { index, size }
    }
}

/// A cache key derived from resource path, viewer scope and pagination.
///
/// # Design
///
/// The private inner struct ensures that a `CacheKey` can ONLY be built via
/// [`CacheKey::new`], which requires a viewer scope. Equal inputs always
/// produce equal strings; different inputs always produce different strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    inner: KeyInner,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct KeyInner {
    resource: String,
    scope: ViewerScope,
    page: Option<PageParams>,
}

impl CacheKey {
    pub fn new(resource: impl Into<String>, scope: ViewerScope, page: Option<PageParams>) -> Self {
        Self {
            inner: KeyInner {
                resource: resource.into(),
                scope,
                page,
            },
        }
    }

    /// Key for one page of a paginated resource.
    pub fn page(resource: impl Into<String>, scope: ViewerScope, index: u32, size: u32) -> Self {
        Self::new(resource, scope, Some(PageParams::new(index, size)))
    }

    pub fn resource(&self) -> &str {
        &self.inner.resource
    }

    pub fn scope(&self) -> &ViewerScope {
        &self.inner.scope
    }

    pub fn page_params(&self) -> Option<PageParams> {
        self.inner.page
    }

    /// Same resource and scope, different page index.
    pub fn with_page_index(&self, index: u32) -> Self {
        let mut key = self.clone();
        if let Some(page) = key.inner.page.as_mut() {
            page.index = index;
        }
        key
    }

    /// Encode to the string stored in the [`KeyedStore`](super::KeyedStore).
    pub fn encode(&self) -> String {
        let mut out = Self::scope_prefix(&self.inner.resource, &self.inner.scope);
        if let Some(page) = self.inner.page {
            out.push(SEPARATOR);
            out.push_str(&format!("p{}:{}", page.index, page.size));
        }
        out
    }

    /// Decode a stored key string.
    ///
    /// Returns `None` for strings this module did not produce.
    pub fn decode(encoded: &str) -> Option<Self> {
        let mut parts = encoded.split(SEPARATOR);
        let resource = unescape(parts.next()?)?;
        let scope = ViewerScope::decode(parts.next()?)?;
        let page = match parts.next() {
            None => None,
            Some(segment) => {
                let (index, size) = segment.strip_prefix('p')?.split_once(':')?;
                Some(PageParams::new(index.parse().ok()?, size.parse().ok()?))
            }
        };
        if parts.next().is_some() {
            return None;
        }
        let key = Self::new(resource, scope, page);
        // Reject non-canonical spellings such as "p01:9".
        (key.encode() == encoded).then_some(key)
    }

    /// Prefix shared by every key of `resource`, across all scopes and pages.
    pub fn resource_prefix(resource: &str) -> String {
        let mut out = escape(resource);
        out.push(SEPARATOR);
        out
    }

    /// Leading part of every key of `resource` in one scope. It ends inside
    /// the scope segment, so `v=al` also prefixes `v=alice`. Use
    /// [`CacheKey::pages_prefix`] for invalidation.
    pub fn scope_prefix(resource: &str, scope: &ViewerScope) -> String {
        let mut out = Self::resource_prefix(resource);
        out.push_str(&scope.encode());
        out
    }

    /// Prefix shared by every page of `resource` in exactly one scope.
    pub fn pages_prefix(resource: &str, scope: &ViewerScope) -> String {
        let mut out = Self::scope_prefix(resource, scope);
        out.push(SEPARATOR);
        out
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.encode())
    }
}

fn escape(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for c in segment.chars() {
        match c {
            '%' => out.push_str("%25"),
            '|' => out.push_str("%7C"),
            other => out.push(other),
        }
    }
    out
}

fn unescape(segment: &str) -> Option<String> {
    if segment.contains(SEPARATOR) {
        return None;
    }
    let mut out = String::with_capacity(segment.len());
    let mut rest = segment;
    while let Some(pos) = rest.find('%') {
        out.push_str(&rest[..pos]);
        let code = rest.get(pos + 1..pos + 3)?;
        match code {
            "25" => out.push('%'),
            "7C" => out.push('|'),
            _ => return None,
        }
        rest = &rest[pos + 3..];
    }
    out.push_str(rest);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> ViewerScope {
        ViewerScope::viewer(ViewerId::from("user_alice"))
    }

    #[test]
    fn test_encode_format() {
        let key = CacheKey::page("posts/all", alice(), 0, 9);
        assert_eq!(key.encode(), "posts/all|v=user_alice|p0:9");

        let shared = CacheKey::new("genres", ViewerScope::Shared, None);
        assert_eq!(shared.encode(), "genres|shared");

        let anon = CacheKey::page("posts/all", ViewerScope::Anonymous, 2, 9);
        assert_eq!(anon.encode(), "posts/all|anon|p2:9");
    }

    #[test]
    fn test_same_inputs_same_key() {
        let a = CacheKey::page("posts/all", alice(), 1, 9);
        let b = CacheKey::page("posts/all", alice(), 1, 9);
        assert_eq!(a.encode(), b.encode());
    }

    #[test]
    fn test_viewer_is_part_of_key() {
        let a = CacheKey::page("posts/all", alice(), 0, 9);
        let b = CacheKey::page("posts/all", ViewerScope::viewer(ViewerId::from("user_bob")), 0, 9);
        let anon = CacheKey::page("posts/all", ViewerScope::Anonymous, 0, 9);
        assert_ne!(a.encode(), b.encode());
        assert_ne!(a.encode(), anon.encode());
    }

    #[test]
    fn test_page_size_is_part_of_key() {
        let a = CacheKey::page("posts/all", alice(), 0, 9);
        let b = CacheKey::page("posts/all", alice(), 0, 10);
        assert_ne!(a.encode(), b.encode());
    }

    #[test]
    fn test_separator_in_viewer_cannot_collide() {
        // A viewer id containing the separator must not forge another key.
        let sneaky = CacheKey::new(
            "posts/all",
            ViewerScope::viewer(ViewerId::from("x|p0:9")),
            None,
        );
        let honest = CacheKey::page("posts/all", ViewerScope::viewer(ViewerId::from("x")), 0, 9);
        assert_ne!(sneaky.encode(), honest.encode());
        assert_eq!(CacheKey::decode(&sneaky.encode()), Some(sneaky));
    }

    #[test]
    fn test_with_page_index() {
        let key = CacheKey::page("posts/all", alice(), 0, 9);
        let next = key.with_page_index(1);
        assert_eq!(next.page_params(), Some(PageParams::new(1, 9)));
        assert_eq!(next.scope(), key.scope());
    }

    #[test]
    fn test_prefixes() {
        let key = CacheKey::page("comments_post_42", alice(), 3, 10);
        let encoded = key.encode();
        assert!(encoded.starts_with(&CacheKey::resource_prefix("comments_post_42")));
        assert!(encoded.starts_with(&CacheKey::scope_prefix("comments_post_42", &alice())));

        // The resource prefix ends at the separator, so post 4 does not match post 42.
        assert!(!encoded.starts_with(&CacheKey::resource_prefix("comments_post_4")));
    }

    #[test]
    fn test_pages_prefix_is_exact_per_viewer() {
        let al = ViewerScope::viewer(ViewerId::from("user_al"));
        let alice_page = CacheKey::page("posts/all", alice(), 0, 9).encode();
        let al_page = CacheKey::page("posts/all", al.clone(), 0, 9).encode();

        let prefix = CacheKey::pages_prefix("posts/all", &al);
        assert!(al_page.starts_with(&prefix));
        assert!(!alice_page.starts_with(&prefix));
        assert!(alice_page.starts_with(&CacheKey::scope_prefix("posts/all", &al)));
    }

    #[test]
    fn test_decode_rejects_foreign_strings() {
        assert!(CacheKey::decode("").is_none());
        assert!(CacheKey::decode("posts").is_none());
        assert!(CacheKey::decode("posts|who").is_none());
        assert!(CacheKey::decode("posts|anon|q1:2").is_none());
        assert!(CacheKey::decode("posts|anon|p01:9").is_none());
        assert!(CacheKey::decode("posts|anon|p1:9|extra").is_none());
        assert!(CacheKey::decode("po%zzsts|anon").is_none());
    }
}
