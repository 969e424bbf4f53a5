//! Blog post model
//!
//! Posts carry an optional free-text category and a list of tags. Tags are
//! persisted as a JSON array (NULL when there are none) and surface here as a
//! plain `Vec<String>`.

use chrono::{DateTime, Datelike, Utc};
use serde::{Deserialize, Serialize};

use crate::services::markdown::plain_excerpt;

/// Blog post entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    /// Markdown source
    pub content: String,
    /// Author display name at the time of writing (kept in sync on rename)
    pub author: Option<String>,
    /// Owning user; `None` for posts whose author no longer has an account link
    pub user_id: Option<i64>,
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Post {
    /// Ownership is plain equality between the post's user and the caller.
    pub fn is_owned_by(&self, user_id: i64) -> bool {
        self.user_id == Some(user_id)
    }

    /// Plain-text preview of the content, `max` characters plus "..." if cut
    pub fn excerpt(&self, max: usize) -> String {
        plain_excerpt(&self.content, max)
    }

    /// Archive bucket key, e.g. "2025-01"
    pub fn archive_key(&self) -> String {
        format!("{:04}-{:02}", self.created_at.year(), self.created_at.month())
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}

/// Input for creating a post
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreatePostInput {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl CreatePostInput {
    pub fn new(title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            content: content.into(),
            category: None,
            tags: Vec::new(),
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Trim text fields, turn a blank category into `None` and clean the tag list
    pub fn normalized(self) -> Self {
        Self {
            title: self.title.trim().to_string(),
            content: self.content.trim().to_string(),
            category: normalize_category(self.category),
            tags: normalize_tags(self.tags),
        }
    }
}

/// Input for updating a post. Every field is replaced, as with the editor form.
pub type UpdatePostInput = CreatePostInput;

/// Trim, drop empties and de-duplicate while keeping first-seen order.
pub fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(tags.len());
    for tag in tags {
        let tag = tag.trim().trim_start_matches('#').trim();
        if !tag.is_empty() && !out.iter().any(|t| t == tag) {
            out.push(tag.to_string());
        }
    }
    out
}

fn normalize_category(category: Option<String>) -> Option<String> {
    category
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

/// Home page filter selection.
///
/// Within each group any selected value matches (OR); groups combine with AND.
/// An empty group does not filter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostQuery {
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    /// Archive keys in "YYYY-MM" form
    #[serde(default)]
    pub archives: Vec<String>,
}

impl PostQuery {
    pub fn is_empty(&self) -> bool {
        self.categories.is_empty() && self.tags.is_empty() && self.archives.is_empty()
    }

    /// Parse a raw query string.
    ///
    /// `category`, `tag` and `archive` may repeat and may hold comma-separated
    /// values: `?tag=CSS&tag=React` and `?tag=CSS,React` are equivalent.
    pub fn from_query_string(query: &str) -> Self {
        let mut parsed = Self::default();
        for pair in query.split('&') {
            let (key, value) = match pair.split_once('=') {
                Some(kv) => kv,
                None => continue,
            };
            let value = value.replace('+', " ");
            let value = match urlencoding::decode(&value) {
                Ok(v) => v.into_owned(),
                Err(_) => continue,
            };
            let target = match key {
                "category" => &mut parsed.categories,
                "tag" => &mut parsed.tags,
                "archive" => &mut parsed.archives,
                _ => continue,
            };
            for item in value.split(',') {
                let item = item.trim();
                if !item.is_empty() && !target.iter().any(|t| t == item) {
                    target.push(item.to_string());
                }
            }
        }
        parsed
    }

    /// Inverse of `from_query_string`, used to build filter links
    pub fn to_query_string(&self) -> String {
        let mut parts = Vec::new();
        for (key, values) in [
            ("category", &self.categories),
            ("tag", &self.tags),
            ("archive", &self.archives),
        ] {
            for value in values {
                parts.push(format!("{}={}", key, urlencoding::encode(value)));
            }
        }
        parts.join("&")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_post() -> Post {
        Post {
            id: 1,
            title: "Hello".to_string(),
            content: "# Hello\n\nSome **bold** words.".to_string(),
            author: Some("Ada".to_string()),
            user_id: Some(7),
            category: Some("Design".to_string()),
            tags: vec!["CSS".to_string()],
            created_at: Utc.with_ymd_and_hms(2025, 3, 9, 12, 0, 0).unwrap(),
            updated_at: None,
        }
    }

    #[test]
    fn test_ownership() {
        let mut post = sample_post();
        assert!(post.is_owned_by(7));
        assert!(!post.is_owned_by(8));
        post.user_id = None;
        assert!(!post.is_owned_by(7));
    }

    #[test]
    fn test_archive_key() {
        assert_eq!(sample_post().archive_key(), "2025-03");
    }

    #[test]
    fn test_excerpt_strips_markdown() {
        assert_eq!(sample_post().excerpt(200), "Hello\nSome bold words.");
    }

    #[test]
    fn test_normalized_input() {
        let input = CreatePostInput::new("  Title ", " body ")
            .with_category("   ")
            .with_tags(vec![" CSS", "#React", "", "CSS"])
            .normalized();

        assert_eq!(input.title, "Title");
        assert_eq!(input.content, "body");
        assert_eq!(input.category, None);
        assert_eq!(input.tags, vec!["CSS", "React"]);
    }

    #[test]
    fn test_query_string_parsing() {
        let query = PostQuery::from_query_string(
            "category=Web+Development&tag=CSS,React&tag=UI%2FUX&archive=2025-01&page=2",
        );
        assert_eq!(query.categories, vec!["Web Development"]);
        assert_eq!(query.tags, vec!["CSS", "React", "UI/UX"]);
        assert_eq!(query.archives, vec!["2025-01"]);
        assert!(!query.is_empty());

        assert!(PostQuery::from_query_string("").is_empty());
        assert!(PostQuery::from_query_string("garbage&=&tag=").is_empty());
    }

    #[test]
    fn test_query_string_roundtrip() {
        let query = PostQuery {
            categories: vec!["Web Development".to_string()],
            tags: vec!["Node.js".to_string(), "UI/UX".to_string()],
            archives: vec![],
        };
        assert_eq!(PostQuery::from_query_string(&query.to_query_string()), query);
    }
}
