//! Likes and bookmarks

use serde::{Deserialize, Serialize};

/// The two kinds of per-user engagement a post can receive.
///
/// Both are stored in tables with the same shape, so repositories take the
/// kind and pick the table from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngagementKind {
    Like,
    Bookmark,
}

impl EngagementKind {
    /// Backing table name
    pub fn table(&self) -> &'static str {
        match self {
            Self::Like => "likes",
            Self::Bookmark => "bookmarks",
        }
    }
}

impl std::fmt::Display for EngagementKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Like => write!(f, "like"),
            Self::Bookmark => write!(f, "bookmark"),
        }
    }
}

impl std::str::FromStr for EngagementKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "like" | "likes" => Ok(Self::Like),
            "bookmark" | "bookmarks" => Ok(Self::Bookmark),
            _ => Err(format!("Invalid engagement kind: {}", s)),
        }
    }
}

/// Engagement summary for one post, optionally from one viewer's point of view.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostEngagement {
    pub like_count: i64,
    pub bookmark_count: i64,
    pub is_liked: bool,
    pub is_bookmarked: bool,
}
