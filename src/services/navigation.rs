//! Quick navigation
//!
//! Sidebar aggregates (categories, tags, monthly archives, recent posts) and
//! the home page filter. Everything here is a pure function over the
//! newest-first post list.

use crate::models::{Post, PostQuery};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;

/// A category or tag with the number of posts using it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CountEntry {
    pub name: String,
    pub count: usize,
}

/// One month of posts
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveEntry {
    /// "2025-01", used in `?archive=` links
    pub key: String,
    /// "January 2025"
    pub label: String,
    pub count: usize,
}

/// Everything the quick-navigation sidebar shows
#[derive(Debug, Clone, Serialize)]
pub struct QuickNav {
    pub categories: Vec<CountEntry>,
    pub tags: Vec<CountEntry>,
    pub archives: Vec<ArchiveEntry>,
    pub recent_posts: Vec<Post>,
}

impl QuickNav {
    pub fn build(posts: &[Post], recent: usize, archive_limit: usize) -> Self {
        Self {
            categories: category_counts(posts),
            tags: tag_counts(posts),
            archives: archives(posts, archive_limit),
            recent_posts: recent_posts(posts, recent),
        }
    }
}

fn sorted_counts(counts: HashMap<&str, usize>) -> Vec<CountEntry> {
    let mut entries: Vec<CountEntry> = counts
        .into_iter()
        .map(|(name, count)| CountEntry {
            name: name.to_string(),
            count,
        })
        .collect();
    entries.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.name.cmp(&b.name)));
    entries
}

/// Posts per category, most used first. Uncategorized posts are not counted.
pub fn category_counts(posts: &[Post]) -> Vec<CountEntry> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for category in posts.iter().filter_map(|p| p.category.as_deref()) {
        *counts.entry(category).or_default() += 1;
    }
    sorted_counts(counts)
}

/// Posts per tag, most used first
pub fn tag_counts(posts: &[Post]) -> Vec<CountEntry> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for tag in posts.iter().flat_map(|p| p.tags.iter()) {
        *counts.entry(tag.as_str()).or_default() += 1;
    }
    sorted_counts(counts)
}

/// "January 2025"
pub fn month_label(date: &DateTime<Utc>) -> String {
    date.format("%B %Y").to_string()
}

/// Monthly buckets, newest first, at most `limit`
pub fn archives(posts: &[Post], limit: usize) -> Vec<ArchiveEntry> {
    let mut buckets: HashMap<String, ArchiveEntry> = HashMap::new();
    for post in posts {
        buckets
            .entry(post.archive_key())
            .or_insert_with(|| ArchiveEntry {
                key: post.archive_key(),
                label: month_label(&post.created_at),
                count: 0,
            })
            .count += 1;
    }

    let mut entries: Vec<ArchiveEntry> = buckets.into_values().collect();
    entries.sort_by(|a, b| b.key.cmp(&a.key));
    entries.truncate(limit);
    entries
}

/// The first `n` posts of a newest-first list
pub fn recent_posts(posts: &[Post], n: usize) -> Vec<Post> {
    posts.iter().take(n).cloned().collect()
}

fn matches_archive(post: &Post, selected: &[String]) -> bool {
    let key = post.archive_key();
    let label = month_label(&post.created_at);
    selected.iter().any(|s| *s == key || *s == label)
}

/// Whether a post passes the filter: any selected value within a group, every
/// non-empty group.
pub fn matches(post: &Post, query: &PostQuery) -> bool {
    let category_ok = query.categories.is_empty()
        || post
            .category
            .as_ref()
            .is_some_and(|c| query.categories.contains(c));
    let tag_ok = query.tags.is_empty() || query.tags.iter().any(|t| post.has_tag(t));
    let archive_ok = query.archives.is_empty() || matches_archive(post, &query.archives);

    category_ok && tag_ok && archive_ok
}

/// Filter a post list, keeping its order
pub fn filter_posts(posts: &[Post], query: &PostQuery) -> Vec<Post> {
    if query.is_empty() {
        return posts.to_vec();
    }
    posts.iter().filter(|p| matches(p, query)).cloned().collect()
}

/// Tag as shown on cards: leading '#', quotes and brackets removed
pub fn display_tag(tag: &str) -> String {
    tag.trim_start_matches('#')
        .trim_start_matches(['"', '['])
        .trim_end_matches(['"', ']'])
        .trim()
        .to_string()
}
