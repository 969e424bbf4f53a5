//! Likes and bookmarks
//!
//! Both are per-user toggles on a post. A user holds at most one like and one
//! bookmark per post; the storage layer enforces it with a unique key.

use crate::db::repositories::{EngagementRepository, PostRepository};
use crate::models::{EngagementKind, Post, PostEngagement};
use anyhow::Context;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum EngagementServiceError {
    #[error("Post not found")]
    NotFound,

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

pub struct EngagementService {
    repo: Arc<dyn EngagementRepository>,
    post_repo: Arc<dyn PostRepository>,
}

impl EngagementService {
    pub fn new(repo: Arc<dyn EngagementRepository>, post_repo: Arc<dyn PostRepository>) -> Self {
        Self { repo, post_repo }
    }

    /// Flip a like or bookmark. Returns the new state (`true` = now set).
    pub async fn toggle(
        &self,
        kind: EngagementKind,
        post_id: i64,
        user_id: i64,
    ) -> Result<bool, EngagementServiceError> {
        if !self
            .post_repo
            .exists(post_id)
            .await
            .context("Failed to check post")?
        {
            return Err(EngagementServiceError::NotFound);
        }

        let removed = self
            .repo
            .remove(kind, post_id, user_id)
            .await
            .with_context(|| format!("Failed to remove {}", kind))?;
        if removed {
            tracing::debug!("User {} removed {} on post {}", user_id, kind, post_id);
            return Ok(false);
        }

        self.repo
            .add(kind, post_id, user_id)
            .await
            .with_context(|| format!("Failed to add {}", kind))?;
        tracing::debug!("User {} added {} on post {}", user_id, kind, post_id);
        Ok(true)
    }

    pub async fn toggle_like(&self, post_id: i64, user_id: i64) -> Result<bool, EngagementServiceError> {
        self.toggle(EngagementKind::Like, post_id, user_id).await
    }

    pub async fn toggle_bookmark(
        &self,
        post_id: i64,
        user_id: i64,
    ) -> Result<bool, EngagementServiceError> {
        self.toggle(EngagementKind::Bookmark, post_id, user_id).await
    }

    /// Counts and viewer flags for a batch of posts.
    ///
    /// Every requested id gets an entry; repeated ids are looked up once.
    /// Without a viewer the flags are false.
    pub async fn engagement_for(
        &self,
        post_ids: &[i64],
        viewer: Option<i64>,
    ) -> Result<HashMap<i64, PostEngagement>, EngagementServiceError> {
        let mut result: HashMap<i64, PostEngagement> = post_ids
            .iter()
            .map(|id| (*id, PostEngagement::default()))
            .collect();
        if result.is_empty() {
            return Ok(result);
        }
        let post_ids: Vec<i64> = result.keys().copied().collect();
        let post_ids = post_ids.as_slice();

        let likes = self
            .repo
            .counts(EngagementKind::Like, post_ids)
            .await
            .context("Failed to count likes")?;
        let bookmarks = self
            .repo
            .counts(EngagementKind::Bookmark, post_ids)
            .await
            .context("Failed to count bookmarks")?;

        for (id, entry) in result.iter_mut() {
            entry.like_count = likes.get(id).copied().unwrap_or(0);
            entry.bookmark_count = bookmarks.get(id).copied().unwrap_or(0);
        }

        if let Some(user_id) = viewer {
            let liked = self
                .repo
                .marked_by_user(EngagementKind::Like, user_id, post_ids)
                .await
                .context("Failed to load likes")?;
            let saved = self
                .repo
                .marked_by_user(EngagementKind::Bookmark, user_id, post_ids)
                .await
                .context("Failed to load bookmarks")?;
            for (id, entry) in result.iter_mut() {
                entry.is_liked = liked.contains(id);
                entry.is_bookmarked = saved.contains(id);
            }
        }

        Ok(result)
    }

    /// Engagement of a single post
    pub async fn post_engagement(
        &self,
        post_id: i64,
        viewer: Option<i64>,
    ) -> Result<PostEngagement, EngagementServiceError> {
        let mut all = self.engagement_for(&[post_id], viewer).await?;
        Ok(all.remove(&post_id).unwrap_or_default())
    }

    /// The user's bookmarked posts, most recently saved first
    pub async fn saved_posts(&self, user_id: i64) -> Result<Vec<Post>, EngagementServiceError> {
        let posts = self
            .post_repo
            .list_bookmarked_by_user(user_id)
            .await
            .context("Failed to list saved posts")?;
        Ok(posts)
    }
}
