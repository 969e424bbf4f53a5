//! Post service
//!
//! Create, edit and delete posts on behalf of a signed-in user, plus cached
//! reads for the pages. Ownership is plain equality between the post's
//! `user_id` and the acting user's id.

use crate::cache::{Cache, CacheLayer};
use crate::db::repositories::PostRepository;
use crate::models::normalize_tags;
use crate::models::{CreatePostInput, Post, UpdatePostInput, User};
use crate::services::markdown::{MarkdownRenderer, TocEntry};
use anyhow::Context;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

/// Cache TTL for a single post (1 hour)
const POST_CACHE_TTL_SECS: u64 = 3600;

/// Cache TTL for post lists (10 minutes)
const POST_LIST_CACHE_TTL_SECS: u64 = 600;

const CACHE_KEY_POST_BY_ID: &str = "post:id:";
const CACHE_KEY_POST_LIST: &str = "post:list";
const CACHE_KEY_POSTS_BY_USER: &str = "post:user:";

/// Error types for post service operations
#[derive(Debug, thiserror::Error)]
pub enum PostServiceError {
    /// Post not found
    #[error("Post not found")]
    NotFound,

    /// Acting user does not own the post
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Rendered form of a post body
#[derive(Debug, Clone, serde::Serialize)]
pub struct RenderedContent {
    pub html: String,
    pub toc: Vec<TocEntry>,
}

/// Post service
pub struct PostService {
    repo: Arc<dyn PostRepository>,
    cache: Arc<Cache>,
    markdown_renderer: MarkdownRenderer,
    cache_ttl: Duration,
    list_cache_ttl: Duration,
}

impl PostService {
    pub fn new(
        repo: Arc<dyn PostRepository>,
        cache: Arc<Cache>,
        markdown_renderer: MarkdownRenderer,
    ) -> Self {
        Self::with_cache_ttl(
            repo,
            cache,
            markdown_renderer,
            Duration::from_secs(POST_CACHE_TTL_SECS),
        )
    }

    /// Create a post service with a custom cache TTL.
    ///
    /// Single posts keep `cache_ttl`; lists keep it too but never longer than
    /// 10 minutes.
    pub fn with_cache_ttl(
        repo: Arc<dyn PostRepository>,
        cache: Arc<Cache>,
        markdown_renderer: MarkdownRenderer,
        cache_ttl: Duration,
    ) -> Self {
        Self {
            repo,
            cache,
            markdown_renderer,
            cache_ttl,
            list_cache_ttl: cache_ttl.min(Duration::from_secs(POST_LIST_CACHE_TTL_SECS)),
        }
    }

    /// Single-post and list cache TTLs
    #[cfg(test)]
    pub(crate) fn cache_ttls(&self) -> (Duration, Duration) {
        (self.cache_ttl, self.list_cache_ttl)
    }

    /// All posts, newest first
    pub async fn list(&self) -> Result<Vec<Post>, PostServiceError> {
        if let Some(posts) = self
            .cache
            .get::<Vec<Post>>(CACHE_KEY_POST_LIST)
            .await
            .ok()
            .flatten()
        {
            return Ok(posts);
        }

        let posts = self.repo.list().await.context("Failed to list posts")?;
        let _ = self
            .cache
            .set(
                CACHE_KEY_POST_LIST,
                &posts,
                self.list_cache_ttl,
            )
            .await;
        Ok(posts)
    }

    /// Posts owned by a user, newest first
    pub async fn list_by_user(&self, user_id: i64) -> Result<Vec<Post>, PostServiceError> {
        let cache_key = format!("{}{}", CACHE_KEY_POSTS_BY_USER, user_id);
        if let Some(posts) = self.cache.get::<Vec<Post>>(&cache_key).await.ok().flatten() {
            return Ok(posts);
        }

        let posts = self
            .repo
            .list_by_user(user_id)
            .await
            .context("Failed to list user posts")?;
        let _ = self
            .cache
            .set(&cache_key, &posts, self.list_cache_ttl)
            .await;
        Ok(posts)
    }

    /// Get post by ID
    pub async fn get(&self, id: i64) -> Result<Option<Post>, PostServiceError> {
        let cache_key = format!("{}{}", CACHE_KEY_POST_BY_ID, id);
        if let Some(post) = self.cache.get::<Post>(&cache_key).await.ok().flatten() {
            return Ok(Some(post));
        }

        let post = self.repo.get_by_id(id).await.context("Failed to get post")?;
        if let Some(ref p) = post {
            let _ = self.cache.set(&cache_key, p, self.cache_ttl).await;
        }
        Ok(post)
    }

    /// Get post by ID, or `NotFound`
    pub async fn get_required(&self, id: i64) -> Result<Post, PostServiceError> {
        self.get(id).await?.ok_or(PostServiceError::NotFound)
    }

    /// Publish a new post as `author`.
    pub async fn create(
        &self,
        author: &User,
        input: CreatePostInput,
    ) -> Result<Post, PostServiceError> {
        let input = validate(input)?;

        let post = Post {
            id: 0,
            title: input.title,
            content: input.content,
            author: Some(author.author_name()),
            user_id: Some(author.id),
            category: input.category,
            tags: input.tags,
            created_at: Utc::now(),
            updated_at: None,
        };

        let created = self.repo.create(&post).await.context("Failed to create post")?;
        self.invalidate_cache().await;

        tracing::info!("User {} created post {} \"{}\"", author.id, created.id, created.title);
        Ok(created)
    }

    /// Replace title, content, category and tags of an owned post.
    pub async fn update(
        &self,
        editor: &User,
        id: i64,
        input: UpdatePostInput,
    ) -> Result<Post, PostServiceError> {
        let input = validate(input)?;

        let existing = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get post")?
            .ok_or(PostServiceError::NotFound)?;

        if !existing.is_owned_by(editor.id) {
            return Err(PostServiceError::Forbidden(
                "You don't have permission to edit this post".to_string(),
            ));
        }

        let changed = Post {
            title: input.title,
            content: input.content,
            category: input.category,
            tags: input.tags,
            ..existing
        };
        let updated = self.repo.update(&changed).await.context("Failed to update post")?;
        self.invalidate_cache().await;

        Ok(updated)
    }

    /// Delete an owned post. Its likes and bookmarks go with it.
    pub async fn delete(&self, actor: &User, id: i64) -> Result<(), PostServiceError> {
        let existing = self
            .repo
            .get_by_id(id)
            .await
            .context("Failed to get post")?
            .ok_or(PostServiceError::NotFound)?;

        if !existing.is_owned_by(actor.id) {
            return Err(PostServiceError::Forbidden(
                "You don't have permission to delete this post".to_string(),
            ));
        }

        self.repo.delete(id).await.context("Failed to delete post")?;
        self.invalidate_cache().await;

        tracing::info!("User {} deleted post {}", actor.id, id);
        Ok(())
    }

    /// Render a post body to HTML with its table of contents
    pub fn render(&self, content: &str) -> RenderedContent {
        RenderedContent {
            html: self.markdown_renderer.render(content),
            toc: self.markdown_renderer.extract_toc(content),
        }
    }

    /// Drop every cached post and post list.
    ///
    /// Also needed after account changes that touch posts (rename, deletion).
    pub async fn invalidate_cache(&self) {
        if let Err(e) = self.cache.delete_pattern("post:*").await {
            tracing::warn!("Failed to invalidate post cache: {:#}", e);
        }
    }
}

fn validate(input: CreatePostInput) -> Result<CreatePostInput, PostServiceError> {
    let input = input.normalized();
    if input.title.is_empty() || input.content.is_empty() {
        return Err(PostServiceError::ValidationError(
            "Title and content are required".to_string(),
        ));
    }
    Ok(input)
}

/// Parse a tags form field.
///
/// Accepts a JSON array (`["CSS","React"]`) as sent by the editor, or a plain
/// comma-separated list. The result is trimmed and de-duplicated.
pub fn parse_tags_field(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Vec::new();
    }
    if raw.starts_with('[') {
        if let Ok(tags) = serde_json::from_str::<Vec<String>>(raw) {
            return normalize_tags(tags);
        }
    }
    normalize_tags(raw.split(',').map(|s| s.to_string()).collect())
}
