//! Post API endpoints
//!
//! Public:
//! - GET /api/v1/posts - List posts, filtered by `category`, `tag`, `archive`
//! - GET /api/v1/posts/{id} - One post with rendered HTML and TOC
//! - GET /api/v1/navigation - Quick navigation data
//!
//! Signed in:
//! - POST /api/v1/posts, PUT/DELETE /api/v1/posts/{id}
//! - GET /api/v1/users/me/posts

use axum::{
    extract::{Path, RawQuery, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, MaybeUser};
use crate::models::{CreatePostInput, Post, PostEngagement, PostQuery};
use crate::services::navigation::{filter_posts, QuickNav};
use crate::services::post::parse_tags_field;
use crate::services::TocEntry;

/// Characters of plain text shown in list excerpts
const LIST_EXCERPT_CHARS: usize = 150;

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/posts", get(list_posts))
        .route("/posts/{id}", get(get_post))
        .route("/navigation", get(navigation))
}

pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/posts", post(create_post))
        .route("/posts/{id}", put(update_post).delete(delete_post))
        .route("/users/me/posts", get(my_posts))
}

/// Tags as either a JSON array or a single string (comma list or JSON text)
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum TagsField {
    List(Vec<String>),
    Text(String),
}

impl TagsField {
    fn into_tags(self) -> Vec<String> {
        match self {
            TagsField::List(tags) => tags,
            TagsField::Text(raw) => parse_tags_field(&raw),
        }
    }
}

/// Request body for creating or updating a post
#[derive(Debug, Deserialize)]
pub struct PostRequest {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub tags: Option<TagsField>,
}

impl From<PostRequest> for CreatePostInput {
    fn from(body: PostRequest) -> Self {
        CreatePostInput {
            title: body.title,
            content: body.content,
            category: body.category,
            tags: body.tags.map(TagsField::into_tags).unwrap_or_default(),
        }
    }
}

/// A post in list responses
#[derive(Debug, Serialize)]
pub struct PostSummary {
    #[serde(flatten)]
    pub post: Post,
    pub excerpt: String,
    pub engagement: PostEngagement,
}

#[derive(Debug, Serialize)]
pub struct PostListResponse {
    pub posts: Vec<PostSummary>,
    /// Posts matching the filters
    pub count: usize,
    /// Posts overall
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct PostDetailResponse {
    pub post: Post,
    pub content_html: String,
    pub toc: Vec<TocEntry>,
    pub engagement: PostEngagement,
}

/// Attach excerpts and engagement to a post list
pub(crate) async fn summarize(
    state: &AppState,
    posts: Vec<Post>,
    viewer: Option<i64>,
) -> Result<Vec<PostSummary>, ApiError> {
    let ids: Vec<i64> = posts.iter().map(|p| p.id).collect();
    let engagement = state.engagement_service.engagement_for(&ids, viewer).await?;

    Ok(posts
        .into_iter()
        .map(|post| PostSummary {
            excerpt: post.excerpt(LIST_EXCERPT_CHARS),
            engagement: engagement.get(&post.id).copied().unwrap_or_default(),
            post,
        })
        .collect())
}

/// GET /api/v1/posts
async fn list_posts(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    RawQuery(query): RawQuery,
) -> Result<Json<PostListResponse>, ApiError> {
    let filters = PostQuery::from_query_string(query.as_deref().unwrap_or(""));
    let all = state.post_service.list().await?;
    let total = all.len();
    let filtered = filter_posts(&all, &filters);

    let posts = summarize(&state, filtered, user.map(|u| u.id)).await?;
    Ok(Json(PostListResponse {
        count: posts.len(),
        total,
        posts,
    }))
}

/// GET /api/v1/posts/{id}
async fn get_post(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(id): Path<i64>,
) -> Result<Json<PostDetailResponse>, ApiError> {
    let post = state.post_service.get_required(id).await?;
    let rendered = state.post_service.render(&post.content);
    let engagement = state
        .engagement_service
        .post_engagement(post.id, user.map(|u| u.id))
        .await?;

    Ok(Json(PostDetailResponse {
        post,
        content_html: rendered.html,
        toc: rendered.toc,
        engagement,
    }))
}

/// POST /api/v1/posts
async fn create_post(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<PostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let post = state.post_service.create(&user.0, body.into()).await?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "post": post }))))
}

/// PUT /api/v1/posts/{id}
async fn update_post(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
    Json(body): Json<PostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let post = state.post_service.update(&user.0, id, body.into()).await?;
    Ok(Json(serde_json::json!({ "post": post })))
}

/// DELETE /api/v1/posts/{id}
async fn delete_post(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, ApiError> {
    state.post_service.delete(&user.0, id).await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// GET /api/v1/users/me/posts
async fn my_posts(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<PostListResponse>, ApiError> {
    let posts = state.post_service.list_by_user(user.0.id).await?;
    let total = posts.len();
    let posts = summarize(&state, posts, Some(user.0.id)).await?;
    Ok(Json(PostListResponse {
        count: total,
        total,
        posts,
    }))
}

/// GET /api/v1/navigation
async fn navigation(State(state): State<AppState>) -> Result<Json<QuickNav>, ApiError> {
    let posts = state.post_service.list().await?;
    Ok(Json(QuickNav::build(
        &posts,
        state.site.recent_posts,
        state.site.archive_limit,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tags_field_forms() {
        let body: PostRequest =
            serde_json::from_str(r#"{"title":"t","content":"c","tags":["CSS","React"]}"#).unwrap();
        assert_eq!(CreatePostInput::from(body).tags, vec!["CSS", "React"]);

        let body: PostRequest =
            serde_json::from_str(r#"{"title":"t","content":"c","tags":"CSS, React"}"#).unwrap();
        assert_eq!(CreatePostInput::from(body).tags, vec!["CSS", "React"]);

        let body: PostRequest =
            serde_json::from_str(r#"{"title":"t","content":"c","tags":"[\"Rust\"]"}"#).unwrap();
        assert_eq!(CreatePostInput::from(body).tags, vec!["Rust"]);

        let body: PostRequest = serde_json::from_str(r#"{"title":"t","content":"c"}"#).unwrap();
        assert!(CreatePostInput::from(body).tags.is_empty());
    }
}
