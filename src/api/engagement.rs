//! Like and bookmark API endpoints
//!
//! - POST /api/v1/posts/{id}/like - Toggle a like, returns `{liked}`
//! - POST /api/v1/posts/{id}/bookmark - Toggle a bookmark, returns `{bookmarked}`
//! - POST /api/v1/engagement - Counts and flags for a batch of posts (at most
//!   `MAX_ENGAGEMENT_IDS` ids)
//! - GET /api/v1/saved - Bookmarked posts of the current user

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::api::middleware::{ApiError, AppState, AuthenticatedUser, MaybeUser};
use crate::api::posts::{summarize, PostSummary};
use crate::models::PostEngagement;

/// Toggles answer with their own sign-in message, so they sit behind
/// `optional_auth` rather than `require_auth`.
/// Largest `post_ids` list `POST /engagement` accepts
pub const MAX_ENGAGEMENT_IDS: usize = 1000;

pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/posts/{id}/like", post(toggle_like))
        .route("/posts/{id}/bookmark", post(toggle_bookmark))
        .route("/engagement", post(engagement))
}

pub fn protected_router() -> Router<AppState> {
    Router::new().route("/saved", get(saved_posts))
}

#[derive(Debug, Deserialize)]
pub struct EngagementRequest {
    #[serde(default, alias = "postIds")]
    pub post_ids: Vec<i64>,
}

#[derive(Debug, Serialize)]
pub struct EngagementResponse {
    pub engagement: HashMap<i64, PostEngagement>,
}

#[derive(Debug, Serialize)]
pub struct SavedPostsResponse {
    pub posts: Vec<PostSummary>,
}

async fn toggle_like(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = user.ok_or_else(|| ApiError::unauthorized("You must be signed in to like posts"))?;
    let liked = state.engagement_service.toggle_like(id, user.id).await?;
    Ok(Json(serde_json::json!({ "liked": liked })))
}

async fn toggle_bookmark(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user =
        user.ok_or_else(|| ApiError::unauthorized("You must be signed in to bookmark posts"))?;
    let bookmarked = state.engagement_service.toggle_bookmark(id, user.id).await?;
    Ok(Json(serde_json::json!({ "bookmarked": bookmarked })))
}

async fn engagement(
    State(state): State<AppState>,
    MaybeUser(user): MaybeUser,
    Json(body): Json<EngagementRequest>,
) -> Result<Json<EngagementResponse>, ApiError> {
    if body.post_ids.len() > MAX_ENGAGEMENT_IDS {
        return Err(ApiError::validation_error(format!(
            "At most {} post ids per request",
            MAX_ENGAGEMENT_IDS
        )));
    }
    let engagement = state
        .engagement_service
        .engagement_for(&body.post_ids, user.map(|u| u.id))
        .await?;
    Ok(Json(EngagementResponse { engagement }))
}

async fn saved_posts(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<SavedPostsResponse>, ApiError> {
    let posts = state.engagement_service.saved_posts(user.0.id).await?;
    let posts = summarize(&state, posts, Some(user.0.id)).await?;
    Ok(Json(SavedPostsResponse { posts }))
}
