//! API middleware
//!
//! Contains:
//! - Shared application state
//! - Session token resolution (Bearer header or `session` cookie)
//! - `require_auth` / `optional_auth` middleware and their extractors
//! - The JSON error type every API handler returns

use axum::{
    extract::{ConnectInfo, FromRequestParts, Request, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::config::SiteConfig;
use crate::models::User;
use crate::services::{
    EngagementService, EngagementServiceError, LoginRateLimiter, PostService, PostServiceError,
    UserService, UserServiceError,
};
use crate::theme::ThemeEngine;

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<UserService>,
    pub post_service: Arc<PostService>,
    pub engagement_service: Arc<EngagementService>,
    pub theme_engine: Arc<ThemeEngine>,
    pub rate_limiter: Arc<LoginRateLimiter>,
    pub site: Arc<SiteConfig>,
}

/// Signed-in user, set by `require_auth` / `optional_auth`
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

/// Signed-in user if there is one
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<User>);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeUser(
            parts
                .extensions
                .get::<AuthenticatedUser>()
                .map(|u| u.0.clone()),
        ))
    }
}

/// Best-effort client address: proxy headers first, then the socket peer
#[derive(Debug, Clone, Copy)]
pub struct ClientIp(pub Option<IpAddr>);

impl<S> FromRequestParts<S> for ClientIp
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let from_headers = forwarded_ip(&parts.headers);
        let from_socket = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip());
        Ok(ClientIp(from_headers.or(from_socket)))
    }
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    if let Some(forwarded) = headers.get("x-forwarded-for").and_then(|h| h.to_str().ok()) {
        if let Some(ip) = forwarded.split(',').next().and_then(|s| s.trim().parse().ok()) {
            return Some(ip);
        }
    }
    headers
        .get("x-real-ip")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.trim().parse().ok())
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn rate_limited(message: impl Into<String>, retry_after_secs: u64) -> Self {
        Self::with_details(
            "RATE_LIMIT",
            message,
            serde_json::json!({ "retry_after": retry_after_secs }),
        )
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new("INTERNAL_ERROR", message)
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "CONFLICT" => StatusCode::CONFLICT,
            "RATE_LIMIT" => StatusCode::TOO_MANY_REQUESTS,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message suitable for showing inline on a page
    pub fn message(&self) -> &str {
        &self.error.message
    }

    fn internal(e: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:#}", e);
        Self::internal_error("Internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<UserServiceError> for ApiError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::AuthenticationError(msg) => ApiError::unauthorized(msg),
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::UserExists(msg) => ApiError::conflict(msg),
            UserServiceError::NotFound => ApiError::not_found("User not found"),
            UserServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<PostServiceError> for ApiError {
    fn from(e: PostServiceError) -> Self {
        match e {
            PostServiceError::NotFound => ApiError::not_found("Post not found"),
            PostServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            PostServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            PostServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

impl From<EngagementServiceError> for ApiError {
    fn from(e: EngagementServiceError) -> Self {
        match e {
            EngagementServiceError::NotFound => ApiError::not_found("Post not found"),
            EngagementServiceError::InternalError(e) => ApiError::internal(e),
        }
    }
}

/// Session token from `Authorization: Bearer` or the `session` cookie
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_str) = headers.get(header::AUTHORIZATION).and_then(|h| h.to_str().ok()) {
        if let Some(token) = auth_str.strip_prefix("Bearer ") {
            return Some(token.to_string());
        }
    }

    if let Some(cookie_str) = headers.get(header::COOKIE).and_then(|h| h.to_str().ok()) {
        for cookie in cookie_str.split(';') {
            if let Some(token) = cookie.trim().strip_prefix("session=") {
                if !token.is_empty() {
                    return Some(token.to_string());
                }
            }
        }
    }

    None
}

/// `Set-Cookie` value for a new session
pub fn session_cookie(token: &str, days: i64) -> String {
    format!(
        "session={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        token,
        days * 24 * 60 * 60
    )
}

/// `Set-Cookie` value that removes the session cookie
pub const CLEAR_SESSION_COOKIE: &str = "session=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0";

/// Authentication middleware
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = session_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let user = state
        .user_service
        .validate_session(&token)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Invalid or expired session"))?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Optional authentication middleware
pub async fn optional_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    if let Some(token) = session_token(request.headers()) {
        match state.user_service.validate_session(&token).await {
            Ok(Some(user)) => {
                request.extensions_mut().insert(AuthenticatedUser(user));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Session lookup failed: {}", e),
        }
    }
    next.run(request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(header::HeaderName, &str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (name, value) in pairs {
            map.insert(name.clone(), HeaderValue::from_str(value).unwrap());
        }
        map
    }

    #[test]
    fn test_session_token_from_bearer() {
        let h = headers(&[(header::AUTHORIZATION, "Bearer abc123")]);
        assert_eq!(session_token(&h), Some("abc123".to_string()));
    }

    #[test]
    fn test_session_token_from_cookie() {
        let h = headers(&[(header::COOKIE, "theme=dark; session=tok; other=1")]);
        assert_eq!(session_token(&h), Some("tok".to_string()));
    }

    #[test]
    fn test_bearer_takes_priority() {
        let h = headers(&[
            (header::AUTHORIZATION, "Bearer from-header"),
            (header::COOKIE, "session=from-cookie"),
        ]);
        assert_eq!(session_token(&h), Some("from-header".to_string()));
    }

    #[test]
    fn test_session_token_missing_or_empty() {
        assert_eq!(session_token(&HeaderMap::new()), None);
        assert_eq!(session_token(&headers(&[(header::AUTHORIZATION, "Basic xyz")])), None);
        assert_eq!(session_token(&headers(&[(header::COOKIE, "session=")])), None);
    }

    #[test]
    fn test_session_cookie_format() {
        assert_eq!(
            session_cookie("abc", 30),
            "session=abc; Path=/; HttpOnly; SameSite=Lax; Max-Age=2592000"
        );
    }

    #[test]
    fn test_forwarded_ip() {
        let h = headers(&[(
            header::HeaderName::from_static("x-forwarded-for"),
            "203.0.113.7, 10.0.0.1",
        )]);
        assert_eq!(forwarded_ip(&h), Some("203.0.113.7".parse().unwrap()));

        let h = headers(&[(header::HeaderName::from_static("x-real-ip"), "198.51.100.2")]);
        assert_eq!(forwarded_ip(&h), Some("198.51.100.2".parse().unwrap()));

        assert_eq!(forwarded_ip(&HeaderMap::new()), None);
    }

    #[test]
    fn test_error_status_codes() {
        assert_eq!(ApiError::unauthorized("x").status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::forbidden("x").status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::not_found("x").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::validation_error("x").status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::conflict("x").status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::rate_limited("x", 60).status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ApiError::new("WHATEVER", "x").status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_service_error_mapping() {
        let e: ApiError = PostServiceError::Forbidden("nope".into()).into();
        assert_eq!(e.error.code, "FORBIDDEN");
        assert_eq!(e.message(), "nope");

        let e: ApiError = UserServiceError::UserExists("taken".into()).into();
        assert_eq!(e.status(), StatusCode::CONFLICT);

        let e: ApiError = EngagementServiceError::NotFound.into();
        assert_eq!(e.message(), "Post not found");

        let e: ApiError = PostServiceError::InternalError(anyhow::anyhow!("db down")).into();
        assert_eq!(e.message(), "Internal server error");
    }
}
