//! Authentication API endpoints
//!
//! - POST /api/v1/auth/signup - Create an account
//! - POST /api/v1/auth/signin - Sign in, sets the session cookie
//! - POST /api/v1/auth/signout - Sign out
//! - GET /api/v1/auth/me - Current user
//! - PUT /api/v1/auth/profile - Change name and email
//! - PUT /api/v1/auth/password - Change password
//! - DELETE /api/v1/auth/account - Delete the account

use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;

use crate::api::middleware::{
    session_cookie, session_token, ApiError, AppState, AuthenticatedUser, ClientIp,
    CLEAR_SESSION_COOKIE,
};
use crate::models::{Session, User};
use crate::services::user::{
    ChangePasswordInput, LoginInput, RegisterInput, UpdateProfileInput, UserServiceError,
    INVALID_CREDENTIALS,
};

/// Response for successful authentication
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: UserResponse,
    pub token: String,
}

/// Response for user info
#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct DeleteAccountRequest {
    #[serde(default)]
    pub confirmation: String,
}

/// Routes that work without a session
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/signup", post(signup))
        .route("/signin", post(signin))
}

/// Routes behind `require_auth`
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/signout", post(signout))
        .route("/me", get(get_current_user))
        .route("/profile", put(update_profile))
        .route("/password", put(change_password))
        .route("/account", delete(delete_account))
}

/// Rate-limited sign-in shared by the JSON endpoint and the sign-in page.
///
/// Counts the request against the client IP, refuses emails that have used
/// up their failed attempts, and clears the email's counter on success.
pub(crate) async fn sign_in(
    state: &AppState,
    ip: Option<IpAddr>,
    input: LoginInput,
) -> Result<(Session, User), ApiError> {
    let limiter = &state.rate_limiter;

    if let Some(ip) = ip {
        if limiter.is_ip_limited(ip).await {
            tracing::warn!("Sign-in rate limit hit for {}", ip);
            return Err(ApiError::rate_limited(
                "Too many requests, please try again later",
                60,
            ));
        }
        limiter.record_ip_request(ip).await;
    }

    if limiter.is_email_limited(&input.email).await {
        return Err(ApiError::rate_limited(
            "Too many failed sign-in attempts, please try again in 15 minutes",
            900,
        ));
    }

    let email = input.email.clone();
    let session = match state.user_service.login(input).await {
        Ok(session) => session,
        Err(UserServiceError::AuthenticationError(_)) => {
            limiter.record_failed_attempt(&email).await;
            return Err(ApiError::unauthorized(INVALID_CREDENTIALS));
        }
        Err(e) => return Err(e.into()),
    };
    limiter.clear_email_attempts(&email).await;

    let user = state
        .user_service
        .get_by_id(session.user_id)
        .await?
        .ok_or_else(|| ApiError::internal_error("Session user disappeared"))?;

    tracing::info!("User {} signed in", user.id);
    Ok((session, user))
}

/// POST /api/v1/auth/signup
async fn signup(
    State(state): State<AppState>,
    Json(body): Json<RegisterInput>,
) -> Result<impl IntoResponse, ApiError> {
    let user = state.user_service.register(body).await?;
    Ok((StatusCode::CREATED, Json(serde_json::json!({ "user": UserResponse::from(user) }))))
}

/// POST /api/v1/auth/signin
async fn signin(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Json(body): Json<LoginInput>,
) -> Result<impl IntoResponse, ApiError> {
    let (session, user) = sign_in(&state, ip, body).await?;
    let cookie = session_cookie(&session.id, state.user_service.session_days());

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(AuthResponse {
            user: user.into(),
            token: session.id,
        }),
    ))
}

/// POST /api/v1/auth/signout
async fn signout(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ApiError> {
    if let Some(token) = session_token(&headers) {
        state.user_service.logout(&token).await?;
    }

    Ok((
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, CLEAR_SESSION_COOKIE)],
    ))
}

/// GET /api/v1/auth/me
async fn get_current_user(user: AuthenticatedUser) -> Json<UserResponse> {
    Json(user.0.into())
}

/// PUT /api/v1/auth/profile
async fn update_profile(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<UpdateProfileInput>,
) -> Result<Json<UserResponse>, ApiError> {
    let updated = state.user_service.update_profile(user.0.id, body).await?;
    // Cached posts carry the old author name
    state.post_service.invalidate_cache().await;
    Ok(Json(updated.into()))
}

/// PUT /api/v1/auth/password
///
/// Other sessions of the user are signed out; the calling one survives.
async fn change_password(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    headers: HeaderMap,
    Json(body): Json<ChangePasswordInput>,
) -> Result<impl IntoResponse, ApiError> {
    let current = session_token(&headers);
    state
        .user_service
        .change_password(user.0.id, body, current.as_deref())
        .await?;
    Ok(Json(serde_json::json!({ "success": true })))
}

/// DELETE /api/v1/auth/account
async fn delete_account(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(body): Json<DeleteAccountRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .user_service
        .delete_account(user.0.id, &body.confirmation)
        .await?;
    state.post_service.invalidate_cache().await;

    Ok((
        [(header::SET_COOKIE, CLEAR_SESSION_COOKIE)],
        Json(serde_json::json!({ "success": true })),
    ))
}
