//! User service
//!
//! Account lifecycle and authentication:
//! - signup with name, email and a confirmed password
//! - email/password sign-in issuing a database-backed session token
//! - profile edits (a rename is copied onto the user's posts)
//! - password change and account deletion

use crate::config::AuthConfig;
use crate::db::repositories::{PostRepository, SessionRepository, UserRepository};
use crate::models::{Session, User};
use crate::services::password::{hash_password, is_long_enough, verify_password};
use anyhow::Context;
use chrono::{Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

/// Generic sign-in failure. Never reveals which half was wrong.
pub const INVALID_CREDENTIALS: &str = "Invalid email or password";

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Authentication failed (invalid credentials)
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// Validation error (invalid input)
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Email already registered
    #[error("User already exists: {0}")]
    UserExists(String),

    /// User not found
    #[error("User not found")]
    NotFound,

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// User service for managing accounts and sessions
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    session_repo: Arc<dyn SessionRepository>,
    post_repo: Arc<dyn PostRepository>,
    session_days: i64,
    min_password_length: usize,
}

impl UserService {
    /// Create a user service with default session length and password policy
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        post_repo: Arc<dyn PostRepository>,
    ) -> Self {
        Self::with_config(user_repo, session_repo, post_repo, &AuthConfig::default())
    }

    /// Create a user service using the `auth` configuration section
    pub fn with_config(
        user_repo: Arc<dyn UserRepository>,
        session_repo: Arc<dyn SessionRepository>,
        post_repo: Arc<dyn PostRepository>,
        config: &AuthConfig,
    ) -> Self {
        Self {
            user_repo,
            session_repo,
            post_repo,
            session_days: config.session_days,
            min_password_length: config.min_password_length,
        }
    }

    /// Session lifetime in days, used for the cookie Max-Age
    pub fn session_days(&self) -> i64 {
        self.session_days
    }

    /// Register a new account.
    ///
    /// Validation runs in a fixed order so the first problem is the one shown:
    /// name, email, password confirmation, password length.
    pub async fn register(&self, input: RegisterInput) -> Result<User, UserServiceError> {
        let name = input.name.trim().to_string();
        let email = input.email.trim().to_lowercase();

        validate_name_and_email(&name, &email)?;

        if input.password != input.confirm_password {
            return Err(UserServiceError::ValidationError(
                "Passwords do not match".to_string(),
            ));
        }
        if !is_long_enough(&input.password, self.min_password_length) {
            return Err(UserServiceError::ValidationError(format!(
                "Password must be at least {} characters",
                self.min_password_length
            )));
        }

        if self
            .user_repo
            .get_by_email(&email)
            .await
            .context("Failed to check email")?
            .is_some()
        {
            return Err(UserServiceError::UserExists(
                "User with this email already exists".to_string(),
            ));
        }

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;
        let created = self
            .user_repo
            .create(&User::new(name, email, password_hash))
            .await
            .context("Failed to create user")?;

        tracing::info!("Registered user {} ({})", created.id, created.email);
        Ok(created)
    }

    /// Sign in with email and password, returning a fresh session.
    pub async fn login(&self, input: LoginInput) -> Result<Session, UserServiceError> {
        let invalid = || UserServiceError::AuthenticationError(INVALID_CREDENTIALS.to_string());

        if input.email.trim().is_empty() || input.password.is_empty() {
            return Err(invalid());
        }

        let user = self
            .user_repo
            .get_by_email(&input.email)
            .await
            .context("Failed to get user by email")?
            .ok_or_else(invalid)?;

        let valid = verify_password(&input.password, &user.password_hash)
            .context("Failed to verify password")?;
        if !valid {
            return Err(invalid());
        }

        self.create_session(user.id).await
    }

    /// Sign out by deleting the session. Unknown tokens are not an error.
    pub async fn logout(&self, session_id: &str) -> Result<(), UserServiceError> {
        self.session_repo
            .delete(session_id)
            .await
            .context("Failed to delete session")?;
        Ok(())
    }

    /// Resolve a session token to its user.
    ///
    /// Returns `None` for unknown or expired tokens; an expired session is
    /// deleted on the way out.
    pub async fn validate_session(&self, token: &str) -> Result<Option<User>, UserServiceError> {
        let session = match self
            .session_repo
            .get_by_id(token)
            .await
            .context("Failed to get session")?
        {
            Some(s) => s,
            None => return Ok(None),
        };

        if session.is_expired() {
            let _ = self.session_repo.delete(token).await;
            return Ok(None);
        }

        let user = self
            .user_repo
            .get_by_id(session.user_id)
            .await
            .context("Failed to get user")?;

        Ok(user)
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        let user = self
            .user_repo
            .get_by_id(id)
            .await
            .context("Failed to get user by ID")?;
        Ok(user)
    }

    /// Change name and email.
    ///
    /// When the name changes, the `author` column of the user's posts is
    /// rewritten too. That second step is best-effort: a failure is logged and
    /// the profile update still succeeds.
    pub async fn update_profile(
        &self,
        user_id: i64,
        input: UpdateProfileInput,
    ) -> Result<User, UserServiceError> {
        let name = input.name.trim().to_string();
        let email = input.email.trim().to_lowercase();
        validate_name_and_email(&name, &email)?;

        let current = self.get_by_id(user_id).await?.ok_or(UserServiceError::NotFound)?;

        if email != current.email {
            let taken = self
                .user_repo
                .get_by_email(&email)
                .await
                .context("Failed to check email")?
                .is_some_and(|other| other.id != user_id);
            if taken {
                return Err(UserServiceError::UserExists(
                    "Email is already in use".to_string(),
                ));
            }
        }

        let updated = self
            .user_repo
            .update_profile(user_id, &name, &email)
            .await
            .context("Failed to update profile")?;

        if updated.name != current.name {
            if let Err(e) = self
                .post_repo
                .update_author_name(user_id, &updated.author_name())
                .await
            {
                tracing::warn!("Failed to update author name on posts of user {}: {:#}", user_id, e);
            }
        }

        Ok(updated)
    }

    /// Change the password after checking the current one.
    ///
    /// Every other session of the user is signed out; `keep_session` (the
    /// caller's own token) survives.
    pub async fn change_password(
        &self,
        user_id: i64,
        input: ChangePasswordInput,
        keep_session: Option<&str>,
    ) -> Result<(), UserServiceError> {
        if input.new_password != input.confirm_password {
            return Err(UserServiceError::ValidationError(
                "New passwords do not match".to_string(),
            ));
        }
        if !is_long_enough(&input.new_password, self.min_password_length) {
            return Err(UserServiceError::ValidationError(format!(
                "New password must be at least {} characters long",
                self.min_password_length
            )));
        }

        let user = self.get_by_id(user_id).await?.ok_or(UserServiceError::NotFound)?;

        let valid = verify_password(&input.current_password, &user.password_hash)
            .context("Failed to verify current password")?;
        if !valid {
            return Err(UserServiceError::AuthenticationError(
                "Current password is incorrect".to_string(),
            ));
        }

        let password_hash =
            hash_password(&input.new_password).context("Failed to hash password")?;
        self.user_repo
            .update_password(user_id, &password_hash)
            .await
            .context("Failed to update password")?;

        let revoked = self
            .session_repo
            .delete_by_user(user_id, keep_session)
            .await
            .context("Failed to revoke sessions")?;
        tracing::debug!("Password changed for user {}, {} session(s) revoked", user_id, revoked);

        Ok(())
    }

    /// Delete the account and everything it owns.
    ///
    /// `confirmation` must be exactly the account's email address. Posts,
    /// likes, bookmarks and sessions go with the user row.
    pub async fn delete_account(
        &self,
        user_id: i64,
        confirmation: &str,
    ) -> Result<(), UserServiceError> {
        let user = self.get_by_id(user_id).await?.ok_or(UserServiceError::NotFound)?;

        if confirmation != user.email {
            return Err(UserServiceError::ValidationError(
                "Confirmation text does not match your email address".to_string(),
            ));
        }

        let deleted = self
            .user_repo
            .delete(user_id)
            .await
            .context("Failed to delete user account")?;
        if !deleted {
            return Err(UserServiceError::NotFound);
        }

        tracing::info!("Deleted account {} ({})", user.id, user.email);
        Ok(())
    }

    /// Delete all expired sessions, returning how many were removed
    pub async fn cleanup_expired_sessions(&self) -> Result<i64, UserServiceError> {
        let count = self
            .session_repo
            .delete_expired()
            .await
            .context("Failed to delete expired sessions")?;
        Ok(count)
    }

    async fn create_session(&self, user_id: i64) -> Result<Session, UserServiceError> {
        let now = Utc::now();
        let session = Session {
            id: Uuid::new_v4().to_string(),
            user_id,
            expires_at: now + Duration::days(self.session_days),
            created_at: now,
        };

        let created = self
            .session_repo
            .create(&session)
            .await
            .context("Failed to create session")?;

        Ok(created)
    }
}

fn validate_name_and_email(name: &str, email: &str) -> Result<(), UserServiceError> {
    if name.is_empty() {
        return Err(UserServiceError::ValidationError(
            "Name is required".to_string(),
        ));
    }
    if !email.contains('@') {
        return Err(UserServiceError::ValidationError(
            "Invalid email address".to_string(),
        ));
    }
    Ok(())
}

/// Input for user registration
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct RegisterInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    #[serde(default, alias = "confirmPassword")]
    pub confirm_password: String,
}

impl RegisterInput {
    /// Registration input where the confirmation repeats the password
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        let password = password.into();
        Self {
            name: name.into(),
            email: email.into(),
            confirm_password: password.clone(),
            password,
        }
    }

    pub fn with_confirmation(mut self, confirm_password: impl Into<String>) -> Self {
        self.confirm_password = confirm_password.into();
        self
    }
}

/// Input for user login
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct LoginInput {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl LoginInput {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}

/// Input for profile edits
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct UpdateProfileInput {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
}

impl UpdateProfileInput {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// Input for a password change
#[derive(Debug, Clone, Default, serde::Deserialize)]
pub struct ChangePasswordInput {
    #[serde(default, alias = "currentPassword")]
    pub current_password: String,
    #[serde(default, alias = "newPassword")]
    pub new_password: String,
    #[serde(default, alias = "confirmPassword")]
    pub confirm_password: String,
}

impl ChangePasswordInput {
    pub fn new(current: impl Into<String>, new_password: impl Into<String>) -> Self {
        let new_password = new_password.into();
        Self {
            current_password: current.into(),
            confirm_password: new_password.clone(),
            new_password,
        }
    }

    pub fn with_confirmation(mut self, confirm_password: impl Into<String>) -> Self {
        self.confirm_password = confirm_password.into();
        self
    }
}
