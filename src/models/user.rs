//! User model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A registered reader or writer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    /// Unique identifier
    pub id: i64,
    /// Display name, also copied onto posts as the author
    pub name: String,
    /// Email address (unique, used to sign in)
    pub email: String,
    /// Password hash (argon2)
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Create a new User.
    ///
    /// The password must already be hashed with
    /// `services::password::hash_password()`.
    pub fn new(name: String, email: String, password_hash: String) -> Self {
        let now = Utc::now();
        Self {
            id: 0, // Will be set by the database
            name,
            email,
            password_hash,
            created_at: now,
            updated_at: now,
        }
    }

    /// Name to stamp on posts written by this user
    pub fn author_name(&self) -> String {
        let name = self.name.trim();
        if name.is_empty() {
            "Anonymous".to_string()
        } else {
            name.to_string()
        }
    }
}
