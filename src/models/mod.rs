//! Data models
//!
//! Entities stored by ByteBlog (users, sessions, posts, likes and bookmarks)
//! plus the input and filter types the services accept.

mod engagement;
mod post;
mod session;
mod user;

pub use engagement::{EngagementKind, PostEngagement};
pub use post::{normalize_tags, CreatePostInput, Post, PostQuery, UpdatePostInput};
pub use session::Session;
pub use user::User;
