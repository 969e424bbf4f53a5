//! Services layer - Business logic
//!
//! Services sit between the HTTP handlers and the repositories. They apply
//! validation and ownership rules, keep the post cache consistent and turn
//! storage errors into typed service errors.

pub mod engagement;
pub mod markdown;
pub mod navigation;
pub mod password;
pub mod post;
pub mod rate_limiter;
pub mod user;

pub use engagement::{EngagementService, EngagementServiceError};
pub use markdown::{MarkdownRenderer, TocEntry};
pub use navigation::{ArchiveEntry, CountEntry, QuickNav};
pub use password::{hash_password, verify_password};
pub use post::{parse_tags_field, PostService, PostServiceError, RenderedContent};
pub use rate_limiter::LoginRateLimiter;
pub use user::{
    ChangePasswordInput, LoginInput, RegisterInput, UpdateProfileInput, UserService,
    UserServiceError,
};
