//! Database repositories
//!
//! Repository pattern implementations for database access.
//! Each repository handles the queries for one table (likes and bookmarks
//! share one).

pub mod engagement;
pub mod post;
pub mod session;
pub mod user;

pub use engagement::{EngagementRepository, SqlxEngagementRepository};
pub use post::{PostRepository, SqlxPostRepository};
pub use session::{SessionRepository, SqlxSessionRepository};
pub use user::{SqlxUserRepository, UserRepository};
