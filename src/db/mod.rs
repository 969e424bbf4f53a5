//! Database layer
//!
//! ByteBlog stores users, sessions, posts and engagement records in either
//! SQLite (default, single-file deployment) or MySQL. The driver is picked
//! from configuration and hidden behind the `DatabasePool` trait.
//!
//! # Usage
//!
//! ```ignore
//! use byteblog::config::DatabaseConfig;
//! use byteblog::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, MysqlDatabase, SqliteDatabase,
};
