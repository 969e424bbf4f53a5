//! ByteBlog - a small multi-user blog
//!
//! Users sign up and write Markdown posts filed under a category and tags.
//! Readers browse and filter them, and signed-in users like and bookmark
//! posts. Pages are rendered on the server; the same operations are exposed
//! as a JSON API under `/api/v1`.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod models;
pub mod services;
pub mod theme;
