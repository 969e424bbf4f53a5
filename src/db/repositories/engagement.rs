//! Engagement repository
//!
//! Likes and bookmarks share one shape: a `(post_id, user_id)` pair that is
//! unique per table. `EngagementKind` selects the table.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::EngagementKind;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::Row;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Engagement repository trait
#[async_trait]
pub trait EngagementRepository: Send + Sync {
    /// Record an engagement. Returns false if it already existed.
    async fn add(&self, kind: EngagementKind, post_id: i64, user_id: i64) -> Result<bool>;

    /// Remove an engagement. Returns false if there was none.
    async fn remove(&self, kind: EngagementKind, post_id: i64, user_id: i64) -> Result<bool>;

    /// Per-post totals for the given posts. Posts without rows are absent.
    async fn counts(&self, kind: EngagementKind, post_ids: &[i64]) -> Result<HashMap<i64, i64>>;

    /// The subset of `post_ids` the user has engaged with
    async fn marked_by_user(
        &self,
        kind: EngagementKind,
        user_id: i64,
        post_ids: &[i64],
    ) -> Result<HashSet<i64>>;
}

/// SQLx-based engagement repository implementation
pub struct SqlxEngagementRepository {
    pool: DynDatabasePool,
}

impl SqlxEngagementRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn EngagementRepository> {
        Arc::new(Self::new(pool))
    }
}

/// Ids bound per `IN (...)` query, well under SQLite's and MySQL's
/// placeholder limits
const IN_CLAUSE_CHUNK: usize = 500;

/// "?, ?, ?" for an IN clause
fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[async_trait]
impl EngagementRepository for SqlxEngagementRepository {
    async fn add(&self, kind: EngagementKind, post_id: i64, user_id: i64) -> Result<bool> {
        let now = Utc::now();
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let sql = format!(
                    "INSERT OR IGNORE INTO {} (post_id, user_id, created_at) VALUES (?, ?, ?)",
                    kind.table()
                );
                sqlx::query(&sql)
                    .bind(post_id)
                    .bind(user_id)
                    .bind(now)
                    .execute(self.pool.sqlite()?)
                    .await
                    .with_context(|| format!("Failed to add {}", kind))?
                    .rows_affected()
            }
            DatabaseDriver::Mysql => {
                let sql = format!(
                    "INSERT IGNORE INTO {} (post_id, user_id, created_at) VALUES (?, ?, ?)",
                    kind.table()
                );
                sqlx::query(&sql)
                    .bind(post_id)
                    .bind(user_id)
                    .bind(now)
                    .execute(self.pool.mysql()?)
                    .await
                    .with_context(|| format!("Failed to add {}", kind))?
                    .rows_affected()
            }
        };
        Ok(affected > 0)
    }

    async fn remove(&self, kind: EngagementKind, post_id: i64, user_id: i64) -> Result<bool> {
        let sql = format!(
            "DELETE FROM {} WHERE post_id = ? AND user_id = ?",
            kind.table()
        );
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(&sql)
                .bind(post_id)
                .bind(user_id)
                .execute(self.pool.sqlite()?)
                .await
                .with_context(|| format!("Failed to remove {}", kind))?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(&sql)
                .bind(post_id)
                .bind(user_id)
                .execute(self.pool.mysql()?)
                .await
                .with_context(|| format!("Failed to remove {}", kind))?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn counts(&self, kind: EngagementKind, post_ids: &[i64]) -> Result<HashMap<i64, i64>> {
        let mut counts = HashMap::with_capacity(post_ids.len());

        for chunk in post_ids.chunks(IN_CLAUSE_CHUNK) {
            let sql = format!(
                "SELECT post_id, COUNT(*) as count FROM {} WHERE post_id IN ({}) GROUP BY post_id",
                kind.table(),
                placeholders(chunk.len())
            );

            match self.pool.driver() {
                DatabaseDriver::Sqlite => {
                    let mut query = sqlx::query(&sql);
                    for id in chunk {
                        query = query.bind(*id);
                    }
                    let rows = query
                        .fetch_all(self.pool.sqlite()?)
                        .await
                        .with_context(|| format!("Failed to count {}s", kind))?;
                    for row in rows {
                        counts.insert(row.get("post_id"), row.get("count"));
                    }
                }
                DatabaseDriver::Mysql => {
                    let mut query = sqlx::query(&sql);
                    for id in chunk {
                        query = query.bind(*id);
                    }
                    let rows = query
                        .fetch_all(self.pool.mysql()?)
                        .await
                        .with_context(|| format!("Failed to count {}s", kind))?;
                    for row in rows {
                        counts.insert(row.get("post_id"), row.get("count"));
                    }
                }
            }
        }
        Ok(counts)
    }

    async fn marked_by_user(
        &self,
        kind: EngagementKind,
        user_id: i64,
        post_ids: &[i64],
    ) -> Result<HashSet<i64>> {
        let mut marked = HashSet::new();

        for chunk in post_ids.chunks(IN_CLAUSE_CHUNK) {
            let sql = format!(
                "SELECT post_id FROM {} WHERE user_id = ? AND post_id IN ({})",
                kind.table(),
                placeholders(chunk.len())
            );

            let rows = match self.pool.driver() {
                DatabaseDriver::Sqlite => {
                    let mut query = sqlx::query(&sql).bind(user_id);
                    for id in chunk {
                        query = query.bind(*id);
                    }
                    query
                        .fetch_all(self.pool.sqlite()?)
                        .await
                        .with_context(|| format!("Failed to load user {}s", kind))?
                        .iter()
                        .map(|row| row.get::<i64, _>("post_id"))
                        .collect::<Vec<_>>()
                }
                DatabaseDriver::Mysql => {
                    let mut query = sqlx::query(&sql).bind(user_id);
                    for id in chunk {
                        query = query.bind(*id);
                    }
                    query
                        .fetch_all(self.pool.mysql()?)
                        .await
                        .with_context(|| format!("Failed to load user {}s", kind))?
                        .iter()
                        .map(|row| row.get::<i64, _>("post_id"))
                        .collect::<Vec<_>>()
                }
            };
            marked.extend(rows);
        }
        Ok(marked)
    }
}
