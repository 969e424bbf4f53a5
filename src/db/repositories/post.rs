//! Post repository
//!
//! Database operations for blog posts. The `tags` column holds a JSON array of
//! strings, or NULL when a post has no tags.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::Post;
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{MySqlPool, Row, SqlitePool};
use std::sync::Arc;

/// Post repository trait
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// All posts, newest first
    async fn list(&self) -> Result<Vec<Post>>;

    /// Posts owned by a user, newest first
    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Post>>;

    /// Posts a user has bookmarked, most recently bookmarked first
    async fn list_bookmarked_by_user(&self, user_id: i64) -> Result<Vec<Post>>;

    /// Get post by ID
    async fn get_by_id(&self, id: i64) -> Result<Option<Post>>;

    /// Insert a post; `id` and `created_at` of the argument are ignored
    async fn create(&self, post: &Post) -> Result<Post>;

    /// Replace title, content, category and tags and stamp `updated_at`
    async fn update(&self, post: &Post) -> Result<Post>;

    /// Delete a post
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Rewrite the author name on every post of a user
    async fn update_author_name(&self, user_id: i64, author: &str) -> Result<u64>;

    /// Check if a post exists
    async fn exists(&self, id: i64) -> Result<bool>;
}

/// SQLx-based post repository implementation
pub struct SqlxPostRepository {
    pool: DynDatabasePool,
}

impl SqlxPostRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn PostRepository> {
        Arc::new(Self::new(pool))
    }
}

const POST_COLUMNS: &str =
    "posts.id, posts.title, posts.content, posts.author, posts.user_id, posts.category, \
     posts.tags, posts.created_at, posts.updated_at";

/// Serialize tags for storage. An empty list is stored as NULL.
pub fn encode_tags(tags: &[String]) -> Result<Option<String>> {
    if tags.is_empty() {
        return Ok(None);
    }
    serde_json::to_string(tags)
        .map(Some)
        .context("Failed to serialize tags")
}

/// Parse the stored tag column. NULL and malformed values read as no tags.
pub fn decode_tags(raw: Option<&str>) -> Vec<String> {
    raw.and_then(|s| serde_json::from_str::<Vec<String>>(s).ok())
        .unwrap_or_default()
}

#[async_trait]
impl PostRepository for SqlxPostRepository {
    async fn list(&self) -> Result<Vec<Post>> {
        let sql = format!(
            "SELECT {} FROM posts ORDER BY posts.created_at DESC, posts.id DESC",
            POST_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => fetch_posts_sqlite(self.pool.sqlite()?, &sql, None).await,
            DatabaseDriver::Mysql => fetch_posts_mysql(self.pool.mysql()?, &sql, None).await,
        }
    }

    async fn list_by_user(&self, user_id: i64) -> Result<Vec<Post>> {
        let sql = format!(
            "SELECT {} FROM posts WHERE posts.user_id = ? \
             ORDER BY posts.created_at DESC, posts.id DESC",
            POST_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                fetch_posts_sqlite(self.pool.sqlite()?, &sql, Some(user_id)).await
            }
            DatabaseDriver::Mysql => {
                fetch_posts_mysql(self.pool.mysql()?, &sql, Some(user_id)).await
            }
        }
    }

    async fn list_bookmarked_by_user(&self, user_id: i64) -> Result<Vec<Post>> {
        let sql = format!(
            "SELECT {} FROM posts \
             INNER JOIN bookmarks ON bookmarks.post_id = posts.id \
             WHERE bookmarks.user_id = ? \
             ORDER BY bookmarks.created_at DESC, bookmarks.id DESC",
            POST_COLUMNS
        );
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                fetch_posts_sqlite(self.pool.sqlite()?, &sql, Some(user_id)).await
            }
            DatabaseDriver::Mysql => {
                fetch_posts_mysql(self.pool.mysql()?, &sql, Some(user_id)).await
            }
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Post>> {
        let sql = format!("SELECT {} FROM posts WHERE posts.id = ?", POST_COLUMNS);
        let posts = match self.pool.driver() {
            DatabaseDriver::Sqlite => fetch_posts_sqlite(self.pool.sqlite()?, &sql, Some(id)).await?,
            DatabaseDriver::Mysql => fetch_posts_mysql(self.pool.mysql()?, &sql, Some(id)).await?,
        };
        Ok(posts.into_iter().next())
    }

    async fn create(&self, post: &Post) -> Result<Post> {
        let tags = encode_tags(&post.tags)?;
        let now = Utc::now();
        let sql = r#"
            INSERT INTO posts (title, content, author, user_id, category, tags, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, NULL)
        "#;

        let id = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(&post.title)
                .bind(&post.content)
                .bind(&post.author)
                .bind(post.user_id)
                .bind(&post.category)
                .bind(&tags)
                .bind(now)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to create post")?
                .last_insert_rowid(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(&post.title)
                .bind(&post.content)
                .bind(&post.author)
                .bind(post.user_id)
                .bind(&post.category)
                .bind(&tags)
                .bind(now)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to create post")?
                .last_insert_id() as i64,
        };

        Ok(Post {
            id,
            created_at: now,
            updated_at: None,
            ..post.clone()
        })
    }

    async fn update(&self, post: &Post) -> Result<Post> {
        let tags = encode_tags(&post.tags)?;
        let now = Utc::now();
        let sql = r#"
            UPDATE posts
            SET title = ?, content = ?, category = ?, tags = ?, updated_at = ?
            WHERE id = ?
        "#;

        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(&post.title)
                .bind(&post.content)
                .bind(&post.category)
                .bind(&tags)
                .bind(now)
                .bind(post.id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to update post")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(&post.title)
                .bind(&post.content)
                .bind(&post.category)
                .bind(&tags)
                .bind(now)
                .bind(post.id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to update post")?
                .rows_affected(),
        };

        if affected == 0 {
            anyhow::bail!("Post {} not found", post.id);
        }

        Ok(Post {
            updated_at: Some(now),
            ..post.clone()
        })
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let sql = "DELETE FROM posts WHERE id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to delete post")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to delete post")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn update_author_name(&self, user_id: i64, author: &str) -> Result<u64> {
        let sql = "UPDATE posts SET author = ? WHERE user_id = ?";
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(author)
                .bind(user_id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to update post authors")?
                .rows_affected(),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(author)
                .bind(user_id)
                .execute(self.pool.mysql()?)
                .await
                .context("Failed to update post authors")?
                .rows_affected(),
        };
        Ok(affected)
    }

    async fn exists(&self, id: i64) -> Result<bool> {
        let sql = "SELECT COUNT(*) as count FROM posts WHERE id = ?";
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(sql)
                .bind(id)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to check post existence")?
                .get("count"),
            DatabaseDriver::Mysql => sqlx::query(sql)
                .bind(id)
                .fetch_one(self.pool.mysql()?)
                .await
                .context("Failed to check post existence")?
                .get("count"),
        };
        Ok(count > 0)
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn fetch_posts_sqlite(pool: &SqlitePool, sql: &str, arg: Option<i64>) -> Result<Vec<Post>> {
    let mut query = sqlx::query(sql);
    if let Some(arg) = arg {
        query = query.bind(arg);
    }
    let rows = query.fetch_all(pool).await.context("Failed to fetch posts")?;
    Ok(rows.iter().map(row_to_post_sqlite).collect())
}

fn row_to_post_sqlite(row: &sqlx::sqlite::SqliteRow) -> Post {
    let tags: Option<String> = row.get("tags");
    let updated_at: Option<DateTime<Utc>> = row.get("updated_at");
    Post {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        author: row.get("author"),
        user_id: row.get("user_id"),
        category: row.get("category"),
        tags: decode_tags(tags.as_deref()),
        created_at: row.get("created_at"),
        updated_at,
    }
}

// ============================================================================
// MySQL implementations
// ============================================================================

async fn fetch_posts_mysql(pool: &MySqlPool, sql: &str, arg: Option<i64>) -> Result<Vec<Post>> {
    let mut query = sqlx::query(sql);
    if let Some(arg) = arg {
        query = query.bind(arg);
    }
    let rows = query.fetch_all(pool).await.context("Failed to fetch posts")?;
    Ok(rows.iter().map(row_to_post_mysql).collect())
}

fn row_to_post_mysql(row: &sqlx::mysql::MySqlRow) -> Post {
    let tags: Option<String> = row.get("tags");
    let updated_at: Option<DateTime<Utc>> = row.get("updated_at");
    Post {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        author: row.get("author"),
        user_id: row.get("user_id"),
        category: row.get("category"),
        tags: decode_tags(tags.as_deref()),
        created_at: row.get("created_at"),
        updated_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::{SqlxUserRepository, UserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::User;

    async fn setup_test_repo() -> (DynDatabasePool, SqlxPostRepository) {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        let repo = SqlxPostRepository::new(pool.clone());
        (pool, repo)
    }

    async fn create_user(pool: &DynDatabasePool, name: &str) -> User {
        SqlxUserRepository::new(pool.clone())
            .create(&User::new(
                name.to_string(),
                format!("{}@example.com", name.to_lowercase()),
                "hash".to_string(),
            ))
            .await
            .expect("Failed to create user")
    }

    fn draft(user: &User, title: &str, tags: &[&str]) -> Post {
        Post {
            id: 0,
            title: title.to_string(),
            content: format!("Content of {}", title),
            author: Some(user.name.clone()),
            user_id: Some(user.id),
            category: Some("Technology".to_string()),
            tags: tags.iter().map(|t| t.to_string()).collect(),
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn test_tag_encoding() {
        assert_eq!(encode_tags(&[]).unwrap(), None);
        let encoded = encode_tags(&["CSS".to_string(), "UI/UX".to_string()]).unwrap();
        assert_eq!(encoded.as_deref(), Some(r#"["CSS","UI/UX"]"#));
        assert_eq!(decode_tags(encoded.as_deref()), vec!["CSS", "UI/UX"]);
        assert!(decode_tags(None).is_empty());
        assert!(decode_tags(Some("not json")).is_empty());
    }

    #[tokio::test]
    async fn test_create_and_get_post() {
        let (pool, repo) = setup_test_repo().await;
        let user = create_user(&pool, "Ada").await;

        let created = repo
            .create(&draft(&user, "First", &["Rust", "CSS"]))
            .await
            .expect("Failed to create post");
        assert!(created.id > 0);
        assert!(created.updated_at.is_none());

        let found = repo
            .get_by_id(created.id)
            .await
            .expect("Failed to get post")
            .expect("Post not found");
        assert_eq!(found.title, "First");
        assert_eq!(found.author.as_deref(), Some("Ada"));
        assert_eq!(found.tags, vec!["Rust", "CSS"]);
        assert!(found.is_owned_by(user.id));
    }

    #[tokio::test]
    async fn test_empty_tags_stored_as_null() {
        let (pool, repo) = setup_test_repo().await;
        let user = create_user(&pool, "Ada").await;
        let created = repo.create(&draft(&user, "Untagged", &[])).await.unwrap();

        let raw: Option<String> = sqlx::query("SELECT tags FROM posts WHERE id = ?")
            .bind(created.id)
            .fetch_one(pool.sqlite().unwrap())
            .await
            .unwrap()
            .get("tags");
        assert!(raw.is_none());

        let found = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert!(found.tags.is_empty());
    }

    #[tokio::test]
    async fn test_list_orders_newest_first() {
        let (pool, repo) = setup_test_repo().await;
        let ada = create_user(&pool, "Ada").await;
        let bob = create_user(&pool, "Bob").await;

        let first = repo.create(&draft(&ada, "First", &[])).await.unwrap();
        let second = repo.create(&draft(&bob, "Second", &[])).await.unwrap();
        let third = repo.create(&draft(&ada, "Third", &[])).await.unwrap();

        let ids: Vec<i64> = repo.list().await.unwrap().iter().map(|p| p.id).collect();
        assert_eq!(ids, vec![third.id, second.id, first.id]);

        let ada_ids: Vec<i64> = repo
            .list_by_user(ada.id)
            .await
            .unwrap()
            .iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(ada_ids, vec![third.id, first.id]);
    }

    #[tokio::test]
    async fn test_update_post() {
        let (pool, repo) = setup_test_repo().await;
        let user = create_user(&pool, "Ada").await;
        let created = repo.create(&draft(&user, "Before", &["A"])).await.unwrap();

        let mut changed = created.clone();
        changed.title = "After".to_string();
        changed.category = None;
        changed.tags = vec![];
        let updated = repo.update(&changed).await.expect("Failed to update post");
        assert!(updated.updated_at.is_some());

        let found = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(found.title, "After");
        assert_eq!(found.category, None);
        assert!(found.tags.is_empty());
        assert!(found.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_update_missing_post_fails() {
        let (pool, repo) = setup_test_repo().await;
        let user = create_user(&pool, "Ada").await;
        let mut ghost = draft(&user, "Ghost", &[]);
        ghost.id = 999;
        assert!(repo.update(&ghost).await.is_err());
    }

    #[tokio::test]
    async fn test_delete_post() {
        let (pool, repo) = setup_test_repo().await;
        let user = create_user(&pool, "Ada").await;
        let created = repo.create(&draft(&user, "Doomed", &[])).await.unwrap();

        assert!(repo.exists(created.id).await.unwrap());
        assert!(repo.delete(created.id).await.unwrap());
        assert!(!repo.delete(created.id).await.unwrap());
        assert!(!repo.exists(created.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_update_author_name() {
        let (pool, repo) = setup_test_repo().await;
        let ada = create_user(&pool, "Ada").await;
        let bob = create_user(&pool, "Bob").await;
        repo.create(&draft(&ada, "One", &[])).await.unwrap();
        repo.create(&draft(&ada, "Two", &[])).await.unwrap();
        repo.create(&draft(&bob, "Three", &[])).await.unwrap();

        let changed = repo.update_author_name(ada.id, "Countess").await.unwrap();
        assert_eq!(changed, 2);

        for post in repo.list().await.unwrap() {
            if post.user_id == Some(ada.id) {
                assert_eq!(post.author.as_deref(), Some("Countess"));
            } else {
                assert_eq!(post.author.as_deref(), Some("Bob"));
            }
        }
    }

    #[tokio::test]
    async fn test_deleting_user_removes_posts() {
        let (pool, repo) = setup_test_repo().await;
        let ada = create_user(&pool, "Ada").await;
        repo.create(&draft(&ada, "One", &[])).await.unwrap();

        SqlxUserRepository::new(pool.clone())
            .delete(ada.id)
            .await
            .unwrap();

        assert!(repo.list().await.unwrap().is_empty());
    }
}
