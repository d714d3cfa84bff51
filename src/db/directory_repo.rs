//! Users, groups and posts.
//!
//! These belong to the surrounding site; the policy layer only reads them
//! through [`PostLookup`] and group membership queries. The write helpers
//! exist for the admin tool and tests.

use async_trait::async_trait;
use chrono::Utc;
use postpolicy_core::{GroupId, Post, PostId, PostLookup, StoreError, User, UserId};
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct DirectoryRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
pub(crate) struct UserRow {
    id: i64,
    username: String,
    name: Option<String>,
    staff: bool,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: UserId(row.id),
            username: row.username,
            name: row.name,
            staff: row.staff,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PostRow {
    id: i64,
    user_id: Option<i64>,
    author_staff: i64,
}

impl DirectoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub async fn create_user(
        &self,
        username: &str,
        name: Option<&str>,
        staff: bool,
    ) -> Result<User, sqlx::Error> {
        let id = sqlx::query(
            "INSERT INTO users (username, name, staff, created_at) VALUES (?, ?, ?, ?)",
        )
        .bind(username)
        .bind(name)
        .bind(staff)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?
        .last_insert_rowid();

        Ok(User {
            id: UserId(id),
            username: username.to_string(),
            name: name.map(str::to_string),
            staff,
        })
    }

    pub async fn get_user_by_username(&self, username: &str) -> Result<Option<User>, sqlx::Error> {
        let row: Option<UserRow> =
            sqlx::query_as("SELECT id, username, name, staff FROM users WHERE username = ?")
                .bind(username)
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(User::from))
    }

    pub async fn list_users(&self) -> Result<Vec<User>, sqlx::Error> {
        let rows: Vec<UserRow> =
            sqlx::query_as("SELECT id, username, name, staff FROM users ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        Ok(rows.into_iter().map(User::from).collect())
    }

    pub async fn create_group(&self, name: &str) -> Result<GroupId, sqlx::Error> {
        let id = sqlx::query("INSERT INTO user_groups (name, created_at) VALUES (?, ?)")
            .bind(name)
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?
            .last_insert_rowid();

        Ok(GroupId(id))
    }

    pub async fn find_group(&self, name: &str) -> Result<Option<GroupId>, sqlx::Error> {
        let id: Option<i64> = sqlx::query_scalar("SELECT id FROM user_groups WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(id.map(GroupId))
    }

    pub async fn add_member(&self, group_id: GroupId, user_id: UserId) -> Result<(), sqlx::Error> {
        sqlx::query("INSERT OR IGNORE INTO group_members (group_id, user_id) VALUES (?, ?)")
            .bind(group_id.get())
            .bind(user_id.get())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn create_post(&self, author_id: Option<UserId>) -> Result<PostId, sqlx::Error> {
        let id = sqlx::query("INSERT INTO posts (user_id, created_at) VALUES (?, ?)")
            .bind(author_id.map(UserId::get))
            .bind(Utc::now().to_rfc3339())
            .execute(&self.pool)
            .await?
            .last_insert_rowid();

        Ok(PostId(id))
    }

    pub async fn get_post(&self, post_id: PostId) -> Result<Option<Post>, sqlx::Error> {
        let row: Option<PostRow> = sqlx::query_as(
            r#"
            SELECT p.id, p.user_id, COALESCE(u.staff, 0) AS author_staff
            FROM posts p
            LEFT JOIN users u ON u.id = p.user_id
            WHERE p.id = ?
            "#,
        )
        .bind(post_id.get())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| Post {
            id: PostId(row.id),
            author_id: row.user_id.map(UserId),
            authored_by_staff: row.author_staff != 0,
        }))
    }
}

#[async_trait]
impl PostLookup for DirectoryRepository {
    async fn find_post(&self, post_id: PostId) -> Result<Option<Post>, StoreError> {
        self.get_post(post_id).await.map_err(StoreError::backend)
    }
}
