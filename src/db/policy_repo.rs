//! SQLite-backed [`PolicyStore`].
//!
//! Acceptance is one row per `(post_policy_id, user_id)`, so accept and
//! unaccept are single-statement and safe to race.

use async_trait::async_trait;
use chrono::Utc;
use postpolicy_core::{
    GroupId, Page, Policy, PolicyId, PolicyStore, PostId, StoreError, User, UserId,
};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};

use super::directory_repo::UserRow;

#[derive(Clone)]
pub struct PolicyRepository {
    pool: SqlitePool,
}

#[derive(sqlx::FromRow)]
struct PolicyRow {
    id: i64,
    post_id: i64,
}

/// Members of the policy's groups (deduplicated) who have accepted.
const ACCEPTED_SQL: &str = r#"
    SELECT u.id, u.username, u.name, u.staff
    FROM users u
    WHERE u.id IN (
        SELECT gm.user_id
        FROM group_members gm
        JOIN post_policy_groups pg ON pg.group_id = gm.group_id
        WHERE pg.post_policy_id = ?1
    )
    AND u.id IN (SELECT pu.user_id FROM policy_users pu WHERE pu.post_policy_id = ?1)
    ORDER BY u.id
    LIMIT ?2 OFFSET ?3
"#;

/// Members of the policy's groups (deduplicated) who have not accepted.
const NOT_ACCEPTED_SQL: &str = r#"
    SELECT u.id, u.username, u.name, u.staff
    FROM users u
    WHERE u.id IN (
        SELECT gm.user_id
        FROM group_members gm
        JOIN post_policy_groups pg ON pg.group_id = gm.group_id
        WHERE pg.post_policy_id = ?1
    )
    AND u.id NOT IN (SELECT pu.user_id FROM policy_users pu WHERE pu.post_policy_id = ?1)
    ORDER BY u.id
    LIMIT ?2 OFFSET ?3
"#;

/// Values past `i64::MAX` clamp, so a huge offset reads as past the end.
fn to_i64(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

impl PolicyRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Attaches a policy to a post, or replaces the groups of the existing one.
    pub async fn set_policy(
        &self,
        post_id: PostId,
        group_ids: &[GroupId],
    ) -> Result<PolicyId, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT OR IGNORE INTO post_policies (post_id, created_at) VALUES (?, ?)")
            .bind(post_id.get())
            .bind(Utc::now().to_rfc3339())
            .execute(&mut *tx)
            .await?;

        let policy_id: i64 = sqlx::query_scalar("SELECT id FROM post_policies WHERE post_id = ?")
            .bind(post_id.get())
            .fetch_one(&mut *tx)
            .await?;

        // Replace groups
        sqlx::query("DELETE FROM post_policy_groups WHERE post_policy_id = ?")
            .bind(policy_id)
            .execute(&mut *tx)
            .await?;

        for group_id in group_ids {
            sqlx::query(
                "INSERT OR IGNORE INTO post_policy_groups (post_policy_id, group_id) VALUES (?, ?)",
            )
            .bind(policy_id)
            .bind(group_id.get())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        Ok(PolicyId(policy_id))
    }

    pub async fn get_policy(&self, post_id: PostId) -> Result<Option<Policy>, sqlx::Error> {
        let row: Option<PolicyRow> =
            sqlx::query_as("SELECT id, post_id FROM post_policies WHERE post_id = ?")
                .bind(post_id.get())
                .fetch_optional(&self.pool)
                .await?;

        Ok(row.map(|row| Policy {
            id: PolicyId(row.id),
            post_id: PostId(row.post_id),
        }))
    }

    pub async fn get_group_ids(&self, policy_id: PolicyId) -> Result<Vec<GroupId>, sqlx::Error> {
        let ids: Vec<i64> = sqlx::query_scalar(
            "SELECT group_id FROM post_policy_groups WHERE post_policy_id = ? ORDER BY group_id",
        )
        .bind(policy_id.get())
        .fetch_all(&self.pool)
        .await?;

        Ok(ids.into_iter().map(GroupId).collect())
    }

    pub async fn has_member_in(
        &self,
        user_id: UserId,
        group_ids: &[GroupId],
    ) -> Result<bool, sqlx::Error> {
        if group_ids.is_empty() {
            return Ok(false);
        }

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT EXISTS(SELECT 1 FROM group_members WHERE user_id = ",
        );
        builder.push_bind(user_id.get());
        builder.push(" AND group_id IN (");
        let mut separated = builder.separated(", ");
        for group_id in group_ids {
            separated.push_bind(group_id.get());
        }
        separated.push_unseparated("))");

        let found: i64 = builder
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;
        Ok(found != 0)
    }

    pub async fn insert_acceptance(
        &self,
        policy_id: PolicyId,
        user_id: UserId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "INSERT OR IGNORE INTO policy_users (post_policy_id, user_id, created_at) VALUES (?, ?, ?)",
        )
        .bind(policy_id.get())
        .bind(user_id.get())
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn delete_acceptance(
        &self,
        policy_id: PolicyId,
        user_id: UserId,
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM policy_users WHERE post_policy_id = ? AND user_id = ?")
            .bind(policy_id.get())
            .bind(user_id.get())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn list_members(
        &self,
        sql: &str,
        policy_id: PolicyId,
        page: Page,
    ) -> Result<Vec<User>, sqlx::Error> {
        let rows: Vec<UserRow> = sqlx::query_as(sql)
            .bind(policy_id.get())
            .bind(to_i64(page.limit))
            .bind(to_i64(page.offset))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(User::from).collect())
    }

    /// Counts of (accepted, not accepted) authorized members.
    pub async fn acceptance_counts(&self, policy_id: PolicyId) -> Result<(i64, i64), sqlx::Error> {
        sqlx::query_as(
            r#"
            SELECT
                COUNT(pu.user_id) AS accepted,
                COUNT(*) - COUNT(pu.user_id) AS not_accepted
            FROM (
                SELECT DISTINCT gm.user_id
                FROM group_members gm
                JOIN post_policy_groups pg ON pg.group_id = gm.group_id
                WHERE pg.post_policy_id = ?1
            ) m
            LEFT JOIN policy_users pu
                ON pu.user_id = m.user_id AND pu.post_policy_id = ?1
            "#,
        )
        .bind(policy_id.get())
        .fetch_one(&self.pool)
        .await
    }
}

#[async_trait]
impl PolicyStore for PolicyRepository {
    async fn policy_for_post(&self, post_id: PostId) -> Result<Option<Policy>, StoreError> {
        self.get_policy(post_id).await.map_err(StoreError::backend)
    }

    async fn group_ids(&self, policy_id: PolicyId) -> Result<Vec<GroupId>, StoreError> {
        self.get_group_ids(policy_id)
            .await
            .map_err(StoreError::backend)
    }

    async fn is_user_in_any_group(
        &self,
        user_id: UserId,
        group_ids: &[GroupId],
    ) -> Result<bool, StoreError> {
        self.has_member_in(user_id, group_ids)
            .await
            .map_err(StoreError::backend)
    }

    async fn add_acceptance(
        &self,
        policy_id: PolicyId,
        user_id: UserId,
    ) -> Result<(), StoreError> {
        self.insert_acceptance(policy_id, user_id)
            .await
            .map_err(StoreError::backend)
    }

    async fn remove_acceptance(
        &self,
        policy_id: PolicyId,
        user_id: UserId,
    ) -> Result<(), StoreError> {
        self.delete_acceptance(policy_id, user_id)
            .await
            .map_err(StoreError::backend)
    }

    async fn accepted_users(
        &self,
        policy_id: PolicyId,
        page: Page,
    ) -> Result<Vec<User>, StoreError> {
        self.list_members(ACCEPTED_SQL, policy_id, page)
            .await
            .map_err(StoreError::backend)
    }

    async fn not_accepted_users(
        &self,
        policy_id: PolicyId,
        page: Page,
    ) -> Result<Vec<User>, StoreError> {
        self.list_members(NOT_ACCEPTED_SQL, policy_id, page)
            .await
            .map_err(StoreError::backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{test_pool, DirectoryRepository};

    struct Fixture {
        _dir: tempfile::TempDir,
        directory: DirectoryRepository,
        policies: PolicyRepository,
        users: Vec<User>,
        group: GroupId,
        post: PostId,
    }

    /// Post with a policy for group "legal" holding `member_count` users.
    async fn fixture(member_count: usize) -> Fixture {
        let (dir, pool) = test_pool().await;
        let directory = DirectoryRepository::new(pool.clone());
        let policies = PolicyRepository::new(pool);

        let admin = directory.create_user("admin", None, true).await.unwrap();
        let group = directory.create_group("legal").await.unwrap();

        let mut users = Vec::new();
        for i in 0..member_count {
            let user = directory
                .create_user(&format!("member{}", i), None, false)
                .await
                .unwrap();
            directory.add_member(group, user.id).await.unwrap();
            users.push(user);
        }

        let post = directory.create_post(Some(admin.id)).await.unwrap();
        policies.set_policy(post, &[group]).await.unwrap();

        Fixture {
            _dir: dir,
            directory,
            policies,
            users,
            group,
            post,
        }
    }

    fn ids(users: &[User]) -> Vec<UserId> {
        users.iter().map(|u| u.id).collect()
    }

    #[tokio::test]
    async fn test_set_policy_and_fetch() {
        let f = fixture(0).await;

        let policy = f.policies.policy_for_post(f.post).await.unwrap().unwrap();
        assert_eq!(policy.post_id, f.post);
        assert_eq!(f.policies.group_ids(policy.id).await.unwrap(), vec![f.group]);

        let bare_post = f.directory.create_post(None).await.unwrap();
        assert!(f.policies.policy_for_post(bare_post).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_policy_replaces_groups() {
        let f = fixture(0).await;
        let other = f.directory.create_group("finance").await.unwrap();

        let first = f.policies.set_policy(f.post, &[f.group]).await.unwrap();
        let second = f.policies.set_policy(f.post, &[other]).await.unwrap();
        assert_eq!(first, second);
        assert_eq!(f.policies.group_ids(second).await.unwrap(), vec![other]);

        f.policies.set_policy(f.post, &[]).await.unwrap();
        assert!(f.policies.group_ids(second).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_membership_query() {
        let f = fixture(1).await;
        let other = f.directory.create_group("finance").await.unwrap();
        let member = f.users[0].id;

        assert!(f
            .policies
            .is_user_in_any_group(member, &[other, f.group])
            .await
            .unwrap());
        assert!(!f.policies.is_user_in_any_group(member, &[other]).await.unwrap());
        assert!(!f.policies.is_user_in_any_group(member, &[]).await.unwrap());
    }

    #[tokio::test]
    async fn test_accept_unaccept_idempotent() {
        let f = fixture(2).await;
        let policy = f.policies.policy_for_post(f.post).await.unwrap().unwrap();
        let (a, b) = (f.users[0].id, f.users[1].id);
        let page = Page::new(0, 25);

        f.policies.add_acceptance(policy.id, a).await.unwrap();
        f.policies.add_acceptance(policy.id, a).await.unwrap();

        let accepted = f.policies.accepted_users(policy.id, page).await.unwrap();
        assert_eq!(ids(&accepted), vec![a]);
        let pending = f.policies.not_accepted_users(policy.id, page).await.unwrap();
        assert_eq!(ids(&pending), vec![b]);
        assert_eq!(f.policies.acceptance_counts(policy.id).await.unwrap(), (1, 1));

        f.policies.remove_acceptance(policy.id, a).await.unwrap();
        f.policies.remove_acceptance(policy.id, a).await.unwrap();

        assert!(f
            .policies
            .accepted_users(policy.id, page)
            .await
            .unwrap()
            .is_empty());
        let pending = f.policies.not_accepted_users(policy.id, page).await.unwrap();
        assert_eq!(ids(&pending), vec![a, b]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_accepts_leave_one_record() {
        let f = fixture(3).await;
        let policy = f.policies.policy_for_post(f.post).await.unwrap().unwrap();
        let user = f.users[0].id;

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..16 {
            let repo = f.policies.clone();
            tasks.spawn(async move { repo.add_acceptance(policy.id, user).await });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap().unwrap();
        }

        let accepted = f
            .policies
            .accepted_users(policy.id, Page::new(0, 25))
            .await
            .unwrap();
        assert_eq!(ids(&accepted), vec![user]);
        assert_eq!(f.policies.acceptance_counts(policy.id).await.unwrap(), (1, 2));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_accepts_by_different_users() {
        let f = fixture(6).await;
        let policy = f.policies.policy_for_post(f.post).await.unwrap().unwrap();

        let mut tasks = tokio::task::JoinSet::new();
        for user in f.users.iter().take(4) {
            let repo = f.policies.clone();
            let user_id = user.id;
            tasks.spawn(async move { repo.add_acceptance(policy.id, user_id).await });
        }
        while let Some(result) = tasks.join_next().await {
            result.unwrap().unwrap();
        }

        let accepted = f
            .policies
            .accepted_users(policy.id, Page::new(0, 25))
            .await
            .unwrap();
        assert_eq!(ids(&accepted), ids(&f.users[0..4]));
        assert_eq!(f.policies.acceptance_counts(policy.id).await.unwrap(), (4, 2));
    }

    #[tokio::test]
    async fn test_pagination_ascending_ids() {
        let f = fixture(5).await;
        let policy = f.policies.policy_for_post(f.post).await.unwrap().unwrap();
        let all = ids(&f.users);

        let first = f
            .policies
            .not_accepted_users(policy.id, Page::new(0, 2))
            .await
            .unwrap();
        let second = f
            .policies
            .not_accepted_users(policy.id, Page::new(2, 2))
            .await
            .unwrap();
        let third = f
            .policies
            .not_accepted_users(policy.id, Page::new(4, 2))
            .await
            .unwrap();
        let past_end = f
            .policies
            .not_accepted_users(policy.id, Page::new(5, 2))
            .await
            .unwrap();

        assert_eq!(ids(&first), all[0..2].to_vec());
        assert_eq!(ids(&second), all[2..4].to_vec());
        assert_eq!(ids(&third), all[4..5].to_vec());
        assert!(past_end.is_empty());
    }

    #[tokio::test]
    async fn test_member_of_two_groups_listed_once() {
        let f = fixture(1).await;
        let other = f.directory.create_group("finance").await.unwrap();
        let member = f.users[0].id;
        f.directory.add_member(other, member).await.unwrap();
        let policy_id = f.policies.set_policy(f.post, &[f.group, other]).await.unwrap();

        let pending = f
            .policies
            .not_accepted_users(policy_id, Page::new(0, 25))
            .await
            .unwrap();
        assert_eq!(ids(&pending), vec![member]);
        assert_eq!(f.policies.acceptance_counts(policy_id).await.unwrap(), (0, 1));
    }

    #[tokio::test]
    async fn test_acceptance_by_non_member_not_listed() {
        let f = fixture(1).await;
        let policy = f.policies.policy_for_post(f.post).await.unwrap().unwrap();
        let outsider = f.directory.create_user("outsider", None, false).await.unwrap();

        f.policies.add_acceptance(policy.id, outsider.id).await.unwrap();

        assert!(f
            .policies
            .accepted_users(policy.id, Page::new(0, 25))
            .await
            .unwrap()
            .is_empty());
        assert_eq!(f.policies.acceptance_counts(policy.id).await.unwrap(), (0, 1));
    }
}
