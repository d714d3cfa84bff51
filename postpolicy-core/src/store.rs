//! Storage contracts consumed by the gate and the acceptance service.
//!
//! [`PolicyStore`] is pure data access: no business rules live behind it.
//! Listings must come back in ascending [`UserId`] order so offset paging is
//! reproducible.

use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::StoreError;
use crate::models::{GroupId, Policy, PolicyId, Post, PostId, User, UserId};

/// Offset/limit window over an ordered listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: usize,
    pub limit: usize,
}

impl Page {
    pub fn new(offset: usize, limit: usize) -> Self {
        Self { offset, limit }
    }
}

/// Resolves posts by id.
#[async_trait]
pub trait PostLookup: Send + Sync {
    async fn find_post(&self, post_id: PostId) -> Result<Option<Post>, StoreError>;
}

/// Durable policy and acceptance storage.
#[async_trait]
pub trait PolicyStore: Send + Sync {
    /// Policy attached to a post, if any.
    async fn policy_for_post(&self, post_id: PostId) -> Result<Option<Policy>, StoreError>;

    /// Authorized group ids of a policy.
    async fn group_ids(&self, policy_id: PolicyId) -> Result<Vec<GroupId>, StoreError>;

    /// True when the user belongs to at least one of `group_ids`.
    async fn is_user_in_any_group(
        &self,
        user_id: UserId,
        group_ids: &[GroupId],
    ) -> Result<bool, StoreError>;

    /// Records acceptance. Recording twice keeps a single record.
    async fn add_acceptance(&self, policy_id: PolicyId, user_id: UserId)
        -> Result<(), StoreError>;

    /// Drops acceptance. Dropping an absent record succeeds.
    async fn remove_acceptance(
        &self,
        policy_id: PolicyId,
        user_id: UserId,
    ) -> Result<(), StoreError>;

    /// Authorized-group members who have accepted, ordered by user id.
    async fn accepted_users(&self, policy_id: PolicyId, page: Page)
        -> Result<Vec<User>, StoreError>;

    /// Authorized-group members who have not accepted, ordered by user id.
    async fn not_accepted_users(
        &self,
        policy_id: PolicyId,
        page: Page,
    ) -> Result<Vec<User>, StoreError>;
}

#[derive(Debug, Default)]
struct MemoryState {
    users: BTreeMap<UserId, User>,
    members: HashMap<GroupId, BTreeSet<UserId>>,
    posts: HashMap<PostId, Post>,
    policies: HashMap<PostId, Policy>,
    policy_groups: HashMap<PolicyId, BTreeSet<GroupId>>,
    accepted: HashMap<PolicyId, BTreeSet<UserId>>,
    next_policy_id: i64,
}

impl MemoryState {
    /// Union of all authorized groups' members, in id order.
    fn authorized_members(&self, policy_id: PolicyId) -> BTreeSet<UserId> {
        self.policy_groups
            .get(&policy_id)
            .into_iter()
            .flatten()
            .filter_map(|group_id| self.members.get(group_id))
            .flatten()
            .copied()
            .collect()
    }

    fn page_of_members(
        &self,
        policy_id: PolicyId,
        page: Page,
        accepted: bool,
    ) -> Vec<User> {
        let accepted_set = self.accepted.get(&policy_id);
        let has_accepted =
            |id: &UserId| accepted_set.map(|set| set.contains(id)).unwrap_or(false);

        self.authorized_members(policy_id)
            .into_iter()
            .filter(|id| has_accepted(id) == accepted)
            .filter_map(|id| self.users.get(&id).cloned())
            .skip(page.offset)
            .take(page.limit)
            .collect()
    }
}

/// In-memory [`PolicyStore`] and [`PostLookup`].
///
/// Suitable for tests and for embedding where durability is not needed.
#[derive(Debug, Default)]
pub struct MemoryPolicyStore {
    state: RwLock<MemoryState>,
}

impl MemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, MemoryState>, StoreError> {
        self.state.read().map_err(|_| StoreError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, MemoryState>, StoreError> {
        self.state.write().map_err(|_| StoreError::Poisoned)
    }

    /// Inserts or replaces a user.
    pub fn put_user(&self, user: User) -> Result<(), StoreError> {
        self.write()?.users.insert(user.id, user);
        Ok(())
    }

    /// Adds a user to a group, creating the group if needed.
    pub fn add_member(&self, group_id: GroupId, user_id: UserId) -> Result<(), StoreError> {
        self.write()?
            .members
            .entry(group_id)
            .or_default()
            .insert(user_id);
        Ok(())
    }

    /// Inserts a post. The staff flag is derived from the author's record.
    pub fn put_post(&self, post_id: PostId, author_id: Option<UserId>) -> Result<(), StoreError> {
        let mut state = self.write()?;
        let authored_by_staff = author_id
            .and_then(|id| state.users.get(&id))
            .map(|user| user.staff)
            .unwrap_or(false);

        state.posts.insert(
            post_id,
            Post {
                id: post_id,
                author_id,
                authored_by_staff,
            },
        );
        Ok(())
    }

    /// Attaches a policy to a post, or replaces the groups of the existing one.
    pub fn attach_policy(
        &self,
        post_id: PostId,
        group_ids: &[GroupId],
    ) -> Result<PolicyId, StoreError> {
        let mut state = self.write()?;

        let existing = state.policies.get(&post_id).copied();
        let policy = match existing {
            Some(policy) => policy,
            None => {
                state.next_policy_id += 1;
                let policy = Policy {
                    id: PolicyId(state.next_policy_id),
                    post_id,
                };
                state.policies.insert(post_id, policy);
                policy
            }
        };

        state
            .policy_groups
            .insert(policy.id, group_ids.iter().copied().collect());
        Ok(policy.id)
    }
}

#[async_trait]
impl PostLookup for MemoryPolicyStore {
    async fn find_post(&self, post_id: PostId) -> Result<Option<Post>, StoreError> {
        Ok(self.read()?.posts.get(&post_id).cloned())
    }
}

#[async_trait]
impl PolicyStore for MemoryPolicyStore {
    async fn policy_for_post(&self, post_id: PostId) -> Result<Option<Policy>, StoreError> {
        Ok(self.read()?.policies.get(&post_id).copied())
    }

    async fn group_ids(&self, policy_id: PolicyId) -> Result<Vec<GroupId>, StoreError> {
        Ok(self
            .read()?
            .policy_groups
            .get(&policy_id)
            .map(|groups| groups.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn is_user_in_any_group(
        &self,
        user_id: UserId,
        group_ids: &[GroupId],
    ) -> Result<bool, StoreError> {
        let state = self.read()?;
        Ok(group_ids.iter().any(|group_id| {
            state
                .members
                .get(group_id)
                .map(|members| members.contains(&user_id))
                .unwrap_or(false)
        }))
    }

    async fn add_acceptance(
        &self,
        policy_id: PolicyId,
        user_id: UserId,
    ) -> Result<(), StoreError> {
        self.write()?
            .accepted
            .entry(policy_id)
            .or_default()
            .insert(user_id);
        Ok(())
    }

    async fn remove_acceptance(
        &self,
        policy_id: PolicyId,
        user_id: UserId,
    ) -> Result<(), StoreError> {
        if let Some(set) = self.write()?.accepted.get_mut(&policy_id) {
            set.remove(&user_id);
        }
        Ok(())
    }

    async fn accepted_users(
        &self,
        policy_id: PolicyId,
        page: Page,
    ) -> Result<Vec<User>, StoreError> {
        Ok(self.read()?.page_of_members(policy_id, page, true))
    }

    async fn not_accepted_users(
        &self,
        policy_id: PolicyId,
        page: Page,
    ) -> Result<Vec<User>, StoreError> {
        Ok(self.read()?.page_of_members(policy_id, page, false))
    }
}
