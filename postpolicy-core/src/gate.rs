//! Precondition checks run before every policy request.
//!
//! Checks run in a fixed order and the first failure wins:
//!
//! 1. feature enabled, else [`PolicyError::NotFound`]
//! 2. post exists, else [`PolicyError::NotFound`]
//! 3. post has a policy, else [`PolicyError::NoPolicyConfigured`]
//! 4. policy has groups, else [`PolicyError::GroupNotFound`]
//! 5. staff-only mode satisfied, else [`PolicyError::StaffOnly`]
//! 6. (mutations only) user in a policy group, else [`PolicyError::UserNotInGroup`]

use std::sync::Arc;

use crate::error::PolicyError;
use crate::models::{GroupId, Policy, Post, PostId, UserId};
use crate::store::{PolicyStore, PostLookup};

/// Site-wide switches consulted by the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateConfig {
    /// Master switch for the feature.
    pub enabled: bool,
    /// Only posts authored by staff may carry a usable policy.
    pub restrict_to_staff_posts: bool,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            restrict_to_staff_posts: false,
        }
    }
}

/// What the caller wants to do with the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    /// List accepted / not accepted users.
    Read,
    /// Accept or unaccept.
    Mutate,
}

/// Resolved request context handed to the acceptance service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatePass {
    pub post: Post,
    pub policy: Policy,
    /// Never empty.
    pub group_ids: Vec<GroupId>,
}

pub struct AuthorizationGate {
    config: GateConfig,
    posts: Arc<dyn PostLookup>,
    store: Arc<dyn PolicyStore>,
}

impl AuthorizationGate {
    pub fn new(config: GateConfig, posts: Arc<dyn PostLookup>, store: Arc<dyn PolicyStore>) -> Self {
        Self {
            config,
            posts,
            store,
        }
    }

    pub fn config(&self) -> GateConfig {
        self.config
    }

    /// Runs the checks for `user_id` acting on `post_id`.
    pub async fn check(
        &self,
        user_id: UserId,
        post_id: PostId,
        access: Access,
    ) -> Result<GatePass, PolicyError> {
        let result = self.evaluate(user_id, post_id, access).await;

        if let Err(e) = &result {
            tracing::debug!(
                post_id = %post_id,
                user_id = %user_id,
                ?access,
                reason = e.code(),
                "Policy request rejected"
            );
        }

        result
    }

    async fn evaluate(
        &self,
        user_id: UserId,
        post_id: PostId,
        access: Access,
    ) -> Result<GatePass, PolicyError> {
        if !self.config.enabled {
            return Err(PolicyError::NotFound);
        }

        let post = self
            .posts
            .find_post(post_id)
            .await?
            .ok_or(PolicyError::NotFound)?;

        let policy = self
            .store
            .policy_for_post(post.id)
            .await?
            .ok_or(PolicyError::NoPolicyConfigured)?;

        let group_ids = self.store.group_ids(policy.id).await?;
        if group_ids.is_empty() {
            return Err(PolicyError::GroupNotFound);
        }

        if self.config.restrict_to_staff_posts && !post.authored_by_staff {
            return Err(PolicyError::StaffOnly);
        }

        if access == Access::Mutate
            && !self.store.is_user_in_any_group(user_id, &group_ids).await?
        {
            return Err(PolicyError::UserNotInGroup);
        }

        Ok(GatePass {
            post,
            policy,
            group_ids,
        })
    }
}
