//! Accept/unaccept transitions and acceptance listings.
//!
//! Every method takes a [`GatePass`] and trusts it: nothing here re-checks
//! group membership or the feature switches.

use std::sync::Arc;

use crate::error::PolicyError;
use crate::gate::GatePass;
use crate::models::{User, UserId};
use crate::notify::{NotificationSink, PolicyEvent};
use crate::store::{Page, PolicyStore};

/// Default number of users returned per listing page.
pub const DEFAULT_PAGE_SIZE: usize = 25;

pub struct AcceptanceService {
    store: Arc<dyn PolicyStore>,
    sink: Arc<dyn NotificationSink>,
    page_size: usize,
}

impl AcceptanceService {
    pub fn new(
        store: Arc<dyn PolicyStore>,
        sink: Arc<dyn NotificationSink>,
        page_size: usize,
    ) -> Self {
        Self {
            store,
            sink,
            page_size,
        }
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Marks the policy as accepted by `user_id`. Repeating is harmless.
    pub async fn accept(&self, user_id: UserId, pass: &GatePass) -> Result<(), PolicyError> {
        self.store.add_acceptance(pass.policy.id, user_id).await?;

        tracing::info!(
            post_id = %pass.post.id,
            policy_id = %pass.policy.id,
            user_id = %user_id,
            "Policy accepted"
        );
        self.sink.publish(PolicyEvent::policy_change(pass.post.id));
        Ok(())
    }

    /// Withdraws acceptance. Withdrawing when never accepted succeeds.
    pub async fn unaccept(&self, user_id: UserId, pass: &GatePass) -> Result<(), PolicyError> {
        self.store.remove_acceptance(pass.policy.id, user_id).await?;

        tracing::info!(
            post_id = %pass.post.id,
            policy_id = %pass.policy.id,
            user_id = %user_id,
            "Policy unaccepted"
        );
        self.sink.publish(PolicyEvent::policy_change(pass.post.id));
        Ok(())
    }

    /// One page of group members who accepted, ascending by user id.
    pub async fn accepted(&self, pass: &GatePass, offset: usize) -> Result<Vec<User>, PolicyError> {
        let users = self
            .store
            .accepted_users(pass.policy.id, self.page(offset))
            .await?;
        Ok(users)
    }

    /// One page of group members who have not accepted, ascending by user id.
    pub async fn not_accepted(
        &self,
        pass: &GatePass,
        offset: usize,
    ) -> Result<Vec<User>, PolicyError> {
        let users = self
            .store
            .not_accepted_users(pass.policy.id, self.page(offset))
            .await?;
        Ok(users)
    }

    fn page(&self, offset: usize) -> Page {
        Page::new(offset, self.page_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gate::{Access, AuthorizationGate, GateConfig};
    use crate::models::{GroupId, PostId};
    use crate::store::MemoryPolicyStore;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingSink {
        events: Mutex<Vec<PolicyEvent>>,
    }

    impl RecordingSink {
        fn count(&self) -> usize {
            self.events.lock().unwrap().len()
        }
    }

    impl NotificationSink for RecordingSink {
        fn publish(&self, event: PolicyEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    const POST: PostId = PostId(1);

    struct Harness {
        gate: AuthorizationGate,
        service: AcceptanceService,
        sink: Arc<RecordingSink>,
    }

    impl Harness {
        /// Group 1 holds `members`; the post's policy applies to group 1.
        fn new(members: &[i64], page_size: usize) -> Self {
            let store = Arc::new(MemoryPolicyStore::new());
            store
                .put_user(User {
                    id: UserId(1000),
                    username: "admin".to_string(),
                    name: None,
                    staff: true,
                })
                .unwrap();
            for id in members {
                store
                    .put_user(User {
                        id: UserId(*id),
                        username: format!("member{}", id),
                        name: None,
                        staff: false,
                    })
                    .unwrap();
                store.add_member(GroupId(1), UserId(*id)).unwrap();
            }
            store.put_post(POST, Some(UserId(1000))).unwrap();
            store.attach_policy(POST, &[GroupId(1)]).unwrap();

            let sink = Arc::new(RecordingSink::default());
            let gate = AuthorizationGate::new(GateConfig::default(), store.clone(), store.clone());
            let service = AcceptanceService::new(store, sink.clone(), page_size);

            Self {
                gate,
                service,
                sink,
            }
        }

        async fn pass(&self, user: i64, access: Access) -> Result<GatePass, PolicyError> {
            self.gate.check(UserId(user), POST, access).await
        }

        async fn accept(&self, user: i64) -> Result<(), PolicyError> {
            let pass = self.pass(user, Access::Mutate).await?;
            self.service.accept(UserId(user), &pass).await
        }

        async fn unaccept(&self, user: i64) -> Result<(), PolicyError> {
            let pass = self.pass(user, Access::Mutate).await?;
            self.service.unaccept(UserId(user), &pass).await
        }

        async fn accepted(&self, offset: usize) -> Vec<i64> {
            let pass = self.pass(1000, Access::Read).await.unwrap();
            let users = self.service.accepted(&pass, offset).await.unwrap();
            users.iter().map(|u| u.id.get()).collect()
        }

        async fn not_accepted(&self, offset: usize) -> Vec<i64> {
            let pass = self.pass(1000, Access::Read).await.unwrap();
            let users = self.service.not_accepted(&pass, offset).await.unwrap();
            users.iter().map(|u| u.id.get()).collect()
        }
    }

    #[tokio::test]
    async fn test_accept_then_unaccept_round() {
        let h = Harness::new(&[1, 2], DEFAULT_PAGE_SIZE);

        h.accept(1).await.unwrap();
        assert_eq!(h.accepted(0).await, vec![1]);
        assert_eq!(h.not_accepted(0).await, vec![2]);

        h.unaccept(1).await.unwrap();
        assert!(h.accepted(0).await.is_empty());
        assert_eq!(h.not_accepted(0).await, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_accept_is_idempotent() {
        let h = Harness::new(&[1, 2], DEFAULT_PAGE_SIZE);

        h.accept(2).await.unwrap();
        h.accept(2).await.unwrap();

        assert_eq!(h.accepted(0).await, vec![2]);
        assert_eq!(h.not_accepted(0).await, vec![1]);
    }

    #[tokio::test]
    async fn test_unaccept_without_accept_is_noop() {
        let h = Harness::new(&[1], DEFAULT_PAGE_SIZE);

        h.unaccept(1).await.unwrap();

        assert!(h.accepted(0).await.is_empty());
        assert_eq!(h.not_accepted(0).await, vec![1]);
    }

    #[tokio::test]
    async fn test_every_mutation_notifies() {
        let h = Harness::new(&[1], DEFAULT_PAGE_SIZE);

        h.accept(1).await.unwrap();
        h.accept(1).await.unwrap();
        h.unaccept(1).await.unwrap();

        assert_eq!(h.sink.count(), 3);
        let events = h.sink.events.lock().unwrap();
        assert!(events.iter().all(|e| *e == PolicyEvent::policy_change(POST)));
    }

    #[tokio::test]
    async fn test_outsider_accept_rejected_and_state_unchanged() {
        let h = Harness::new(&[1, 2], DEFAULT_PAGE_SIZE);

        let err = h.accept(3).await.unwrap_err();
        assert!(matches!(err, PolicyError::UserNotInGroup));

        assert!(h.accepted(0).await.is_empty());
        assert_eq!(h.not_accepted(0).await, vec![1, 2]);
        assert_eq!(h.sink.count(), 0);
    }

    #[tokio::test]
    async fn test_partition_holds_for_all_members() {
        let members: Vec<i64> = (1..=9).collect();
        let h = Harness::new(&members, 100);

        for id in [2, 3, 5, 7] {
            h.accept(id).await.unwrap();
        }
        h.unaccept(3).await.unwrap();

        let accepted = h.accepted(0).await;
        let pending = h.not_accepted(0).await;

        for id in &members {
            let in_accepted = accepted.contains(id);
            let in_pending = pending.contains(id);
            assert!(in_accepted != in_pending, "user {} in both or neither", id);
        }
        assert_eq!(accepted, vec![2, 5, 7]);
    }

    #[tokio::test]
    async fn test_pagination_windows() {
        let members: Vec<i64> = (1..=7).collect();
        let h = Harness::new(&members, 3);

        assert_eq!(h.not_accepted(0).await, vec![1, 2, 3]);
        assert_eq!(h.not_accepted(3).await, vec![4, 5, 6]);
        assert_eq!(h.not_accepted(6).await, vec![7]);
        assert!(h.not_accepted(7).await.is_empty());
        assert!(h.not_accepted(500).await.is_empty());

        // Stable across repeated calls.
        assert_eq!(h.not_accepted(2).await, h.not_accepted(2).await);
    }

    #[tokio::test]
    async fn test_accepted_pagination_offset_past_end() {
        let h = Harness::new(&[1, 2], 1);
        h.accept(1).await.unwrap();
        h.accept(2).await.unwrap();

        assert_eq!(h.accepted(0).await, vec![1]);
        assert_eq!(h.accepted(1).await, vec![2]);
        assert!(h.accepted(2).await.is_empty());
    }

    #[tokio::test]
    async fn test_group_without_members_lists_empty() {
        let h = Harness::new(&[], DEFAULT_PAGE_SIZE);

        assert!(h.accepted(0).await.is_empty());
        assert!(h.not_accepted(0).await.is_empty());
    }
}
