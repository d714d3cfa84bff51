//! Change notifications emitted after acceptance state mutates.

use serde::Serialize;

use crate::models::PostId;

/// Kind of change published for a post.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    PolicyChange,
}

/// Event handed to a [`NotificationSink`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PolicyEvent {
    pub post_id: PostId,
    pub kind: ChangeKind,
}

impl PolicyEvent {
    pub fn policy_change(post_id: PostId) -> Self {
        Self {
            post_id,
            kind: ChangeKind::PolicyChange,
        }
    }
}

/// One-way event emission.
///
/// Implementations must not block and must swallow their own delivery
/// failures; the mutation has already happened when `publish` is called.
pub trait NotificationSink: Send + Sync {
    fn publish(&self, event: PolicyEvent);
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn publish(&self, _event: PolicyEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_kind_snake_case() {
        let event = PolicyEvent::policy_change(PostId(9));
        let json = serde_json::to_value(event).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"post_id": 9, "kind": "policy_change"})
        );
    }
}
