//! In-process fan-out of policy change events.
//!
//! Connected clients subscribe to learn that a post's acceptance state
//! changed and should be refetched. Delivery is best effort.

use postpolicy_core::{NotificationSink, PolicyEvent};
use tokio::sync::broadcast;

/// Broadcasts [`PolicyEvent`]s to every subscriber.
pub struct ChangeHub {
    sender: broadcast::Sender<PolicyEvent>,
}

impl ChangeHub {
    /// Creates a hub whose subscribers may lag by up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PolicyEvent> {
        self.sender.subscribe()
    }
}

impl Default for ChangeHub {
    fn default() -> Self {
        Self::new(16)
    }
}

impl NotificationSink for ChangeHub {
    fn publish(&self, event: PolicyEvent) {
        match self.sender.send(event) {
            Ok(receivers) => tracing::debug!(
                post_id = %event.post_id,
                receivers,
                "Published policy change"
            ),
            // No subscribers
            Err(_) => tracing::debug!(post_id = %event.post_id, "No subscribers for policy change"),
        }
    }
}
