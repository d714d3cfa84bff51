//! Post Policy Core Library
//!
//! Acceptance tracking for policies attached to posts: which members of a
//! policy's groups have accepted it, and who may change that.

pub mod error;
pub mod gate;
pub mod models;
pub mod notify;
pub mod service;
pub mod store;

pub use error::{PolicyError, StoreError};
pub use gate::{Access, AuthorizationGate, GateConfig, GatePass};
pub use models::{GroupId, Policy, PolicyId, Post, PostId, User, UserId, UserSummary};
pub use notify::{ChangeKind, NotificationSink, NullSink, PolicyEvent};
pub use service::{AcceptanceService, DEFAULT_PAGE_SIZE};
pub use store::{MemoryPolicyStore, Page, PolicyStore, PostLookup};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!version().is_empty());
    }
}
