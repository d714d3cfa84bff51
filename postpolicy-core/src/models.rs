//! Domain types: users, groups, posts and the policies attached to them.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(id: i64) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_type!(
    /// Stable user identifier. Listings are ordered by this value.
    UserId
);
id_type!(
    /// Identifier of an authorization group.
    GroupId
);
id_type!(
    /// Identifier of a post (the document a policy is attached to).
    PostId
);
id_type!(
    /// Identifier of a policy.
    PolicyId
);

/// A registered user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    /// Optional display name.
    pub name: Option<String>,
    /// Elevated privilege (admin or moderator).
    pub staff: bool,
}

/// A post as seen by the policy layer.
///
/// Posts are owned elsewhere; only the fields needed for gating are carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Post {
    pub id: PostId,
    /// `None` when the author account no longer exists.
    pub author_id: Option<UserId>,
    /// Whether the author carries the staff flag.
    pub authored_by_staff: bool,
}

/// The policy attached to a post. At most one per post.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Policy {
    pub id: PolicyId,
    pub post_id: PostId,
}

/// Public user fields returned from listings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: UserId,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            name: user.name.clone(),
        }
    }
}
