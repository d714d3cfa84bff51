//! Error types for policy operations.

use thiserror::Error;

/// Failure inside a storage backend.
///
/// Not a business error: callers treat it as an infrastructure fault.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Storage backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("Storage lock poisoned")]
    Poisoned,
}

impl StoreError {
    /// Wraps any backend error.
    pub fn backend<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        StoreError::Backend(Box::new(err))
    }
}

/// Reasons a policy request is rejected.
///
/// All variants except [`PolicyError::Store`] are request-local and
/// non-retryable.
#[derive(Error, Debug)]
pub enum PolicyError {
    /// Feature disabled or post missing. Both look the same to the caller.
    #[error("Not found")]
    NotFound,

    #[error("This post has no policy")]
    NoPolicyConfigured,

    #[error("No group is configured for this policy")]
    GroupNotFound,

    #[error("Policies can only be used on posts made by staff")]
    StaffOnly,

    #[error("You are not a member of any group this policy applies to")]
    UserNotInGroup,

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl PolicyError {
    /// Stable machine-readable code for the error.
    pub fn code(&self) -> &'static str {
        match self {
            PolicyError::NotFound => "not_found",
            PolicyError::NoPolicyConfigured => "no_policy",
            PolicyError::GroupNotFound => "group_not_found",
            PolicyError::StaffOnly => "staff_only",
            PolicyError::UserNotInGroup => "user_missing",
            PolicyError::Store(_) => "store_error",
        }
    }
}
