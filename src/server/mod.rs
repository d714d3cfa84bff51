//! HTTP server for post policy acceptance.

pub mod auth;
pub mod hub;
pub mod routes;

pub use auth::{ApiKeyStore, AuthUser};
pub use hub::ChangeHub;
pub use routes::{build_router, ApiError, AppState};
