//! Policy endpoints.
//!
//! - `GET /health`: health check (no auth required)
//! - `POST /policy/accept`, `POST /policy/unaccept`: body `{"post_id": N}`
//! - `GET /policy/accepted?post_id=N&offset=K`
//! - `GET /policy/not_accepted?post_id=N&offset=K`

use axum::{
    extract::{FromRequest, Query, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Form, Json, Router,
};
use postpolicy_core::{
    AcceptanceService, Access, AuthorizationGate, GatePass, NotificationSink, PolicyError, PostId,
    UserSummary,
};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use super::auth::{auth_middleware, ApiKeyStore, AuthUser};
use crate::config::Config;
use crate::db::{DirectoryRepository, PolicyRepository};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub api_keys: Arc<ApiKeyStore>,
    pub gate: Arc<AuthorizationGate>,
    pub service: Arc<AcceptanceService>,
}

impl AppState {
    /// Wires the SQLite repositories, gate and service together.
    pub fn new(pool: SqlitePool, config: &Config, sink: Arc<dyn NotificationSink>) -> Self {
        let directory = Arc::new(DirectoryRepository::new(pool.clone()));
        let policies = Arc::new(PolicyRepository::new(pool));

        let gate = AuthorizationGate::new(config.gate_config(), directory, policies.clone());
        let service = AcceptanceService::new(policies, sink, config.page_size);

        Self {
            api_keys: Arc::new(ApiKeyStore::from_entries(&config.api_keys)),
            gate: Arc::new(gate),
            service: Arc::new(service),
        }
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Error returned from policy handlers.
#[derive(Debug)]
pub enum ApiError {
    Policy(PolicyError),
    /// A required request parameter was absent.
    ParamMissing(&'static str),
}

impl From<PolicyError> for ApiError {
    fn from(e: PolicyError) -> Self {
        ApiError::Policy(e)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            ApiError::ParamMissing(name) => (
                StatusCode::BAD_REQUEST,
                "param_missing",
                format!("Missing required parameter: {}", name),
            ),
            ApiError::Policy(PolicyError::NotFound) => (
                StatusCode::NOT_FOUND,
                "not_found",
                "The requested resource could not be found".to_string(),
            ),
            ApiError::Policy(PolicyError::Store(e)) => {
                tracing::error!("Policy store failure: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "Internal server error".to_string(),
                )
            }
            ApiError::Policy(e) => (StatusCode::UNPROCESSABLE_ENTITY, e.code(), e.to_string()),
        };

        (status, Json(ErrorBody { error, message })).into_response()
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

/// Health check endpoint (no auth required)
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

#[derive(Debug, Deserialize)]
struct PostParams {
    post_id: Option<PostId>,
}

/// Accept/unaccept body, either JSON or form encoded.
struct PostBody(PostParams);

impl<S> FromRequest<S> for PostBody
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_form = request
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|h| h.to_str().ok())
            .map(|h| h.starts_with("application/x-www-form-urlencoded"))
            .unwrap_or(false);

        if is_form {
            let Form(params) = Form::<PostParams>::from_request(request, state)
                .await
                .map_err(IntoResponse::into_response)?;
            Ok(Self(params))
        } else {
            let Json(params) = Json::<PostParams>::from_request(request, state)
                .await
                .map_err(IntoResponse::into_response)?;
            Ok(Self(params))
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListParams {
    post_id: Option<PostId>,
    offset: Option<usize>,
}

#[derive(Serialize)]
struct SuccessResponse {
    success: bool,
}

#[derive(Serialize)]
struct UsersResponse {
    users: Vec<UserSummary>,
}

async fn pass_for(
    state: &AppState,
    user: AuthUser,
    post_id: Option<PostId>,
    access: Access,
) -> Result<GatePass, ApiError> {
    let post_id = post_id.ok_or(ApiError::ParamMissing("post_id"))?;
    Ok(state.gate.check(user.user_id, post_id, access).await?)
}

async fn accept(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    PostBody(params): PostBody,
) -> Result<Json<SuccessResponse>, ApiError> {
    let pass = pass_for(&state, user, params.post_id, Access::Mutate).await?;
    state.service.accept(user.user_id, &pass).await?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn unaccept(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    PostBody(params): PostBody,
) -> Result<Json<SuccessResponse>, ApiError> {
    let pass = pass_for(&state, user, params.post_id, Access::Mutate).await?;
    state.service.unaccept(user.user_id, &pass).await?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn accepted(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<ListParams>,
) -> Result<Json<UsersResponse>, ApiError> {
    let pass = pass_for(&state, user, params.post_id, Access::Read).await?;
    let users = state
        .service
        .accepted(&pass, params.offset.unwrap_or(0))
        .await?;
    Ok(Json(UsersResponse {
        users: users.iter().map(UserSummary::from).collect(),
    }))
}

async fn not_accepted(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<ListParams>,
) -> Result<Json<UsersResponse>, ApiError> {
    let pass = pass_for(&state, user, params.post_id, Access::Read).await?;
    let users = state
        .service
        .not_accepted(&pass, params.offset.unwrap_or(0))
        .await?;
    Ok(Json(UsersResponse {
        users: users.iter().map(UserSummary::from).collect(),
    }))
}

// ============================================================================
// Router
// ============================================================================

/// Answers 404 for every policy route while the feature is switched off.
///
/// Runs before authentication and body parsing so a disabled feature is
/// indistinguishable from a missing route.
async fn feature_switch(State(enabled): State<bool>, request: Request, next: Next) -> Response {
    if !enabled {
        return ApiError::Policy(PolicyError::NotFound).into_response();
    }
    next.run(request).await
}

pub fn build_router(state: AppState) -> Router {
    // Public routes (no auth)
    let public_routes = Router::new().route("/health", get(health));

    // Protected routes (auth required)
    let protected_routes = Router::new()
        .route("/policy/accept", post(accept))
        .route("/policy/unaccept", post(unaccept))
        .route("/policy/accepted", get(accepted))
        .route("/policy/not_accepted", get(not_accepted))
        .layer(middleware::from_fn_with_state(
            state.api_keys.clone(),
            auth_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.gate.config().enabled,
            feature_switch,
        ));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
