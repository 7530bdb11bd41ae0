pub mod health;

use axum::{
    http::HeaderMap,
    routing::{get, post},
    Router,
};

use crate::errors::AppError;
use crate::models::OwnerId;
use crate::state::AppState;
use crate::{backends, engine};

/// Set by the identity layer in front of this service.
pub const OWNER_HEADER: &str = "x-user-id";

/// Reads the opaque owner id from the request headers.
pub fn owner_from(headers: &HeaderMap) -> Result<OwnerId, AppError> {
    headers
        .get(OWNER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(OwnerId::new)
        .ok_or(AppError::Unauthorized)
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health::health_handler))
        .route(
            "/api/v1/backends",
            get(backends::handlers::handle_list_backends),
        )
        .route(
            "/api/v1/customizations",
            post(engine::handlers::handle_submit),
        )
        .route(
            "/api/v1/customizations/:run_id",
            get(engine::handlers::handle_status).delete(engine::handlers::handle_cancel),
        )
        .route("/api/v1/artifact", get(engine::handlers::handle_fetch_artifact))
        .route(
            "/api/v1/artifact/promote",
            post(engine::handlers::handle_promote),
        )
        .with_state(state)
}
