use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use crate::backends::{BackendDescriptor, BackendKind};
use crate::errors::AppError;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct BackendsQuery {
    pub kind: Option<BackendKind>,
}

/// GET /api/v1/backends?kind=generation|render
/// Without `kind`, generation backends are listed first, then render backends in
/// fallback order.
pub async fn handle_list_backends(
    State(state): State<AppState>,
    Query(params): Query<BackendsQuery>,
) -> Result<Json<Vec<BackendDescriptor>>, AppError> {
    let kinds = match params.kind {
        Some(kind) => vec![kind],
        None => vec![BackendKind::Generation, BackendKind::Render],
    };
    let backends = kinds
        .into_iter()
        .flat_map(|kind| state.engine.list_backends(kind).iter().cloned())
        .collect();
    Ok(Json(backends))
}
