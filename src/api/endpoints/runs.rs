//! Persisted run endpoints.

use axum::extract::{Path, State};
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::pipeline::batch::RunSummary;

/// `GET /api/results/:run_id`
pub async fn detail(State(ctx): State<ApiContext>, Path(run_id): Path<String>) -> Result<Json<RunSummary>, ApiError> {
    Ok(Json(ctx.core.store().load_summary(&run_id)?))
}
