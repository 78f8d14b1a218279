//! Direct facility lookup.

use axum::extract::State;
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::{ApiContext, FacilityRequest};
use crate::pipeline::search::FacilityVerification;

/// `POST /api/facilities/verify`
pub async fn verify(
    State(ctx): State<ApiContext>,
    Json(request): Json<FacilityRequest>,
) -> Result<Json<FacilityVerification>, ApiError> {
    let name = request.facility_name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::BadRequest("facility_name must not be empty".into()));
    }

    let core = ctx.core.clone();
    let verdict = tokio::task::spawn_blocking(move || core.verify_facility(&name, request.location.as_deref())).await?;
    Ok(Json(verdict))
}
