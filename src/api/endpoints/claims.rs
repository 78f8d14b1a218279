//! Claim bundle and batch endpoints.

use axum::extract::{Path, State};
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::{
    ApiContext, AvailableClaimsResponse, BatchStatusResponse, CancelResponse, ProcessRequest, ProcessResponse,
    RunsResponse,
};
use crate::pipeline::batch::ClaimResult;
use crate::pipeline::bundle::ClaimPreview;

/// `GET /api/claims/available`
pub async fn available(State(ctx): State<ApiContext>) -> Json<AvailableClaimsResponse> {
    let available_claims = ctx.core.loader().available_claims();
    Json(AvailableClaimsResponse {
        total: available_claims.len(),
        available_claims,
    })
}

/// `GET /api/claims/:id/preview`
pub async fn preview(State(ctx): State<ApiContext>, Path(id): Path<u32>) -> Result<Json<ClaimPreview>, ApiError> {
    Ok(Json(ctx.core.loader().preview(id)?))
}

/// `POST /api/claims/process`
///
/// Runs the whole batch before responding.
pub async fn process(
    State(ctx): State<ApiContext>,
    Json(request): Json<ProcessRequest>,
) -> Result<Json<ProcessResponse>, ApiError> {
    if request.claim_numbers.is_empty() {
        return Err(ApiError::BadRequest("No claims specified".into()));
    }

    tracing::info!(
        claims = ?request.claim_numbers,
        verification = request.enable_clinic_verification,
        "Batch requested"
    );

    let core = ctx.core.clone();
    let requested = request.claim_numbers.len();
    let summary = tokio::task::spawn_blocking(move || {
        core.run_batch(&request.claim_numbers, request.enable_clinic_verification)
    })
    .await??;

    let message = if summary.cancelled {
        format!("Cancelled after {} of {requested} claims", summary.results.len())
    } else {
        format!("Successfully processed {requested} claims")
    };

    Ok(Json(ProcessResponse {
        status: if summary.cancelled { "cancelled" } else { "completed" },
        clinic_verification_used: summary.verification_enabled,
        message,
        summary,
    }))
}

/// `GET /api/claims/status`
pub async fn status(State(ctx): State<ApiContext>) -> Json<BatchStatusResponse> {
    let batch = ctx.core.active_batch();
    Json(BatchStatusResponse {
        running: batch.is_some(),
        batch,
    })
}

/// `POST /api/claims/cancel`
pub async fn cancel(State(ctx): State<ApiContext>) -> Result<Json<CancelResponse>, ApiError> {
    let cancelled = ctx.core.cancel_batch()?;
    Ok(Json(CancelResponse { cancelled }))
}

/// `GET /api/claims/:id`: decision from the most recent run containing the claim.
pub async fn latest(State(ctx): State<ApiContext>, Path(id): Path<u32>) -> Result<Json<ClaimResult>, ApiError> {
    ctx.core
        .store()
        .latest_claim_result(id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("Claim {id} not found in results")))
}

/// `GET /api/claims`: every persisted run, newest first.
pub async fn list_runs(State(ctx): State<ApiContext>) -> Result<Json<RunsResponse>, ApiError> {
    let runs = ctx.core.store().list_runs()?;
    let message = runs.is_empty().then_some("No processed claims found");
    Ok(Json(RunsResponse { runs, message }))
}
