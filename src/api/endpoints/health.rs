//! Health check endpoint.

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::api::types::ApiContext;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub processor_initialized: bool,
    pub verification_available: bool,
    pub batch_running: bool,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
}

/// `GET /health`
pub async fn check(State(ctx): State<ApiContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        processor_initialized: true,
        verification_available: ctx.core.verification_available(),
        batch_running: ctx.core.active_batch().is_some(),
        version: crate::config::APP_VERSION,
        timestamp: Utc::now(),
    })
}
