//! Shared state and wire types for the control surface.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::core_state::{ActiveBatch, CoreState};
use crate::pipeline::batch::{RunListing, RunSummary};

/// Shared context for all API routes.
#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        Self { core }
    }
}

// ═══════════════════════════════════════════════════════════
// Requests
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Deserialize)]
pub struct ProcessRequest {
    pub claim_numbers: Vec<u32>,
    #[serde(default)]
    pub enable_clinic_verification: bool,
}

#[derive(Debug, Deserialize)]
pub struct FacilityRequest {
    pub facility_name: String,
    #[serde(default)]
    pub location: Option<String>,
}

// ═══════════════════════════════════════════════════════════
// Responses
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
pub struct AvailableClaimsResponse {
    pub available_claims: Vec<u32>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct ProcessResponse {
    pub status: &'static str,
    pub summary: RunSummary,
    pub message: String,
    pub clinic_verification_used: bool,
}

#[derive(Debug, Serialize)]
pub struct RunsResponse {
    pub runs: Vec<RunListing>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct BatchStatusResponse {
    pub running: bool,
    pub batch: Option<ActiveBatch>,
}

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub cancelled: bool,
}
