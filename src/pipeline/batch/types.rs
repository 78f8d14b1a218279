use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pipeline::bundle::Document;
use crate::pipeline::decision::{Decision, DecisionKind, ExpectedAnswer, MatchOutcome};
use crate::pipeline::extraction::NamedImageMetadata;

// ═══════════════════════════════════════════
// Per-claim records
// ═══════════════════════════════════════════

/// Claim inputs echoed into the result for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimData {
    pub description: String,
    pub documents: Vec<Document>,
}

/// Full outcome of one processed claim, persisted as `claim_<n>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimResult {
    pub claim_number: u32,
    pub timestamp: DateTime<Utc>,
    pub claim_data: ClaimData,
    pub image_metadata: Vec<NamedImageMetadata>,
    pub llm_decision: Decision,
    pub expected_answer: Option<ExpectedAnswer>,
    pub matches_expected: Option<MatchOutcome>,
}

/// A claim that could not be processed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimError {
    pub claim_number: u32,
    pub error: String,
    pub timestamp: DateTime<Utc>,
}

impl ClaimError {
    pub fn new(claim_number: u32, error: impl Into<String>) -> Self {
        Self {
            claim_number,
            error: error.into(),
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BatchItem {
    Completed(Box<ClaimResult>),
    Failed(ClaimError),
}

impl BatchItem {
    pub fn claim_number(&self) -> u32 {
        match self {
            Self::Completed(result) => result.claim_number,
            Self::Failed(error) => error.claim_number,
        }
    }
}

// ═══════════════════════════════════════════
// Run statistics
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub total_claims: u32,
    pub approved: u32,
    pub denied: u32,
    pub uncertain: u32,
    pub exact_matches: u32,
    pub acceptable_matches: u32,
    pub mismatches: u32,
    #[serde(default)]
    pub failed: u32,
    pub accuracy: f64,
}

impl Stats {
    pub fn new(total_claims: u32) -> Self {
        Self {
            total_claims,
            ..Self::default()
        }
    }

    /// Fold one batch item into the counters and refresh accuracy.
    pub fn record(&mut self, item: &BatchItem) {
        match item {
            BatchItem::Completed(result) => {
                match result.llm_decision.decision {
                    DecisionKind::Approve => self.approved += 1,
                    DecisionKind::Deny => self.denied += 1,
                    DecisionKind::Uncertain => self.uncertain += 1,
                }
                if let Some(outcome) = &result.matches_expected {
                    if outcome.exact_match {
                        self.exact_matches += 1;
                    } else if outcome.acceptable_match {
                        self.acceptable_matches += 1;
                    } else {
                        self.mismatches += 1;
                    }
                }
            }
            BatchItem::Failed(_) => self.failed += 1,
        }
        self.accuracy = self.compute_accuracy();
    }

    /// (exact + acceptable) / (exact + acceptable + mismatches); 0 when nothing was compared.
    pub fn compute_accuracy(&self) -> f64 {
        let matched = self.exact_matches + self.acceptable_matches;
        let compared = matched + self.mismatches;
        if compared == 0 {
            0.0
        } else {
            f64::from(matched) / f64::from(compared)
        }
    }
}

// ═══════════════════════════════════════════
// Run summary
// ═══════════════════════════════════════════

/// Persisted once per run as `summary.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    #[serde(default)]
    pub run_id: String,
    pub run_timestamp: DateTime<Utc>,
    /// Requested claim ids in input order, including any never attempted
    /// because the run was cancelled.
    pub claims_processed: Vec<u32>,
    #[serde(rename = "clinic_verification_enabled", default)]
    pub verification_enabled: bool,
    #[serde(default)]
    pub cancelled: bool,
    pub statistics: Stats,
    pub results: Vec<BatchItem>,
}

/// One entry of the past-runs listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunListing {
    pub run_id: String,
    pub timestamp: DateTime<Utc>,
    pub claims_count: u32,
    pub accuracy: f64,
    pub statistics: Stats,
}

// ═══════════════════════════════════════════
// Progress events
// ═══════════════════════════════════════════

/// Emitted by the runner as a batch advances.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BatchEvent {
    Started {
        run_id: String,
        total: u32,
    },
    ClaimStarted {
        claim_number: u32,
        index: u32,
        total: u32,
    },
    ClaimCompleted {
        claim_number: u32,
        decision: DecisionKind,
    },
    ClaimFailed {
        claim_number: u32,
        error: String,
    },
    Pacing {
        seconds: u64,
    },
    Cancelled {
        attempted: u32,
    },
    Completed {
        run_id: String,
        accuracy: f64,
        duration_ms: u64,
    },
}
