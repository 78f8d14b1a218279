//! BatchRunner: processes claims one at a time, persists every result as it
//! lands, paces calls to the generation service and folds everything into a
//! run summary.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{Local, Utc};

use super::error::BatchError;
use super::store::RunStore;
use super::traits::ClaimPipeline;
use super::types::*;
use crate::pipeline::decision::VerificationConfig;

/// Sleep granularity while pacing, so cancellation is noticed promptly.
const SLEEP_GRANULARITY: Duration = Duration::from_millis(250);

/// Cooperative cancellation flag shared between the runner and its caller.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop after the claim in flight. Already persisted artifacts are kept.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Sleep for `total`, waking early if cancelled. Returns `false` when cancelled.
fn pause(total: Duration, cancel: &CancellationToken) -> bool {
    let deadline = Instant::now() + total;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep(SLEEP_GRANULARITY.min(deadline - now));
    }
}

pub struct BatchRunner {
    pipeline: Arc<dyn ClaimPipeline>,
    store: RunStore,
    pacing: Duration,
}

impl BatchRunner {
    pub fn new(pipeline: Arc<dyn ClaimPipeline>, store: RunStore, pacing: Duration) -> Self {
        Self {
            pipeline,
            store,
            pacing,
        }
    }

    pub fn store(&self) -> &RunStore {
        &self.store
    }

    /// Process `claim_ids` in the given order.
    ///
    /// A failing claim is recorded and the run continues. Only run-directory
    /// creation and the final summary write can fail the run.
    pub fn run(
        &self,
        claim_ids: &[u32],
        verification: &VerificationConfig,
        cancel: &CancellationToken,
        progress_fn: Option<&dyn Fn(BatchEvent)>,
    ) -> Result<RunSummary, BatchError> {
        if claim_ids.is_empty() {
            return Err(BatchError::NoClaims);
        }

        let start = Instant::now();
        let run_timestamp = Utc::now();
        let run = self
            .store
            .create_run(Local::now(), claim_ids.len())
            .map_err(BatchError::RunDirectory)?;

        let total = claim_ids.len() as u32;
        let emit = |event: BatchEvent| {
            if let Some(progress) = progress_fn {
                progress(event);
            }
        };

        tracing::info!(
            run_id = %run.run_id,
            claims = total,
            verification = verification.enabled(),
            "Batch started"
        );
        emit(BatchEvent::Started {
            run_id: run.run_id.clone(),
            total,
        });

        let mut stats = Stats::new(total);
        let mut results = Vec::with_capacity(claim_ids.len());
        let mut cancelled = false;

        for (i, &claim_id) in claim_ids.iter().enumerate() {
            if cancel.is_cancelled() {
                cancelled = true;
                break;
            }

            emit(BatchEvent::ClaimStarted {
                claim_number: claim_id,
                index: i as u32,
                total,
            });

            let item = match self.pipeline.process(claim_id, verification) {
                Ok(result) => match self.store.write_claim(&run, &result) {
                    Ok(_) => BatchItem::Completed(Box::new(result)),
                    Err(e) => BatchItem::Failed(ClaimError::new(
                        claim_id,
                        format!("Failed to save claim result: {e}"),
                    )),
                },
                Err(e) => BatchItem::Failed(ClaimError::new(claim_id, e.to_string())),
            };

            match &item {
                BatchItem::Completed(result) => {
                    tracing::info!(
                        claim = claim_id,
                        decision = %result.llm_decision.decision,
                        "Claim processed"
                    );
                    emit(BatchEvent::ClaimCompleted {
                        claim_number: claim_id,
                        decision: result.llm_decision.decision,
                    });
                }
                BatchItem::Failed(failure) => {
                    tracing::error!(claim = claim_id, error = %failure.error, "Claim failed");
                    emit(BatchEvent::ClaimFailed {
                        claim_number: claim_id,
                        error: failure.error.clone(),
                    });
                }
            }

            stats.record(&item);
            results.push(item);

            if i + 1 < claim_ids.len() {
                tracing::info!(seconds = self.pacing.as_secs(), "Pacing before next claim");
                emit(BatchEvent::Pacing {
                    seconds: self.pacing.as_secs(),
                });
                if !pause(self.pacing, cancel) {
                    cancelled = true;
                    break;
                }
            }
        }

        if cancelled {
            tracing::warn!(attempted = results.len(), "Batch cancelled");
            emit(BatchEvent::Cancelled {
                attempted: results.len() as u32,
            });
        }

        let summary = RunSummary {
            run_id: run.run_id.clone(),
            run_timestamp,
            claims_processed: claim_ids.to_vec(),
            verification_enabled: verification.enabled(),
            cancelled,
            statistics: stats,
            results,
        };
        self.store
            .write_summary(&run, &summary)
            .map_err(BatchError::Summary)?;

        let duration_ms = start.elapsed().as_millis() as u64;
        tracing::info!(
            run_id = %run.run_id,
            processed = summary.results.len(),
            failed = summary.statistics.failed,
            accuracy = summary.statistics.accuracy,
            duration_ms,
            "Batch completed"
        );
        emit(BatchEvent::Completed {
            run_id: run.run_id,
            accuracy: summary.statistics.accuracy,
            duration_ms,
        });

        Ok(summary)
    }
}
