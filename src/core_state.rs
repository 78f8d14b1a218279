//! Shared application state behind the HTTP control surface.
//!
//! `CoreState` owns the claim loader, the batch runner (which owns the run
//! store) and the optional search backend. Batches are exclusive: a second
//! request while one is running is rejected rather than queued, and the
//! in-flight batch can be observed and cancelled.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::AppConfig;
use crate::pipeline::batch::{BatchError, BatchEvent, BatchRunner, CancellationToken, RunStore, RunSummary};
use crate::pipeline::bundle::ClaimBundleLoader;
use crate::pipeline::decision::{DecisionEngine, VerificationConfig};
use crate::pipeline::extraction::{build_engine, ExtractionError, ImageMetadataExtractor, OcrAdapter};
use crate::pipeline::llm::{GeminiClient, GenerationError};
use crate::pipeline::processor::ClaimProcessor;
use crate::pipeline::prompt::PromptComposer;
use crate::pipeline::search::{verify_facility, FacilityVerification, GoogleCustomSearch, SearchOutcome, WebSearch};

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// Snapshot of the batch currently running.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActiveBatch {
    pub run_id: Option<String>,
    pub total: u32,
    pub attempted: u32,
    pub current_claim: Option<u32>,
    pub verification_enabled: bool,
    pub cancel_requested: bool,
    pub started_at: DateTime<Utc>,
}

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("A batch is already running")]
    BatchInProgress,
    #[error("Internal lock error")]
    LockPoisoned,
    #[error(transparent)]
    Batch(#[from] BatchError),
    #[error("Generation client setup failed: {0}")]
    GenerationClient(#[from] GenerationError),
    #[error("OCR engine setup failed: {0}")]
    Ocr(#[from] ExtractionError),
    #[error("Search client setup failed: {0}")]
    SearchClient(#[from] reqwest::Error),
    #[error("Failed to read system prompt {path}: {source}")]
    SystemPrompt {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

struct ActiveState {
    snapshot: ActiveBatch,
    cancel: CancellationToken,
}

// ═══════════════════════════════════════════════════════════
// CoreState
// ═══════════════════════════════════════════════════════════

pub struct CoreState {
    loader: ClaimBundleLoader,
    runner: BatchRunner,
    search: Option<Arc<dyn WebSearch>>,
    /// Held for the whole duration of a batch.
    batch_lock: Mutex<()>,
    active: Mutex<Option<ActiveState>>,
}

impl CoreState {
    pub fn new(loader: ClaimBundleLoader, runner: BatchRunner, search: Option<Arc<dyn WebSearch>>) -> Self {
        Self {
            loader,
            runner,
            search,
            batch_lock: Mutex::new(()),
            active: Mutex::new(None),
        }
    }

    /// Wire the production pipeline from configuration.
    ///
    /// Builds blocking HTTP clients, so it must run outside the async runtime.
    pub fn from_config(config: &AppConfig) -> Result<Self, CoreError> {
        let client = Arc::new(GeminiClient::new(&config.api_base_url, &config.google_api_key)?);

        let composer = match &config.system_prompt_file {
            Some(path) => PromptComposer::from_file(path).map_err(|source| CoreError::SystemPrompt {
                path: path.clone(),
                source,
            })?,
            None => PromptComposer::default(),
        };

        let search: Option<Arc<dyn WebSearch>> = match &config.search {
            Some(creds) => Some(Arc::new(GoogleCustomSearch::new(
                &creds.api_key,
                &creds.engine_id,
                config.search_timeout,
            )?)),
            None => {
                tracing::info!("Google Search credentials not set, clinic verification unavailable");
                None
            }
        };

        let loader = ClaimBundleLoader::new(&config.claims_dir, config.max_claim_id);
        let ocr = OcrAdapter::new(build_engine(&config.tesseract_bin, config.tessdata_dir.as_deref())?);
        let extractor = ImageMetadataExtractor::new(client.clone(), &config.model_name, config.vision_timeout, ocr);
        let engine = DecisionEngine::new(
            client,
            &config.model_name,
            composer,
            config.decision_timeout,
            config.verification_timeout,
        );
        let processor = ClaimProcessor::new(loader.clone(), extractor, engine);
        let runner = BatchRunner::new(
            Arc::new(processor),
            RunStore::new(&config.results_dir),
            config.pacing,
        );

        tracing::info!(
            model = %config.model_name,
            claims_dir = %config.claims_dir.display(),
            results_dir = %config.results_dir.display(),
            pacing_secs = config.pacing.as_secs(),
            "Claim processor initialized"
        );

        Ok(Self::new(loader, runner, search))
    }

    pub fn loader(&self) -> &ClaimBundleLoader {
        &self.loader
    }

    pub fn store(&self) -> &RunStore {
        self.runner.store()
    }

    pub fn verification_available(&self) -> bool {
        self.search.as_ref().is_some_and(|s| s.is_configured())
    }

    /// Run one batch to completion on the calling thread.
    ///
    /// Fails with `BatchInProgress` instead of waiting if another batch holds
    /// the lock.
    pub fn run_batch(&self, claim_ids: &[u32], requested_verification: bool) -> Result<RunSummary, CoreError> {
        if claim_ids.is_empty() {
            return Err(BatchError::NoClaims.into());
        }
        let _guard = self.batch_lock.try_lock().map_err(|e| match e {
            std::sync::TryLockError::WouldBlock => CoreError::BatchInProgress,
            std::sync::TryLockError::Poisoned(_) => CoreError::LockPoisoned,
        })?;

        let verification = VerificationConfig::resolve(requested_verification, self.search.clone());
        let cancel = CancellationToken::new();
        *self.lock_active()? = Some(ActiveState {
            snapshot: ActiveBatch {
                run_id: None,
                total: claim_ids.len() as u32,
                attempted: 0,
                current_claim: None,
                verification_enabled: verification.enabled(),
                cancel_requested: false,
                started_at: Utc::now(),
            },
            cancel: cancel.clone(),
        });

        let progress = |event: BatchEvent| self.observe(&event);
        let result = self.runner.run(claim_ids, &verification, &cancel, Some(&progress));

        *self.lock_active()? = None;
        Ok(result?)
    }

    /// Request cancellation of the running batch. Returns `false` when idle.
    pub fn cancel_batch(&self) -> Result<bool, CoreError> {
        let mut active = self.lock_active()?;
        match active.as_mut() {
            Some(state) => {
                state.cancel.cancel();
                state.snapshot.cancel_requested = true;
                tracing::info!(run_id = ?state.snapshot.run_id, "Batch cancellation requested");
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// What batch is running right now, if any.
    pub fn active_batch(&self) -> Option<ActiveBatch> {
        self.active
            .lock()
            .ok()?
            .as_ref()
            .map(|state| state.snapshot.clone())
    }

    /// Direct facility lookup through the custom search backend.
    pub fn verify_facility(&self, facility_name: &str, location: Option<&str>) -> FacilityVerification {
        match &self.search {
            Some(search) => verify_facility(search.as_ref(), facility_name, location),
            None => verify_facility(&Unconfigured, facility_name, location),
        }
    }

    fn observe(&self, event: &BatchEvent) {
        tracing::debug!(?event, "Batch progress");
        let Ok(mut active) = self.active.lock() else {
            return;
        };
        let Some(state) = active.as_mut() else {
            return;
        };
        let snapshot = &mut state.snapshot;
        match event {
            BatchEvent::Started { run_id, .. } => snapshot.run_id = Some(run_id.clone()),
            BatchEvent::ClaimStarted { claim_number, .. } => snapshot.current_claim = Some(*claim_number),
            BatchEvent::ClaimCompleted { .. } | BatchEvent::ClaimFailed { .. } => {
                snapshot.attempted += 1;
                snapshot.current_claim = None;
            }
            BatchEvent::Pacing { .. } | BatchEvent::Cancelled { .. } | BatchEvent::Completed { .. } => {}
        }
    }

    fn lock_active(&self) -> Result<MutexGuard<'_, Option<ActiveState>>, CoreError> {
        self.active.lock().map_err(|_| CoreError::LockPoisoned)
    }
}

/// Stand-in backend when no search credentials are configured.
struct Unconfigured;

impl WebSearch for Unconfigured {
    fn is_configured(&self) -> bool {
        false
    }

    fn search(&self, _query: &str, _num_results: usize) -> SearchOutcome {
        SearchOutcome::NotConfigured
    }
}
