use std::sync::Arc;
use std::time::Duration;

use super::grounding::build_records;
use super::parser::parse_decision;
use super::types::Decision;
use super::DecisionError;
use crate::pipeline::bundle::ImageRef;
use crate::pipeline::llm::{GenerationClient, GenerationRequest, InlineImage};
use crate::pipeline::prompt::PromptComposer;
use crate::pipeline::search::WebSearch;

const DECISION_TEMPERATURE: f32 = 0.3;
const DECISION_MAX_OUTPUT_TOKENS: u32 = 4096;

/// Whether the grounded verification stage runs. Fixed for a whole batch.
#[derive(Clone, Default)]
pub struct VerificationConfig {
    enabled: bool,
    search: Option<Arc<dyn WebSearch>>,
}

impl VerificationConfig {
    pub fn disabled() -> Self {
        Self::default()
    }

    /// Enable verification only if it was requested and a configured search
    /// backend is available.
    pub fn resolve(requested: bool, search: Option<Arc<dyn WebSearch>>) -> Self {
        let available = search.as_ref().is_some_and(|s| s.is_configured());
        if requested && !available {
            tracing::warn!("Clinic verification requested but Google Search API not configured");
        }
        Self {
            enabled: requested && available,
            search,
        }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }

    pub fn search(&self) -> Option<&Arc<dyn WebSearch>> {
        self.search.as_ref()
    }
}

impl std::fmt::Debug for VerificationConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerificationConfig")
            .field("enabled", &self.enabled)
            .field("search_configured", &self.search.is_some())
            .finish()
    }
}

/// Two-stage decision: multimodal analysis, then (optionally) a text-only
/// pass with the service's web search tool attached.
pub struct DecisionEngine {
    client: Arc<dyn GenerationClient>,
    model: String,
    composer: PromptComposer,
    decision_timeout: Duration,
    verification_timeout: Duration,
}

impl DecisionEngine {
    pub fn new(
        client: Arc<dyn GenerationClient>,
        model: impl Into<String>,
        composer: PromptComposer,
        decision_timeout: Duration,
        verification_timeout: Duration,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            composer,
            decision_timeout,
            verification_timeout,
        }
    }

    pub fn composer(&self) -> &PromptComposer {
        &self.composer
    }

    /// Decide one claim from its composed prompt and attached images.
    ///
    /// Only a stage-1 failure is an error. Stage-2 problems fall back to the
    /// stage-1 text.
    pub fn decide(
        &self,
        prompt: &str,
        images: &[ImageRef],
        verification: &VerificationConfig,
    ) -> Result<Decision, DecisionError> {
        let inline = images
            .iter()
            .map(|image| {
                std::fs::read(&image.path)
                    .map(|data| InlineImage {
                        mime_type: image.mime_type().to_string(),
                        data,
                    })
                    .map_err(|source| DecisionError::ImageRead {
                        path: image.path.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let start = std::time::Instant::now();
        let request = GenerationRequest::text(prompt, self.decision_timeout)
            .with_sampling(DECISION_TEMPERATURE, DECISION_MAX_OUTPUT_TOKENS)
            .with_images(inline);
        let initial = self
            .client
            .generate(&self.model, &request)
            .map_err(DecisionError::Stage1)?;
        let initial_text = initial.text.unwrap_or_default();

        tracing::info!(
            images = images.len(),
            elapsed_ms = %start.elapsed().as_millis(),
            response_len = initial_text.len(),
            "Stage 1 analysis complete"
        );

        let mut grounding = Vec::new();
        let mut authoritative = initial_text;

        if verification.enabled() {
            let verify_prompt = self.composer.compose_verification(&authoritative);
            let request = GenerationRequest::text(verify_prompt, self.verification_timeout)
                .with_sampling(DECISION_TEMPERATURE, DECISION_MAX_OUTPUT_TOKENS)
                .with_web_search();

            match self.client.generate(&self.model, &request) {
                Ok(response) => match response.non_empty_text() {
                    Some(text) => {
                        grounding = build_records(&response.grounding, chrono::Utc::now());
                        authoritative = text.to_string();
                        tracing::info!(
                            grounding_entries = grounding.len(),
                            "Clinic verification complete"
                        );
                    }
                    None => tracing::warn!("No verification response, using initial analysis"),
                },
                Err(e) => {
                    tracing::warn!(error = %e, "Clinic verification failed, using initial analysis");
                }
            }
        }

        let mut decision = parse_decision(&authoritative);
        decision.grounding = grounding;
        decision.verification_enabled = verification.enabled();
        Ok(decision)
    }
}
