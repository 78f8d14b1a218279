//! Single-claim pipeline: load bundle → per-image OCR + metadata →
//! prompt → decision → comparison with the reference answer.

use chrono::Utc;
use thiserror::Error;

use crate::pipeline::batch::traits::ClaimPipeline;
use crate::pipeline::batch::types::{ClaimData, ClaimResult};
use crate::pipeline::bundle::{BundleError, ClaimBundleLoader};
use crate::pipeline::decision::{compare, DecisionEngine, DecisionError, VerificationConfig};
use crate::pipeline::extraction::{ImageMetadataExtractor, NamedImageMetadata};

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error(transparent)]
    Bundle(#[from] BundleError),

    #[error(transparent)]
    Decision(#[from] DecisionError),
}

pub struct ClaimProcessor {
    loader: ClaimBundleLoader,
    extractor: ImageMetadataExtractor,
    engine: DecisionEngine,
}

impl ClaimProcessor {
    pub fn new(loader: ClaimBundleLoader, extractor: ImageMetadataExtractor, engine: DecisionEngine) -> Self {
        Self {
            loader,
            extractor,
            engine,
        }
    }
}

impl ClaimPipeline for ClaimProcessor {
    fn process(&self, claim_id: u32, verification: &VerificationConfig) -> Result<ClaimResult, ProcessError> {
        let _span = tracing::info_span!("process_claim", claim = claim_id).entered();
        let start = std::time::Instant::now();

        let bundle = self.loader.load(claim_id)?;

        let image_metadata: Vec<NamedImageMetadata> = bundle
            .images
            .iter()
            .map(|image| NamedImageMetadata {
                filename: image.filename.clone(),
                metadata: self.extractor.extract(image),
            })
            .collect();

        let prompt = self
            .engine
            .composer()
            .compose(&bundle, &image_metadata, verification.enabled());
        let decision = self.engine.decide(&prompt, &bundle.images, verification)?;
        let matches_expected = compare(decision.decision, bundle.expected_answer.as_ref());

        tracing::info!(
            decision = %decision.decision,
            images = bundle.images.len(),
            images_extracted = image_metadata.iter().filter(|m| m.metadata.is_extracted()).count(),
            documents = bundle.documents.len(),
            matched = matches_expected.as_ref().map(|m| m.is_match()),
            elapsed_ms = %start.elapsed().as_millis(),
            "Claim decided"
        );

        Ok(ClaimResult {
            claim_number: claim_id,
            timestamp: Utc::now(),
            claim_data: ClaimData {
                description: bundle.description,
                documents: bundle.documents,
            },
            image_metadata,
            llm_decision: decision,
            expected_answer: bundle.expected_answer,
            matches_expected,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::pipeline::decision::DecisionKind;
    use crate::pipeline::extraction::{MockOcrEngine, OcrAdapter};
    use crate::pipeline::llm::{
        GenerationError, GenerationResponse, GroundingChunk, GroundingMetadata, MockGenerationClient, WebChunk,
    };
    use crate::pipeline::prompt::PromptComposer;
    use crate::pipeline::search::{MockWebSearch, WebSearch};

    fn write_claim(root: &Path, id: u32) {
        let dir = root.join(format!("claim {id}"));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("description.txt"), "Hospitalised in Brussels, trip cancelled").unwrap();
        std::fs::write(dir.join("answer.json"), r#"{"decision": "DENY", "acceptable_decision": "UNCERTAIN"}"#).unwrap();
        std::fs::write(dir.join("report.md"), "# Discharge report").unwrap();
        std::fs::write(dir.join("belgian_certificate.png"), b"png-bytes").unwrap();
    }

    fn write_meal_voucher_claim(root: &Path, id: u32) {
        let dir = root.join(format!("claim {id}"));
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(dir.join("description.txt"), "Flight delayed 3 hours, claim for meal voucher $45").unwrap();
        std::fs::write(dir.join("answer.json"), r#"{"decision": "APPROVE"}"#).unwrap();
        std::fs::write(dir.join("receipt.jpg"), b"jpg-bytes").unwrap();
    }

    fn processor(root: &Path, client: Arc<MockGenerationClient>) -> ClaimProcessor {
        let ocr = OcrAdapter::new(Arc::new(MockOcrEngine::new("Clinique Saint-Luc", 77.0)));
        ClaimProcessor::new(
            ClaimBundleLoader::new(root, 25),
            ImageMetadataExtractor::new(client.clone(), "m", Duration::from_secs(5), ocr),
            DecisionEngine::new(
                client,
                "m",
                PromptComposer::new("POLICY"),
                Duration::from_secs(5),
                Duration::from_secs(5),
            ),
        )
    }

    #[test]
    fn full_claim_pipeline() {
        let tmp = tempfile::tempdir().unwrap();
        write_claim(tmp.path(), 6);
        let client = Arc::new(MockGenerationClient::new("unused").with_script(vec![
            Ok(GenerationResponse::from_text(r#"{"document_type": "medical certificate", "language": "French"}"#)),
            Ok(GenerationResponse::from_text(r#"{"decision": "UNCERTAIN", "explanation": "Stamp unreadable"}"#)),
        ]));

        let result = processor(tmp.path(), client.clone())
            .process(6, &VerificationConfig::disabled())
            .unwrap();

        assert_eq!(result.claim_number, 6);
        assert_eq!(result.image_metadata.len(), 1);
        assert_eq!(result.image_metadata[0].filename, "belgian_certificate.png");
        let ocr = result.image_metadata[0].metadata.ocr();
        assert_eq!(ocr.languages_used, vec!["eng", "fra", "nld"]);
        assert_eq!(result.llm_decision.decision, DecisionKind::Uncertain);

        let outcome = result.matches_expected.unwrap();
        assert!(!outcome.exact_match);
        assert!(outcome.acceptable_match);

        let requests = client.requests();
        assert_eq!(requests.len(), 2);
        let decision_prompt = &requests[1].prompt;
        assert!(decision_prompt.contains("Hospitalised in Brussels"));
        assert!(decision_prompt.contains("**report.md**"));
        assert!(decision_prompt.contains("medical certificate"));
        assert_eq!(requests[1].images.len(), 1);
    }

    #[test]
    fn missing_claim_is_bundle_error() {
        let tmp = tempfile::tempdir().unwrap();
        let client = Arc::new(MockGenerationClient::new("{}"));
        let err = processor(tmp.path(), client)
            .process(11, &VerificationConfig::disabled())
            .unwrap_err();
        assert!(matches!(err, ProcessError::Bundle(BundleError::ClaimNotFound(11))));
        assert_eq!(err.to_string(), "Claim 11 not found");
    }

    #[test]
    fn stage_one_failure_is_decision_error() {
        let tmp = tempfile::tempdir().unwrap();
        write_claim(tmp.path(), 2);
        let client = Arc::new(MockGenerationClient::new("unused").with_script(vec![
            Ok(GenerationResponse::from_text("{}")),
            Err(GenerationError::Network("reset".into())),
        ]));
        let err = processor(tmp.path(), client)
            .process(2, &VerificationConfig::disabled())
            .unwrap_err();
        assert!(matches!(err, ProcessError::Decision(DecisionError::Stage1(_))));
    }

    #[test]
    fn meal_voucher_claim_matches_exactly() {
        let tmp = tempfile::tempdir().unwrap();
        write_meal_voucher_claim(tmp.path(), 3);
        let client = Arc::new(MockGenerationClient::new("unused").with_script(vec![
            Ok(GenerationResponse::from_text(r#"{"document_type": "receipt", "amounts": ["$45"]}"#)),
            Ok(GenerationResponse::from_text(
                r#"{"decision": "APPROVE", "explanation": "Delay over 2 hours, meal expense covered"}"#,
            )),
        ]));

        let result = processor(tmp.path(), client.clone())
            .process(3, &VerificationConfig::disabled())
            .unwrap();

        assert_eq!(result.llm_decision.decision, DecisionKind::Approve);
        assert!(result.llm_decision.grounding.is_empty());
        assert!(!result.llm_decision.verification_enabled);
        let outcome = result.matches_expected.unwrap();
        assert!(outcome.exact_match);
        assert!(!outcome.acceptable_match);
        assert_eq!(outcome.expected, Some(DecisionKind::Approve));
        assert_eq!(outcome.acceptable_alternative, None);

        let requests = client.requests();
        assert_eq!(requests.len(), 2);
        assert!(requests[1].prompt.contains("meal voucher $45"));
        assert_eq!(requests[1].images[0].mime_type, "image/jpeg");
    }

    #[test]
    fn meal_voucher_claim_with_grounded_verification() {
        let tmp = tempfile::tempdir().unwrap();
        write_meal_voucher_claim(tmp.path(), 4);
        let verified = GenerationResponse {
            text: Some(r#"{"decision": "APPROVE", "explanation": "Airline delay confirmed"}"#.into()),
            grounding: vec![GroundingMetadata {
                web_search_queries: vec!["flight delay meal voucher".into()],
                grounding_chunks: vec![GroundingChunk {
                    web: Some(WebChunk {
                        uri: Some("https://airline.example/delays".into()),
                        title: Some("Airline delays".into()),
                    }),
                }],
                ..Default::default()
            }],
        };
        let client = Arc::new(MockGenerationClient::new("unused").with_script(vec![
            Ok(GenerationResponse::from_text("{}")),
            Ok(GenerationResponse::from_text(r#"{"decision": "APPROVE", "explanation": "Covered"}"#)),
            Ok(verified),
        ]));
        let search = Arc::new(MockWebSearch::with_hits(vec![])) as Arc<dyn WebSearch>;
        let verification = VerificationConfig::resolve(true, Some(search));

        let result = processor(tmp.path(), client.clone()).process(4, &verification).unwrap();

        assert_eq!(result.llm_decision.decision, DecisionKind::Approve);
        assert_eq!(result.llm_decision.explanation, "Airline delay confirmed");
        assert!(result.llm_decision.verification_enabled);
        assert_eq!(result.llm_decision.grounding.len(), 1);
        assert_eq!(result.llm_decision.grounding[0].search_queries, vec!["flight delay meal voucher"]);
        let outcome = result.matches_expected.unwrap();
        assert!(outcome.exact_match);
        assert!(!outcome.acceptable_match);
        assert_eq!(client.requests().len(), 3);
    }
}
