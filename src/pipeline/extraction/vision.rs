use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use super::ocr::OcrAdapter;
use super::types::{AuthenticityIndicators, DocumentFacts, ImageMetadata, OcrResult};
use crate::pipeline::bundle::ImageRef;
use crate::pipeline::decision::parser::{extract_json, JsonExtraction};
use crate::pipeline::llm::{GenerationClient, GenerationRequest, InlineImage};

/// Instruction sent with every document image.
const EXTRACTION_PROMPT: &str = r#"Analyze this document image and extract the following information in JSON format:
{
    "document_type": "type of document (e.g., medical certificate, boarding pass, receipt)",
    "key_information": {
        "names": ["any names found"],
        "dates": ["any dates found"],
        "amounts": ["any monetary amounts"],
        "locations": ["any locations mentioned"],
        "organizations": ["hospitals, airlines, etc."]
    },
    "text_content": "full text transcription of the document",
    "authenticity_indicators": {
        "has_signature": true/false,
        "has_official_stamp": true/false,
        "has_letterhead": true/false,
        "quality_assessment": "description of document quality"
    },
    "fraud_concerns": ["any suspicious elements noticed"],
    "language": "primary language of document"
}

Be thorough and precise. Extract all visible text."#;

const UNPARSED_MESSAGE: &str = "Could not parse structured metadata";

/// What the vision model produced for one image, before OCR is attached.
#[derive(Debug, Clone, PartialEq)]
pub enum VisionOutcome {
    Facts(DocumentFacts),
    Unparsed { raw_response: String },
    Failed { error: String },
}

/// Attach the OCR envelope to a vision outcome.
pub fn merge_ocr(outcome: VisionOutcome, ocr: OcrResult) -> ImageMetadata {
    match outcome {
        VisionOutcome::Facts(facts) => ImageMetadata::Extracted {
            facts,
            ocr_extraction: ocr,
        },
        VisionOutcome::Unparsed { raw_response } => ImageMetadata::Unparsed {
            raw_response,
            extraction_error: UNPARSED_MESSAGE.to_string(),
            ocr_extraction: ocr,
        },
        VisionOutcome::Failed { error } => ImageMetadata::Failed {
            error,
            ocr_extraction: ocr,
        },
    }
}

/// Extracts structured metadata from claim images: OCR first, then the
/// vision-capable generation model.
pub struct ImageMetadataExtractor {
    client: Arc<dyn GenerationClient>,
    model: String,
    timeout: Duration,
    ocr: OcrAdapter,
}

impl ImageMetadataExtractor {
    pub fn new(
        client: Arc<dyn GenerationClient>,
        model: impl Into<String>,
        timeout: Duration,
        ocr: OcrAdapter,
    ) -> Self {
        Self {
            client,
            model: model.into(),
            timeout,
            ocr,
        }
    }

    /// Never fails: service and parse problems are recorded in the metadata.
    pub fn extract(&self, image: &ImageRef) -> ImageMetadata {
        let _span = tracing::info_span!(
            "image_metadata",
            file = %image.filename,
            model = %self.model,
        )
        .entered();
        let start = std::time::Instant::now();

        let ocr = self.ocr.extract(&image.path);
        let outcome = self.describe(image);

        tracing::info!(
            elapsed_ms = %start.elapsed().as_millis(),
            ocr_success = ocr.success,
            outcome = outcome_label(&outcome),
            "Image metadata extracted"
        );

        merge_ocr(outcome, ocr)
    }

    fn describe(&self, image: &ImageRef) -> VisionOutcome {
        let bytes = match std::fs::read(&image.path) {
            Ok(b) => b,
            Err(e) => {
                return VisionOutcome::Failed {
                    error: format!("Failed to extract metadata: {e}"),
                }
            }
        };

        let request = GenerationRequest::text(EXTRACTION_PROMPT, self.timeout).with_images(vec![
            InlineImage {
                mime_type: image.mime_type().to_string(),
                data: bytes,
            },
        ]);

        match self.client.generate(&self.model, &request) {
            Ok(response) => interpret_response(response.text.as_deref().unwrap_or_default()),
            Err(e) => {
                tracing::warn!(file = %image.filename, error = %e, "Vision extraction failed");
                VisionOutcome::Failed {
                    error: format!("Failed to extract metadata: {e}"),
                }
            }
        }
    }
}

fn outcome_label(outcome: &VisionOutcome) -> &'static str {
    match outcome {
        VisionOutcome::Facts(_) => "extracted",
        VisionOutcome::Unparsed { .. } => "unparsed",
        VisionOutcome::Failed { .. } => "failed",
    }
}

/// Parse the model's reply into document facts.
pub fn interpret_response(text: &str) -> VisionOutcome {
    match extract_json(text) {
        JsonExtraction::Parsed(value) => VisionOutcome::Facts(facts_from_value(&value)),
        JsonExtraction::Fallback { raw_text, .. } => VisionOutcome::Unparsed {
            raw_response: raw_text,
        },
    }
}

/// Lenient mapping: wrong-typed or missing fields fall back to defaults,
/// scalars are promoted to single-item lists.
fn facts_from_value(value: &Value) -> DocumentFacts {
    let key_information = value
        .get("key_information")
        .and_then(Value::as_object)
        .map(|map| {
            map.iter()
                .map(|(k, v)| (k.clone(), string_list(v)))
                .collect::<BTreeMap<_, _>>()
        })
        .unwrap_or_default();

    let indicators = value.get("authenticity_indicators");
    let flag = |name: &str| indicators.and_then(|i| i.get(name)).map(truthy).unwrap_or(false);

    DocumentFacts {
        document_type: string_field(value.get("document_type")),
        key_information,
        text_content: string_field(value.get("text_content")),
        authenticity_indicators: AuthenticityIndicators {
            has_signature: flag("has_signature"),
            has_official_stamp: flag("has_official_stamp"),
            has_letterhead: flag("has_letterhead"),
            quality_assessment: string_field(indicators.and_then(|i| i.get("quality_assessment"))),
        },
        fraud_concerns: value.get("fraud_concerns").map(string_list).unwrap_or_default(),
        language: string_field(value.get("language")),
    }
}

fn string_field(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn string_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter(|v| !v.is_null())
            .map(|v| string_field(Some(v)))
            .collect(),
        Value::Null => Vec::new(),
        other => vec![string_field(Some(other))],
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::String(s) => matches!(s.trim().to_ascii_lowercase().as_str(), "true" | "yes"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::ocr::MockOcrEngine;
    use crate::pipeline::llm::{GenerationError, GenerationResponse, MockGenerationClient};

    fn ocr_result() -> OcrResult {
        OcrResult {
            text: "Hospital".into(),
            confidence: 90.0,
            languages_used: vec!["eng".into()],
            word_count: 1,
            success: true,
            error: None,
        }
    }

    fn image_in(dir: &tempfile::TempDir, name: &str) -> ImageRef {
        let path = dir.path().join(name);
        std::fs::write(&path, b"\x89PNG fake").unwrap();
        ImageRef {
            filename: name.to_string(),
            path,
        }
    }

    fn extractor(client: Arc<MockGenerationClient>) -> ImageMetadataExtractor {
        ImageMetadataExtractor::new(
            client,
            "vision-model",
            Duration::from_secs(5),
            OcrAdapter::new(Arc::new(MockOcrEngine::new("St Mary Hospital", 85.0))),
        )
    }

    #[test]
    fn merge_is_pure_and_keeps_ocr_for_every_outcome() {
        let outcomes = [
            VisionOutcome::Facts(DocumentFacts::default()),
            VisionOutcome::Unparsed { raw_response: "x".into() },
            VisionOutcome::Failed { error: "boom".into() },
        ];
        for outcome in outcomes {
            let first = merge_ocr(outcome.clone(), ocr_result());
            let second = merge_ocr(outcome, ocr_result());
            assert_eq!(first, second);
            assert_eq!(first.ocr(), &ocr_result());
        }
    }

    #[test]
    fn unparsed_carries_fixed_error_message() {
        let metadata = merge_ocr(
            VisionOutcome::Unparsed { raw_response: "prose".into() },
            ocr_result(),
        );
        let json = serde_json::to_value(&metadata).unwrap();
        assert_eq!(json["extraction_error"], "Could not parse structured metadata");
        assert_eq!(json["raw_response"], "prose");
        assert_eq!(json["ocr_extraction"]["success"], true);
    }

    #[test]
    fn lenient_facts_parsing() {
        let text = r#"```json
{
  "document_type": "medical certificate",
  "key_information": {"names": ["Dr. Weber"], "dates": "2024-03-01", "amounts": null},
  "authenticity_indicators": {"has_signature": "true", "has_official_stamp": false},
  "fraud_concerns": "date looks altered",
  "extra_field": 42
}
```"#;
        let VisionOutcome::Facts(facts) = interpret_response(text) else {
            panic!("expected facts");
        };
        assert_eq!(facts.document_type, "medical certificate");
        assert_eq!(facts.key_information["names"], vec!["Dr. Weber"]);
        assert_eq!(facts.key_information["dates"], vec!["2024-03-01"]);
        assert!(facts.key_information["amounts"].is_empty());
        assert!(facts.authenticity_indicators.has_signature);
        assert!(!facts.authenticity_indicators.has_letterhead);
        assert_eq!(facts.fraud_concerns, vec!["date looks altered"]);
        assert!(facts.language.is_empty());
    }

    #[test]
    fn prose_reply_is_unparsed() {
        let outcome = interpret_response("This looks like a receipt.");
        assert_eq!(
            outcome,
            VisionOutcome::Unparsed { raw_response: "This looks like a receipt.".into() }
        );
    }

    #[test]
    fn extract_sends_image_with_extension_mime() {
        let dir = tempfile::tempdir().unwrap();
        let image = image_in(&dir, "certificate.webp");
        let client = Arc::new(MockGenerationClient::new(r#"{"document_type": "certificate"}"#));

        let metadata = extractor(client.clone()).extract(&image);
        assert!(metadata.is_extracted());
        assert_eq!(metadata.ocr().text, "St Mary Hospital");

        let requests = client.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].images[0].mime_type, "image/webp");
        assert!(!requests[0].web_search);
        assert!(requests[0].prompt.contains("document_type"));
    }

    #[test]
    fn service_error_becomes_failed_with_ocr() {
        let dir = tempfile::tempdir().unwrap();
        let image = image_in(&dir, "scan.png");
        let client = Arc::new(
            MockGenerationClient::new("unused")
                .with_script(vec![Err(GenerationError::QuotaExceeded("slow down".into()))]),
        );

        let metadata = extractor(client).extract(&image);
        match &metadata {
            ImageMetadata::Failed { error, ocr_extraction } => {
                assert!(error.contains("Quota exceeded"));
                assert!(ocr_extraction.success);
            }
            other => panic!("expected Failed, got {other:?}"),
        }
    }

    #[test]
    fn empty_reply_is_unparsed() {
        let dir = tempfile::tempdir().unwrap();
        let image = image_in(&dir, "scan.jpg");
        let client = Arc::new(
            MockGenerationClient::new("unused").with_script(vec![Ok(GenerationResponse::default())]),
        );
        let metadata = extractor(client).extract(&image);
        assert!(matches!(metadata, ImageMetadata::Unparsed { .. }));
    }
}
