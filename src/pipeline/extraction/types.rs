use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ExtractionError;

/// OCR envelope merged into every image's metadata.
///
/// `confidence` is the mean token confidence on Tesseract's 0–100 scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrResult {
    pub text: String,
    #[serde(default)]
    pub confidence: f32,
    #[serde(default)]
    pub languages_used: Vec<String>,
    #[serde(default)]
    pub word_count: usize,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl OcrResult {
    pub fn failed(error: impl Into<String>, languages_used: Vec<String>) -> Self {
        Self {
            text: String::new(),
            confidence: 0.0,
            languages_used,
            word_count: 0,
            success: false,
            error: Some(error.into()),
        }
    }
}

/// One recognized token. Negative confidence is the engine's
/// "no confidence" sentinel.
#[derive(Debug, Clone, PartialEq)]
pub struct OcrToken {
    pub text: String,
    pub confidence: f32,
}

/// Raw OCR result from the engine.
#[derive(Debug, Clone, Default)]
pub struct OcrPage {
    pub text: String,
    pub tokens: Vec<OcrToken>,
}

impl OcrPage {
    /// Mean token confidence, sentinel tokens excluded. 0 when nothing remains.
    pub fn mean_confidence(&self) -> f32 {
        let scored: Vec<f32> = self
            .tokens
            .iter()
            .map(|t| t.confidence)
            .filter(|c| *c >= 0.0)
            .collect();
        if scored.is_empty() {
            0.0
        } else {
            scored.iter().sum::<f32>() / scored.len() as f32
        }
    }
}

/// OCR engine abstraction (allows mocking for tests)
pub trait OcrEngine: Send + Sync {
    fn recognize(&self, image_bytes: &[u8], languages: &[String]) -> Result<OcrPage, ExtractionError>;
}

// ──────────────────────────────────────────────
// Image metadata
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthenticityIndicators {
    pub has_signature: bool,
    pub has_official_stamp: bool,
    pub has_letterhead: bool,
    pub quality_assessment: String,
}

/// Structured facts the vision model reports for one document image.
/// Every field is optional on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentFacts {
    pub document_type: String,
    /// Category (names, dates, amounts, …) → values.
    pub key_information: BTreeMap<String, Vec<String>>,
    pub text_content: String,
    pub authenticity_indicators: AuthenticityIndicators,
    pub fraud_concerns: Vec<String>,
    pub language: String,
}

/// Metadata for one image: model-extracted facts (or the reason there are
/// none) plus the OCR envelope, which is always present.
///
/// Variant order matters for untagged deserialization: the variants with
/// required marker fields come first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ImageMetadata {
    Unparsed {
        raw_response: String,
        extraction_error: String,
        ocr_extraction: OcrResult,
    },
    Failed {
        error: String,
        ocr_extraction: OcrResult,
    },
    Extracted {
        #[serde(flatten)]
        facts: DocumentFacts,
        ocr_extraction: OcrResult,
    },
}

impl ImageMetadata {
    pub fn ocr(&self) -> &OcrResult {
        match self {
            Self::Unparsed { ocr_extraction, .. }
            | Self::Failed { ocr_extraction, .. }
            | Self::Extracted { ocr_extraction, .. } => ocr_extraction,
        }
    }

    pub fn is_extracted(&self) -> bool {
        matches!(self, Self::Extracted { .. })
    }
}

/// Image metadata keyed by the image's filename, as persisted in results.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamedImageMetadata {
    pub filename: String,
    pub metadata: ImageMetadata,
}
