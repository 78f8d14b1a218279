use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::GenerationError;

/// Raw image bytes sent inline with a generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct InlineImage {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// One call to the generation service.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub prompt: String,
    pub images: Vec<InlineImage>,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    /// Attach the service-side web search tool. The service rejects this
    /// together with inline images, so callers never set both.
    pub web_search: bool,
    pub timeout: Duration,
}

impl GenerationRequest {
    pub fn text(prompt: impl Into<String>, timeout: Duration) -> Self {
        Self {
            prompt: prompt.into(),
            images: Vec::new(),
            temperature: None,
            max_output_tokens: None,
            web_search: false,
            timeout,
        }
    }

    pub fn with_images(mut self, images: Vec<InlineImage>) -> Self {
        self.images = images;
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_output_tokens: u32) -> Self {
        self.temperature = Some(temperature);
        self.max_output_tokens = Some(max_output_tokens);
        self
    }

    pub fn with_web_search(mut self) -> Self {
        self.web_search = true;
        self
    }
}

/// Generated text plus whatever grounding metadata the service attached.
#[derive(Debug, Clone, Default)]
pub struct GenerationResponse {
    /// `None` when the service answered without any text part.
    pub text: Option<String>,
    /// One entry per candidate that carried grounding metadata.
    pub grounding: Vec<GroundingMetadata>,
}

impl GenerationResponse {
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            grounding: Vec::new(),
        }
    }

    /// Text with surrounding whitespace removed, `None` when blank.
    pub fn non_empty_text(&self) -> Option<&str> {
        self.text.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

// ──────────────────────────────────────────────
// Grounding wire types (service response shape)
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GroundingMetadata {
    pub web_search_queries: Vec<String>,
    pub grounding_chunks: Vec<GroundingChunk>,
    pub grounding_supports: Vec<GroundingSupport>,
    pub search_entry_point: Option<SearchEntryPoint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GroundingChunk {
    pub web: Option<WebChunk>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WebChunk {
    pub uri: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct GroundingSupport {
    pub segment: Option<SupportedSegment>,
    pub grounding_chunk_indices: Vec<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SupportedSegment {
    pub start_index: Option<u32>,
    pub end_index: Option<u32>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchEntryPoint {
    pub rendered_content: Option<String>,
}

/// Generation service abstraction (allows mocking).
pub trait GenerationClient: Send + Sync {
    fn generate(
        &self,
        model: &str,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError>;
}

/// Mock generation client for testing.
///
/// Scripted replies are consumed in order; once the script is exhausted
/// every call returns the fallback text. All requests are recorded.
pub struct MockGenerationClient {
    script: Mutex<VecDeque<Result<GenerationResponse, GenerationError>>>,
    fallback: String,
    requests: Mutex<Vec<GenerationRequest>>,
}

impl MockGenerationClient {
    pub fn new(fallback: &str) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback: fallback.to_string(),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn with_script(self, replies: Vec<Result<GenerationResponse, GenerationError>>) -> Self {
        if let Ok(mut script) = self.script.lock() {
            script.extend(replies);
        }
        self
    }

    /// Snapshot of every request received so far.
    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl GenerationClient for MockGenerationClient {
    fn generate(
        &self,
        _model: &str,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        let scripted = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match scripted {
            Some(reply) => reply,
            None => Ok(GenerationResponse::from_text(self.fallback.clone())),
        }
    }
}
