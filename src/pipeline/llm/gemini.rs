use base64::Engine as _;
use serde::{Deserialize, Serialize};

use super::types::{GenerationClient, GenerationRequest, GenerationResponse, GroundingMetadata};
use super::GenerationError;

/// Public Generative Language REST endpoint.
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Gemini HTTP client for `models/{model}:generateContent`.
///
/// Blocking by construction: every call is a suspension point of the claim
/// pipeline and nothing else runs while it is outstanding.
pub struct GeminiClient {
    base_url: String,
    api_key: String,
    client: reqwest::blocking::Client,
}

impl GeminiClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, GenerationError> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| GenerationError::HttpClient(e.to_string()))?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            client,
        })
    }

    fn endpoint(&self, model: &str) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        format!("{}/models/{}:generateContent", self.base_url, model)
    }
}

/// Request body for `generateContent`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest<'a> {
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Tool>,
}

#[derive(Serialize)]
struct Content<'a> {
    role: &'static str,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
#[serde(untagged)]
enum Part<'a> {
    Text {
        text: &'a str,
    },
    #[serde(rename_all = "camelCase")]
    Inline {
        inline_data: Blob<'a>,
    },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Blob<'a> {
    mime_type: &'a str,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Tool {
    google_search: EmptyObject,
}

#[derive(Serialize)]
struct EmptyObject {}

/// Response body from `generateContent`.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    grounding_metadata: Option<GroundingMetadata>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

fn build_body(request: &GenerationRequest) -> GenerateContentRequest<'_> {
    let mut parts = vec![Part::Text {
        text: &request.prompt,
    }];
    for image in &request.images {
        parts.push(Part::Inline {
            inline_data: Blob {
                mime_type: &image.mime_type,
                data: base64::engine::general_purpose::STANDARD.encode(&image.data),
            },
        });
    }

    let generation_config = if request.temperature.is_some() || request.max_output_tokens.is_some() {
        Some(GenerationConfig {
            temperature: request.temperature,
            max_output_tokens: request.max_output_tokens,
        })
    } else {
        None
    };

    let tools = if request.web_search {
        vec![Tool {
            google_search: EmptyObject {},
        }]
    } else {
        Vec::new()
    };

    GenerateContentRequest {
        contents: vec![Content {
            role: "user",
            parts,
        }],
        generation_config,
        tools,
    }
}

/// Text of the first candidate (all text parts concatenated) plus grounding
/// metadata from every candidate that carries it.
fn into_generation_response(parsed: GenerateContentResponse) -> GenerationResponse {
    let text = parsed
        .candidates
        .first()
        .and_then(|c| c.content.as_ref())
        .map(|content| {
            content
                .parts
                .iter()
                .filter_map(|p| p.text.as_deref())
                .collect::<String>()
        })
        .filter(|t| !t.is_empty());

    let grounding = parsed
        .candidates
        .into_iter()
        .filter_map(|c| c.grounding_metadata)
        .collect();

    GenerationResponse { text, grounding }
}

impl GenerationClient for GeminiClient {
    fn generate(
        &self,
        model: &str,
        request: &GenerationRequest,
    ) -> Result<GenerationResponse, GenerationError> {
        let url = self.endpoint(model);
        let body = build_body(request);

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .timeout(request.timeout)
            .json(&body)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    GenerationError::Timeout(request.timeout.as_secs())
                } else if e.is_connect() {
                    GenerationError::NotReachable(self.base_url.clone())
                } else {
                    GenerationError::Network(e.without_url().to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            if status.as_u16() == 429 {
                return Err(GenerationError::QuotaExceeded(message));
            }
            return Err(GenerationError::ApiError {
                status: status.as_u16(),
                message,
            });
        }

        let parsed: GenerateContentResponse = response
            .json()
            .map_err(|e| GenerationError::ResponseParsing(e.to_string()))?;

        Ok(into_generation_response(parsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::llm::types::InlineImage;
    use std::time::Duration;

    #[test]
    fn endpoint_strips_models_prefix() {
        let client = GeminiClient::new("https://example.test/v1beta/", "key").unwrap();
        assert_eq!(
            client.endpoint("models/gemini-2.0-flash-exp"),
            "https://example.test/v1beta/models/gemini-2.0-flash-exp:generateContent"
        );
        assert_eq!(
            client.endpoint("gemini-2.0-flash-exp"),
            "https://example.test/v1beta/models/gemini-2.0-flash-exp:generateContent"
        );
    }

    #[test]
    fn multimodal_body_inlines_images_without_tools() {
        let request = GenerationRequest::text("analyze", Duration::from_secs(5))
            .with_sampling(0.3, 4096)
            .with_images(vec![InlineImage {
                mime_type: "image/png".into(),
                data: vec![1, 2, 3],
            }]);
        let json = serde_json::to_value(build_body(&request)).unwrap();

        let parts = &json["contents"][0]["parts"];
        assert_eq!(parts[0]["text"], "analyze");
        assert_eq!(parts[1]["inlineData"]["mimeType"], "image/png");
        assert_eq!(parts[1]["inlineData"]["data"], "AQID");
        let temperature = json["generationConfig"]["temperature"].as_f64().unwrap();
        assert!((temperature - 0.3).abs() < 1e-6);
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 4096);
        assert!(json.get("tools").is_none());
    }

    #[test]
    fn search_body_attaches_google_search_tool() {
        let request = GenerationRequest::text("verify", Duration::from_secs(5)).with_web_search();
        let json = serde_json::to_value(build_body(&request)).unwrap();
        assert_eq!(json["tools"][0]["googleSearch"], serde_json::json!({}));
        assert!(json.get("generationConfig").is_none());
    }

    #[test]
    fn response_concatenates_first_candidate_parts() {
        let raw = r#"{
            "candidates": [
                {"content": {"parts": [{"text": "```json\n"}, {"text": "{}\n```"}]},
                 "groundingMetadata": {"groundingChunks": [{"web": {"uri": "https://x", "title": "X"}}]}},
                {"content": {"parts": [{"text": "ignored"}]}}
            ]
        }"#;
        let parsed: GenerateContentResponse = serde_json::from_str(raw).unwrap();
        let response = into_generation_response(parsed);
        assert_eq!(response.text.as_deref(), Some("```json\n{}\n```"));
        assert_eq!(response.grounding.len(), 1);
    }

    #[test]
    fn response_without_text_is_none() {
        let parsed: GenerateContentResponse =
            serde_json::from_str(r#"{"candidates": [{"finishReason": "SAFETY"}]}"#).unwrap();
        let response = into_generation_response(parsed);
        assert!(response.text.is_none());
        assert!(response.grounding.is_empty());

        let parsed: GenerateContentResponse = serde_json::from_str("{}").unwrap();
        assert!(into_generation_response(parsed).text.is_none());
    }

    #[test]
    fn unreachable_endpoint_maps_to_error() {
        let client = GeminiClient::new("http://127.0.0.1:1", "key").unwrap();
        let request = GenerationRequest::text("hi", Duration::from_secs(2));
        let err = client.generate("gemini", &request).unwrap_err();
        assert!(
            matches!(err, GenerationError::NotReachable(_) | GenerationError::Network(_)),
            "unexpected error: {err}"
        );
    }
}
