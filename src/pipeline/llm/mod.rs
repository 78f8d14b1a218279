//! Generation service integration: request/response types, error taxonomy,
//! the `GenerationClient` seam and its Gemini REST implementation.

pub mod types;
pub mod gemini;

pub use types::*;
pub use gemini::GeminiClient;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("Generation service is not reachable at {0}")]
    NotReachable(String),

    #[error("Request timed out after {0}s")]
    Timeout(u64),

    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Generation service returned error (status {status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Response parsing error: {0}")]
    ResponseParsing(String),

    #[error("HTTP client error: {0}")]
    HttpClient(String),
}
