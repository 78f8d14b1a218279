pub mod comparator;
pub mod engine;
pub mod grounding;
pub mod parser;
pub mod types;

pub use comparator::{compare, ExpectedAnswer, MatchOutcome};
pub use engine::{DecisionEngine, VerificationConfig};
pub use grounding::GroundingRecord;
pub use parser::{extract_json, parse_decision, JsonExtraction};
pub use types::{Decision, DecisionKind};

use std::path::PathBuf;

use thiserror::Error;

use crate::pipeline::llm::GenerationError;

#[derive(Error, Debug)]
pub enum DecisionError {
    #[error("Initial analysis failed: {0}")]
    Stage1(GenerationError),

    #[error("Failed to read image {path}: {source}")]
    ImageRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
