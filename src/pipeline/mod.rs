pub mod batch;
pub mod bundle;
pub mod decision;
pub mod extraction;
pub mod llm;
pub mod processor; // Single-claim pipeline used by the batch runner
pub mod prompt;
pub mod search;
