//! Seam between the batch runner and the per-claim pipeline.

use super::types::ClaimResult;
use crate::pipeline::decision::VerificationConfig;
use crate::pipeline::processor::ProcessError;

/// Processes one claim end to end. Implemented by `ClaimProcessor`; tests
/// substitute scripted pipelines.
pub trait ClaimPipeline: Send + Sync {
    fn process(
        &self,
        claim_id: u32,
        verification: &VerificationConfig,
    ) -> Result<ClaimResult, ProcessError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_trait_is_object_safe() {
        fn _assert_pipeline(_: &dyn ClaimPipeline) {}
    }
}
