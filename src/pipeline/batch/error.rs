//! Run-level failures. Claim-level failures never surface here; they are
//! recorded as `ClaimError` items inside the run.

use thiserror::Error;

use super::store::StoreError;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("No claims specified")]
    NoClaims,

    #[error("Could not create run directory: {0}")]
    RunDirectory(#[source] StoreError),

    #[error("Could not write run summary: {0}")]
    Summary(#[source] StoreError),
}
