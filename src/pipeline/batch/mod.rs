//! Batch evaluation of claims.
//!
//! ```text
//! BatchRunner → ClaimPipeline (per claim) → RunStore (claim_<n>.json, summary.json)
//! ```
//!
//! Claims run strictly one after another with a fixed pause between them.
//! A failing claim is recorded and never stops the batch.

pub mod error;
pub mod runner;
pub mod store;
pub mod traits;
pub mod types;

pub use error::BatchError;
pub use runner::{BatchRunner, CancellationToken};
pub use store::{RunDir, RunStore, StoreError};
pub use traits::ClaimPipeline;
pub use types::*;
