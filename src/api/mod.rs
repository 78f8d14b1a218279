//! HTTP control surface.
//!
//! A thin passthrough over `CoreState`: list and preview claim bundles,
//! trigger a batch, inspect persisted runs. Batches run on the blocking
//! thread pool so the async runtime stays responsive while one is in flight.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod types;

pub use router::api_router;
pub use types::ApiContext;
