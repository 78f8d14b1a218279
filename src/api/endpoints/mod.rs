//! API endpoint handlers, one module per resource.

pub mod claims;
pub mod facilities;
pub mod health;
pub mod runs;
