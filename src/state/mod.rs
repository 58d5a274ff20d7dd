//! State module for tracking what the crawler knows about each resource
//!
//! # Components
//!
//! - `ResourceState` / `FetchDecision`: per-URL freshness and rate-limit decisions
//! - `Jurisdiction`: the fixed table of state and territory codes
//! - `LeafType` / `LeafKind` / `ResourceKind`: the kinds of files a manifest names

mod freshness;
mod jurisdiction;
mod resource;

// Re-export main types
pub use freshness::{
    decide, format_http_date, parse_http_date, parse_max_age, FetchDecision, ResourceState,
    ResponseFreshness,
};
pub use jurisdiction::{partition_codes, Jurisdiction, JURISDICTIONS};
pub use resource::{LeafKind, LeafType, ResourceKind};
