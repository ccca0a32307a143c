//! Posting gateway rules: requests by account code, source pairing,
//! approval gating and template resolution.

pub mod rules;
pub mod types;

pub use rules::PostingRules;
pub use types::{LineTemplate, PostingRequest, SourceKey};
