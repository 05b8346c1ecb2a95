//! Optimist Core - Key space and record types
//!
//! This crate provides the foundational types for the optimist cache engine:
//! structured cache keys, prefix matchers, and helpers to work with the JSON
//! records stored in cached query results.

pub mod error;
pub mod keys;
pub mod record;
pub mod types;

pub use error::{CoreError, Result};
pub use keys::{CacheKey, KeyKind, KeyMatcher, KeyParams, KeyPrefix, ParamValue};
pub use types::{Domain, EntityId};

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
