//! Optimist Engine - Optimistic cache synchronization
//!
//! This crate keeps a client-side cache of remote query results consistent
//! with user mutations:
//!
//! - [`store`]: the cache store, with restorable multi-key patches;
//! - [`executor`]: deduplicated reads with staleness and superseded-fetch
//!   protection;
//! - [`coordinator`]: the optimistic mutation state machine;
//! - [`invalidation`]: which cache regions depend on which entity types.
//!
//! [`OptimistEngine`] ties them together for one session.

pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod executor;
pub mod invalidation;
pub mod metrics;
pub mod store;
pub mod telemetry;

pub use config::EngineConfig;
pub use coordinator::{BulkAction, Mutation, MutationCoordinator};
pub use engine::OptimistEngine;
pub use error::{FetchError, MutationError};
pub use executor::{QueryExecutor, QueryView, ReadOptions};
pub use invalidation::{InvalidationGraph, StatusCounters, default_graph};
pub use metrics::{EngineMetrics, register_engine_metrics};
pub use store::{CacheEntry, CacheStore, EntryState, RestoreToken};
pub use telemetry::{
    MutationEvent, MutationKind, MutationPhase, RecordingSink, TelemetrySink, TracingSink,
};

/// Returns the crate version.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_defined() {
        assert!(!version().is_empty());
    }
}
