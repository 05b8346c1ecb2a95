//! Mutation lifecycle events.
//!
//! Every mutation emits one event per phase transition. Sinks are
//! infallible, so telemetry can never affect the outcome of a mutation.

use std::fmt;

use optimist_core::{CacheKey, Domain};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{info, warn};

/// Kind of a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Create,
    Update,
    Delete,
    ChangeStatus,
    Bulk,
}

impl MutationKind {
    /// Returns the label used in logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::ChangeStatus => "change_status",
            Self::Bulk => "bulk",
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Observable phase of a mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationPhase {
    OptimisticApplied,
    Committed,
    RolledBack,
}

impl MutationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OptimisticApplied => "optimistic_applied",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
        }
    }
}

/// A mutation phase transition.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MutationEvent {
    pub mutation_id: u64,
    pub kind: MutationKind,
    pub entity_type: Domain,
    pub phase: MutationPhase,
    /// Keys patched by the optimistic step.
    pub keys: Vec<CacheKey>,
    /// Remote error message, set on `RolledBack`.
    pub error: Option<String>,
}

/// Destination of mutation events.
pub trait TelemetrySink: Send + Sync {
    fn emit(&self, event: &MutationEvent);
}

/// Sink que escribe los eventos como logs de tracing.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn emit(&self, event: &MutationEvent) {
        match event.phase {
            MutationPhase::RolledBack => warn!(
                mutation_id = event.mutation_id,
                kind = %event.kind,
                entity_type = %event.entity_type,
                keys = event.keys.len(),
                error = event.error.as_deref().unwrap_or(""),
                "Mutation rolled back"
            ),
            phase => info!(
                mutation_id = event.mutation_id,
                kind = %event.kind,
                entity_type = %event.entity_type,
                phase = phase.as_str(),
                keys = event.keys.len(),
                "Mutation transition"
            ),
        }
    }
}

/// Sink que guarda los eventos en memoria (tests, debugging).
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<MutationEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every event received so far.
    pub fn events(&self) -> Vec<MutationEvent> {
        self.events.lock().clone()
    }

    /// Returns the phases received so far, in order.
    pub fn phases(&self) -> Vec<MutationPhase> {
        self.events.lock().iter().map(|e| e.phase).collect()
    }
}

impl TelemetrySink for RecordingSink {
    fn emit(&self, event: &MutationEvent) {
        self.events.lock().push(event.clone());
    }
}
