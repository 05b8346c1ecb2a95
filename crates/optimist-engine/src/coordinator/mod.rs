//! Mutation coordinator.
//!
//! Every mutation invocation runs the same state machine:
//!
//! ```text
//! PENDING ──patch──▶ APPLIED_OPTIMISTIC ──remote ok──▶ COMMITTED
//!                                       └─remote err─▶ ROLLED_BACK
//! ```
//!
//! - PENDING: the payload is validated. Nothing in the cache has changed.
//! - APPLIED_OPTIMISTIC: the proposed change is patched into every affected
//!   cache region and the restore tokens are kept by the invocation.
//! - COMMITTED: the tokens are dropped, the affected prefixes (the entity
//!   domain plus its registered dependents) are invalidated and the
//!   canonical entity is returned.
//! - ROLLED_BACK: the tokens are restored in reverse order and the remote
//!   error is returned untouched.
//!
//! Each mutation kind has its own coordinator function, in its own module.

mod bulk;
mod create;
mod delete;
mod status;
mod update;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use optimist_core::{
    CacheKey, CoreError, Domain, EntityId, KeyKind, KeyMatcher, KeyPrefix, keys, record,
};
use optimist_remote::{RemoteError, RemoteOperation, RemoteResponse, RemoteService};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, info};

use crate::config::EngineConfig;
use crate::error::MutationError;
use crate::executor::QueryExecutor;
use crate::invalidation::InvalidationGraph;
use crate::metrics::EngineMetrics;
use crate::store::{CacheStore, RestoreToken};
use crate::telemetry::{MutationEvent, MutationKind, MutationPhase, TelemetrySink, TracingSink};

/// Action applied to every identifier of a bulk mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BulkAction {
    /// Merge the same partial patch into every entity.
    Update { patch: Value },
    /// Delete every entity.
    Delete,
    /// Move every entity to the same status.
    ChangeStatus { status: String },
}

impl BulkAction {
    fn payload(&self) -> Value {
        match self {
            Self::Update { patch } => json!({ "type": "update", "patch": patch }),
            Self::Delete => json!({ "type": "delete" }),
            Self::ChangeStatus { status } => json!({ "type": "change_status", "status": status }),
        }
    }
}

/// A mutation request, as issued by the UI.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Create {
        entity_type: Domain,
        fields: Value,
    },
    Update {
        entity_type: Domain,
        id: EntityId,
        patch: Value,
    },
    Delete {
        entity_type: Domain,
        id: EntityId,
    },
    ChangeStatus {
        entity_type: Domain,
        id: EntityId,
        status: String,
    },
    Bulk {
        entity_type: Domain,
        ids: Vec<EntityId>,
        action: BulkAction,
    },
}

impl Mutation {
    pub fn kind(&self) -> MutationKind {
        match self {
            Self::Create { .. } => MutationKind::Create,
            Self::Update { .. } => MutationKind::Update,
            Self::Delete { .. } => MutationKind::Delete,
            Self::ChangeStatus { .. } => MutationKind::ChangeStatus,
            Self::Bulk { .. } => MutationKind::Bulk,
        }
    }

    pub fn entity_type(&self) -> &Domain {
        match self {
            Self::Create { entity_type, .. }
            | Self::Update { entity_type, .. }
            | Self::Delete { entity_type, .. }
            | Self::ChangeStatus { entity_type, .. }
            | Self::Bulk { entity_type, .. } => entity_type,
        }
    }
}

/// State of one mutation invocation between its optimistic patch and its
/// terminal transition. Owns the restore tokens.
pub(crate) struct Invocation {
    id: u64,
    kind: MutationKind,
    entity_type: Domain,
    tokens: Vec<RestoreToken>,
    touched: Vec<CacheKey>,
}

impl Invocation {
    /// Patches the cache and keeps the restore token.
    fn patch<M, F>(&mut self, store: &CacheStore, matcher: &M, transform: F)
    where
        M: KeyMatcher + ?Sized,
        F: FnMut(&CacheKey, &mut Value) -> bool,
    {
        let token = store.patch_many(matcher, transform);
        if token.is_empty() {
            return;
        }
        for key in token.keys() {
            if !self.touched.contains(key) {
                self.touched.push(key.clone());
            }
        }
        self.tokens.push(token);
    }

    /// Applies per-key count deltas in a single patch.
    fn adjust_counts(&mut self, store: &CacheStore, deltas: &BTreeMap<CacheKey, i64>) {
        if deltas.is_empty() {
            return;
        }
        let matcher = |key: &CacheKey| deltas.contains_key(key);
        self.patch(store, &matcher, |key, data| match deltas.get(key) {
            Some(delta) if *delta != 0 => record::adjust_count(data, *delta),
            _ => false,
        });
    }

    fn event(&self, phase: MutationPhase, error: Option<String>) -> MutationEvent {
        MutationEvent {
            mutation_id: self.id,
            kind: self.kind,
            entity_type: self.entity_type.clone(),
            phase,
            keys: self.touched.clone(),
            error,
        }
    }
}

/// Runs mutations against the cache and the remote service.
pub struct MutationCoordinator {
    store: CacheStore,
    executor: QueryExecutor,
    graph: Arc<InvalidationGraph>,
    remote: Arc<dyn RemoteService>,
    telemetry: Arc<dyn TelemetrySink>,
    config: Arc<EngineConfig>,
    non_filters: Vec<String>,
    metrics: EngineMetrics,
    next_id: AtomicU64,
}

impl MutationCoordinator {
    /// Creates a coordinator writing to the executor's store. Telemetry goes
    /// to [`TracingSink`] until replaced.
    pub fn new(
        executor: QueryExecutor,
        graph: Arc<InvalidationGraph>,
        remote: Arc<dyn RemoteService>,
        config: Arc<EngineConfig>,
        metrics: EngineMetrics,
    ) -> Self {
        Self {
            store: executor.store().clone(),
            executor,
            graph,
            remote,
            telemetry: Arc::new(TracingSink),
            non_filters: config.non_filter_params(),
            config,
            metrics,
            next_id: AtomicU64::new(1),
        }
    }

    /// Replaces the telemetry sink.
    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    /// Returns the invalidation graph.
    pub fn graph(&self) -> &InvalidationGraph {
        &self.graph
    }

    /// Runs a mutation. Bulk mutations return their report as JSON.
    pub async fn mutate(&self, mutation: Mutation) -> Result<Value, MutationError> {
        match mutation {
            Mutation::Create {
                entity_type,
                fields,
            } => self.create(entity_type, fields).await,
            Mutation::Update {
                entity_type,
                id,
                patch,
            } => self.update(entity_type, id, patch).await,
            Mutation::Delete { entity_type, id } => self.delete(entity_type, id).await,
            Mutation::ChangeStatus {
                entity_type,
                id,
                status,
            } => self.change_status(entity_type, id, status).await,
            Mutation::Bulk {
                entity_type,
                ids,
                action,
            } => {
                let report = self.bulk(entity_type, ids, action).await?;
                Ok(json!(report))
            },
        }
    }

    /// Key params that are not record fields.
    fn non_filters(&self) -> &[String] {
        &self.non_filters
    }

    fn begin(&self, kind: MutationKind, entity_type: &Domain) -> Invocation {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        debug!(mutation_id = id, kind = %kind, entity_type = %entity_type, "Mutation pending");
        Invocation {
            id,
            kind,
            entity_type: entity_type.clone(),
            tokens: Vec::new(),
            touched: Vec::new(),
        }
    }

    fn applied(&self, invocation: &Invocation) {
        self.telemetry
            .emit(&invocation.event(MutationPhase::OptimisticApplied, None));
    }

    /// Drops the restore tokens and invalidates every affected prefix except
    /// the keys in `keep`, which already hold server truth.
    fn commit(&self, invocation: Invocation, keep: &[CacheKey]) {
        let invalidated = self.invalidate_affected(&invocation.entity_type, keep);

        info!(
            mutation_id = invocation.id,
            kind = %invocation.kind,
            entity_type = %invocation.entity_type,
            invalidated = invalidated,
            "Mutation committed"
        );
        self.metrics
            .record_mutation(invocation.kind.as_str(), "committed");
        self.telemetry
            .emit(&invocation.event(MutationPhase::Committed, None));

        if self.config.background_refetch {
            let executor = self.executor.clone();
            tokio::spawn(async move {
                executor.refetch_stale().await;
            });
        }
    }

    /// Restores every token in reverse order of application.
    fn rollback(&self, mut invocation: Invocation, error: &dyn fmt::Display) {
        let tokens = std::mem::take(&mut invocation.tokens);
        for token in tokens.into_iter().rev() {
            self.store.restore(token);
        }

        self.metrics
            .record_mutation(invocation.kind.as_str(), "rolled_back");
        self.telemetry.emit(
            &invocation.event(MutationPhase::RolledBack, Some(error.to_string())),
        );
    }

    /// Counts a mutation refused before any cache change.
    fn reject(&self, kind: MutationKind, error: impl Into<MutationError>) -> MutationError {
        let error = error.into();
        debug!(kind = %kind, error = %error, "Mutation rejected");
        self.metrics.record_mutation(kind.as_str(), "rejected");
        error
    }

    fn require_target(&self, kind: MutationKind, id: &EntityId) -> Result<(), MutationError> {
        if id.is_blank() {
            return Err(self.reject(kind, CoreError::invalid_record("entity id is blank")));
        }
        Ok(())
    }

    /// Fails with `CacheInconsistency` when strict consistency is on and no
    /// cached entry references the entity; otherwise the patch is a no-op.
    fn check_cached(
        &self,
        kind: MutationKind,
        entity_type: &Domain,
        id: &EntityId,
    ) -> Result<(), MutationError> {
        let detail = keys::detail(entity_type.clone(), id);
        if self.store.get(&detail).is_some() || self.cached_record(entity_type, id).is_some() {
            return Ok(());
        }
        if self.config.strict_consistency {
            return Err(self.reject(
                kind,
                MutationError::CacheInconsistency {
                    key: detail.to_string(),
                    reason: "no cached entry references this entity".to_string(),
                },
            ));
        }
        debug!(key = %detail, "Mutation target not cached, optimistic patch is a no-op");
        Ok(())
    }

    /// Returns the cached record of an entity: its detail entry, or the first
    /// list item carrying its id.
    fn cached_record(&self, entity_type: &Domain, id: &EntityId) -> Option<Value> {
        let detail = keys::detail(entity_type.clone(), id);
        if let Some(data) = self.store.data(&detail)
            && data.is_object()
        {
            return Some(data);
        }

        let lists = KeyPrefix::kind(entity_type.clone(), KeyKind::List);
        self.store.keys_matching(&lists).iter().find_map(|key| {
            let data = self.store.data(key)?;
            record::list_items(&data)?
                .iter()
                .find(|item| record::has_id(item, id))
                .cloned()
        })
    }

    /// Count keys of `entity_type` whose filters match `record`.
    fn matching_counts(&self, entity_type: &Domain, record: &Value) -> Vec<CacheKey> {
        let counts = KeyPrefix::kind(entity_type.clone(), KeyKind::Count);
        self.store
            .keys_matching(&counts)
            .into_iter()
            .filter(|key| key.params().filters_match(record, self.non_filters()))
            .collect()
    }

    fn invalidate_affected(&self, entity_type: &Domain, keep: &[CacheKey]) -> usize {
        self.graph
            .affected_prefixes(entity_type)
            .iter()
            .map(|prefix| {
                let matcher = |key: &CacheKey| prefix.matches(key) && !keep.contains(key);
                self.store.invalidate(&matcher)
            })
            .sum()
    }

    async fn perform(&self, operation: &RemoteOperation) -> Result<RemoteResponse, RemoteError> {
        debug!(
            operation = %operation,
            remote = self.remote.name(),
            "Calling remote service"
        );
        let result = self.remote.perform(operation).await;
        if let Err(error) = &result {
            debug!(operation = %operation, error = %error, "Remote operation failed");
        }
        result
    }
}
