//! Invalidation graph: which cache regions depend on which entity types.
//!
//! The graph is configured explicitly and is immutable once built. It never
//! infers dependencies from data.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use optimist_core::{CacheKey, Domain, KeyKind, KeyPrefix, keys};

/// Aggregate counters tracking how many entities sit in each status.
///
/// # Example
///
/// ```
/// use optimist_core::{keys, Domain};
/// use optimist_engine::invalidation::StatusCounters;
///
/// let counters = StatusCounters::new(keys::stats(Domain::dashboard(), "summary"))
///     .counter("pending", "pendingProfessionals")
///     .counter("verified", "verifiedProfessionals");
///
/// assert_eq!(counters.counter_for("pending"), Some("pendingProfessionals"));
/// assert_eq!(counters.counter_for("rejected"), None);
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct StatusCounters {
    stats_key: CacheKey,
    status_field: String,
    counters: BTreeMap<String, String>,
}

impl StatusCounters {
    /// Default record field holding the status.
    pub const DEFAULT_STATUS_FIELD: &'static str = "status";

    /// Creates an empty registry backed by the given stats key.
    pub fn new(stats_key: CacheKey) -> Self {
        Self {
            stats_key,
            status_field: Self::DEFAULT_STATUS_FIELD.to_string(),
            counters: BTreeMap::new(),
        }
    }

    /// Overrides the record field holding the status.
    pub fn status_field(mut self, field: impl Into<String>) -> Self {
        self.status_field = field.into();
        self
    }

    /// Maps a status value to the counter field tracking it.
    pub fn counter(mut self, status: impl Into<String>, field: impl Into<String>) -> Self {
        self.counters.insert(status.into(), field.into());
        self
    }

    /// Returns the stats key holding the counters.
    pub fn stats_key(&self) -> &CacheKey {
        &self.stats_key
    }

    /// Returns the record field holding the status.
    pub fn field(&self) -> &str {
        &self.status_field
    }

    /// Returns the counter field for a status, if tracked.
    pub fn counter_for(&self, status: &str) -> Option<&str> {
        self.counters.get(status).map(String::as_str)
    }
}

#[derive(Debug, Clone, Default)]
struct EntityNode {
    dependents: Vec<KeyPrefix>,
    status_counters: Option<StatusCounters>,
}

/// Immutable dependency map from entity types to cache regions.
#[derive(Debug, Clone, Default)]
pub struct InvalidationGraph {
    nodes: IndexMap<Domain, EntityNode>,
}

impl InvalidationGraph {
    pub fn builder() -> InvalidationGraphBuilder {
        InvalidationGraphBuilder::default()
    }

    /// Returns every key prefix that must be invalidated after a committed
    /// mutation of `entity`: the entity's own domain plus its registered
    /// dependents. Prefixes covered by another returned prefix are omitted.
    pub fn affected_prefixes(&self, entity: &Domain) -> Vec<KeyPrefix> {
        let mut prefixes = vec![KeyPrefix::domain(entity.clone())];

        if let Some(node) = self.nodes.get(entity) {
            for prefix in &node.dependents {
                if !prefixes.iter().any(|p| p.covers(prefix)) {
                    prefixes.retain(|p| !prefix.covers(p));
                    prefixes.push(prefix.clone());
                }
            }
        }

        prefixes
    }

    /// Returns the explicitly registered dependents of an entity type.
    pub fn dependents(&self, entity: &Domain) -> &[KeyPrefix] {
        self.nodes
            .get(entity)
            .map(|node| node.dependents.as_slice())
            .unwrap_or_default()
    }

    /// Returns the status counters registered for an entity type.
    pub fn status_counters(&self, entity: &Domain) -> Option<&StatusCounters> {
        self.nodes.get(entity)?.status_counters.as_ref()
    }

    /// Returns true if the entity type was registered.
    pub fn contains(&self, entity: &Domain) -> bool {
        self.nodes.contains_key(entity)
    }

    /// Iterates over registered entity types in registration order.
    pub fn entities(&self) -> impl Iterator<Item = &Domain> {
        self.nodes.keys()
    }
}

/// Builder for [`InvalidationGraph`].
#[derive(Debug, Default)]
pub struct InvalidationGraphBuilder {
    nodes: IndexMap<Domain, EntityNode>,
}

impl InvalidationGraphBuilder {
    /// Registers an entity type with no dependents.
    pub fn entity(mut self, entity: impl Into<Domain>) -> Self {
        self.nodes.entry(entity.into()).or_default();
        self
    }

    /// Declares that `prefix` holds data derived from `entity`.
    pub fn depends(mut self, entity: impl Into<Domain>, prefix: KeyPrefix) -> Self {
        let node = self.nodes.entry(entity.into()).or_default();
        if !node.dependents.contains(&prefix) {
            node.dependents.push(prefix);
        }
        self
    }

    /// Registers status counters for an entity type.
    pub fn status_counters(mut self, entity: impl Into<Domain>, counters: StatusCounters) -> Self {
        self.nodes.entry(entity.into()).or_default().status_counters = Some(counters);
        self
    }

    pub fn build(self) -> InvalidationGraph {
        InvalidationGraph { nodes: self.nodes }
    }
}

/// Graph of the scheduling back-office domains.
///
/// - `clients` feed dashboard aggregates and appointment lists;
/// - `professionals` feed dashboard aggregates and every appointment query,
///   and carry `pending`/`verified` counters on `dashboard:stats:summary`;
/// - `appointments` feed dashboard aggregates.
pub fn default_graph() -> InvalidationGraph {
    let dashboard = KeyPrefix::domain(Domain::dashboard());

    InvalidationGraph::builder()
        .entity(Domain::dashboard())
        .depends(Domain::clients(), dashboard.clone())
        .depends(
            Domain::clients(),
            KeyPrefix::kind(Domain::appointments(), KeyKind::List),
        )
        .depends(Domain::professionals(), dashboard.clone())
        .depends(Domain::professionals(), KeyPrefix::domain(Domain::appointments()))
        .status_counters(
            Domain::professionals(),
            StatusCounters::new(keys::stats(Domain::dashboard(), "summary"))
                .counter("pending", "pendingProfessionals")
                .counter("verified", "verifiedProfessionals"),
        )
        .depends(Domain::appointments(), dashboard)
        .build()
}
