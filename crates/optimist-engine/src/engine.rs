//! Engine facade: the only entry points UI code uses.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use optimist_core::{CacheKey, Domain, EntityId};
use optimist_remote::{BulkReport, RemoteService};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::info;

use crate::config::EngineConfig;
use crate::coordinator::{BulkAction, Mutation, MutationCoordinator};
use crate::error::{FetchError, MutationError};
use crate::executor::{QueryExecutor, QueryView, ReadOptions};
use crate::invalidation::InvalidationGraph;
use crate::metrics::EngineMetrics;
use crate::store::{CacheEntry, CacheStore};
use crate::telemetry::{TelemetrySink, TracingSink};

/// One optimistic cache session.
///
/// Built once at startup and torn down with [`clear`](Self::clear) on
/// logout. Cloning is cheap and yields a handle to the same session.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use optimist_core::{keys, Domain, KeyParams};
/// use optimist_engine::{default_graph, EngineConfig, OptimistEngine, ReadOptions};
/// use optimist_remote::ScriptedRemote;
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let remote = Arc::new(ScriptedRemote::new().with_record(json!({"id": "7", "name": "A"})));
/// let engine = OptimistEngine::new(EngineConfig::default(), remote, default_graph());
///
/// let key = keys::detail(Domain::clients(), &"7".into());
/// engine
///     .read(key.clone(), || async { Ok(json!({"id": "7", "name": "A"})) }, ReadOptions::new())
///     .await
///     .unwrap();
///
/// let entity = engine.update("clients", "7", json!({"name": "B"})).await.unwrap();
/// assert_eq!(entity["name"], json!("B"));
/// assert_eq!(engine.entry(&key).unwrap().data().unwrap()["name"], json!("B"));
/// # }
/// ```
#[derive(Clone)]
pub struct OptimistEngine {
    store: CacheStore,
    executor: QueryExecutor,
    coordinator: Arc<MutationCoordinator>,
    config: Arc<EngineConfig>,
    metrics: EngineMetrics,
}

impl OptimistEngine {
    /// Creates a session with tracing telemetry.
    pub fn new(
        config: EngineConfig,
        remote: Arc<dyn RemoteService>,
        graph: InvalidationGraph,
    ) -> Self {
        Self::with_telemetry(config, remote, graph, Arc::new(TracingSink))
    }

    /// Creates a session delivering mutation events to `telemetry`.
    pub fn with_telemetry(
        config: EngineConfig,
        remote: Arc<dyn RemoteService>,
        graph: InvalidationGraph,
        telemetry: Arc<dyn TelemetrySink>,
    ) -> Self {
        let config = Arc::new(config);
        let metrics = EngineMetrics::new();
        let store = CacheStore::new();
        let executor = QueryExecutor::new(store.clone(), config.clone(), metrics.clone());

        info!(
            remote = remote.name(),
            entities = graph.entities().count(),
            "Optimist engine started"
        );

        let coordinator = MutationCoordinator::new(
            executor.clone(),
            Arc::new(graph),
            remote,
            config.clone(),
            metrics.clone(),
        )
        .with_telemetry(telemetry);

        Self {
            store,
            executor,
            coordinator: Arc::new(coordinator),
            config,
            metrics,
        }
    }

    /// Reads `key`, fetching it with `fetch` if it is not fresh.
    pub async fn read<F, Fut>(
        &self,
        key: CacheKey,
        fetch: F,
        options: ReadOptions,
    ) -> Result<Value, FetchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, FetchError>> + Send + 'static,
    {
        self.executor.read(key, fetch, options).await
    }

    /// Reads `key` and decodes it into `T`.
    pub async fn read_as<T, F, Fut>(
        &self,
        key: CacheKey,
        fetch: F,
        options: ReadOptions,
    ) -> Result<T, FetchError>
    where
        T: DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, FetchError>> + Send + 'static,
    {
        self.executor.read_as(key, fetch, options).await
    }

    pub fn prefetch<F, Fut>(&self, key: CacheKey, fetch: F, options: ReadOptions) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, FetchError>> + Send + 'static,
    {
        self.executor.prefetch(key, fetch, options)
    }

    /// Returns what should be rendered for `key` right now.
    pub fn view(&self, key: &CacheKey, options: &ReadOptions) -> QueryView {
        self.executor.view(key, options)
    }

    /// Registers an active query for background refetch.
    pub fn register<F, Fut>(&self, key: CacheKey, fetch: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, FetchError>> + Send + 'static,
    {
        self.executor.register(key, fetch);
    }

    pub fn unregister(&self, key: &CacheKey) -> bool {
        self.executor.unregister(key)
    }

    /// Refetches every stale active query and waits for them.
    pub async fn refetch_stale(&self) -> usize {
        self.executor.refetch_stale().await
    }

    /// Runs a mutation.
    pub async fn mutate(&self, mutation: Mutation) -> Result<Value, MutationError> {
        self.coordinator.mutate(mutation).await
    }

    pub async fn create(
        &self,
        entity_type: impl Into<Domain>,
        fields: Value,
    ) -> Result<Value, MutationError> {
        self.coordinator.create(entity_type, fields).await
    }

    pub async fn update(
        &self,
        entity_type: impl Into<Domain>,
        id: impl Into<EntityId>,
        patch: Value,
    ) -> Result<Value, MutationError> {
        self.coordinator.update(entity_type, id, patch).await
    }

    pub async fn delete(
        &self,
        entity_type: impl Into<Domain>,
        id: impl Into<EntityId>,
    ) -> Result<Value, MutationError> {
        self.coordinator.delete(entity_type, id).await
    }

    pub async fn change_status(
        &self,
        entity_type: impl Into<Domain>,
        id: impl Into<EntityId>,
        status: impl Into<String>,
    ) -> Result<Value, MutationError> {
        self.coordinator.change_status(entity_type, id, status).await
    }

    pub async fn bulk(
        &self,
        entity_type: impl Into<Domain>,
        ids: Vec<EntityId>,
        action: BulkAction,
    ) -> Result<BulkReport, MutationError> {
        self.coordinator.bulk(entity_type, ids, action).await
    }

    /// Returns a copy of the entry for `key`.
    pub fn entry(&self, key: &CacheKey) -> Option<CacheEntry> {
        self.store.get(key)
    }

    /// Returns a copy of every entry, ordered by key.
    pub fn snapshot(&self) -> BTreeMap<CacheKey, CacheEntry> {
        self.store.entries()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Ends the session: forgets active queries and drops every entry.
    pub fn clear(&self) {
        self.executor.clear();
        self.store.clear();
        info!("Optimist engine cleared");
    }
}
