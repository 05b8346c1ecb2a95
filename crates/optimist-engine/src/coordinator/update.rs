//! Update: merge a partial patch into an existing entity.

use std::collections::BTreeMap;

use optimist_core::{CacheKey, Domain, EntityId, KeyKind, KeyPrefix, keys, record};
use optimist_remote::{RemoteOperation, RemoteResponse};
use serde_json::Value;

use super::{Invocation, MutationCoordinator};
use crate::error::MutationError;
use crate::telemetry::MutationKind;

impl MutationCoordinator {
    /// Merges `patch` into the entity everywhere it is cached, then asks the
    /// remote service to apply it.
    ///
    /// Fields absent from the patch are preserved. A list whose filters no
    /// longer match the patched entity drops it. Returns the canonical
    /// entity.
    pub async fn update(
        &self,
        entity_type: impl Into<Domain>,
        id: impl Into<EntityId>,
        patch: Value,
    ) -> Result<Value, MutationError> {
        let kind = MutationKind::Update;
        let entity_type = entity_type.into();
        let id = id.into();

        self.require_target(kind, &id)?;
        record::validate_patch(&patch).map_err(|e| self.reject(kind, e))?;
        self.check_cached(kind, &entity_type, &id)?;

        let mut invocation = self.begin(kind, &entity_type);
        self.apply_update(&mut invocation, &entity_type, &id, &patch);
        self.applied(&invocation);

        let operation = RemoteOperation::update(entity_type.clone(), id.clone(), patch);
        match self
            .perform(&operation)
            .await
            .and_then(RemoteResponse::into_entity)
        {
            Ok(entity) => {
                let keep = self.write_canonical(&entity_type, &id, &entity);
                self.commit(invocation, &keep);
                Ok(entity)
            },
            Err(error) => {
                self.rollback(invocation, &error);
                Err(error.into())
            },
        }
    }

    /// Optimistic step shared by update, status change and bulk.
    pub(super) fn apply_update(
        &self,
        invocation: &mut Invocation,
        entity_type: &Domain,
        id: &EntityId,
        patch: &Value,
    ) {
        let before = self.cached_record(entity_type, id);
        let non_filters = self.non_filters();

        let detail = keys::detail(entity_type.clone(), id);
        invocation.patch(&self.store, &detail, |_, data| {
            let original = data.clone();
            record::merge_patch(data, patch);
            *data != original
        });

        let mut dropped_from = Vec::new();
        let lists = KeyPrefix::kind(entity_type.clone(), KeyKind::List);
        invocation.patch(&self.store, &lists, |key, data| {
            let Some(items) = record::list_items_mut(data) else {
                return false;
            };
            let Some(pos) = items.iter().position(|item| record::has_id(item, id)) else {
                return false;
            };
            let mut updated = items[pos].clone();
            record::merge_patch(&mut updated, patch);
            if updated == items[pos] {
                return false;
            }
            // Solo sale de la lista si antes cumplia los filtros y ya no
            let was = key.params().filters_match(&items[pos], non_filters);
            let is = key.params().filters_match(&updated, non_filters);
            if was && !is {
                items.remove(pos);
                record::adjust_list_total(data, -1);
                dropped_from.push(key.clone());
            } else {
                items[pos] = updated;
            }
            true
        });

        // Counts siguen a los filtros: entra o sale segun el registro nuevo
        let mut deltas: BTreeMap<CacheKey, i64> = BTreeMap::new();
        if let Some(before) = &before {
            let mut after = before.clone();
            record::merge_patch(&mut after, patch);
            let counts = KeyPrefix::kind(entity_type.clone(), KeyKind::Count);
            for key in self.store.keys_matching(&counts) {
                let was = key.params().filters_match(before, non_filters);
                let is = key.params().filters_match(&after, non_filters);
                if was != is {
                    deltas.insert(key, if is { 1 } else { -1 });
                }
            }
        }
        for key in dropped_from.iter().filter_map(CacheKey::paired_count) {
            deltas.entry(key).or_insert(-1);
        }
        invocation.adjust_counts(&self.store, &deltas);

        if let Some(counters) = self.graph.status_counters(entity_type)
            && let Some(to) = patch.get(counters.field()).and_then(Value::as_str)
        {
            let from = before
                .as_ref()
                .and_then(|record| record.get(counters.field()))
                .and_then(Value::as_str);
            if let Some(from) = from {
                self.apply_status_counters(invocation, entity_type, Some(from), Some(to));
            }
        }
    }

    /// Writes the server-confirmed entity into its detail entry and every
    /// list item carrying its id. Returns the keys now holding server truth.
    pub(super) fn write_canonical(
        &self,
        entity_type: &Domain,
        id: &EntityId,
        entity: &Value,
    ) -> Vec<CacheKey> {
        if !record::has_id(entity, id) {
            return Vec::new();
        }

        let lists = KeyPrefix::kind(entity_type.clone(), KeyKind::List);
        let _ = self.store.patch_many(&lists, |_, data| {
            let Some(items) = record::list_items_mut(data) else {
                return false;
            };
            match items.iter_mut().find(|item| record::has_id(item, id)) {
                Some(item) if item != entity => {
                    *item = entity.clone();
                    true
                },
                _ => false,
            }
        });

        let detail = keys::detail(entity_type.clone(), id);
        self.store.set(detail.clone(), entity.clone());
        vec![detail]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use optimist_core::KeyParams;
    use optimist_remote::{RemoteError, ScriptedRemote};
    use serde_json::json;

    use crate::config::EngineConfig;
    use crate::executor::QueryExecutor;
    use crate::invalidation::default_graph;
    use crate::metrics::EngineMetrics;
    use crate::store::CacheStore;

    fn coordinator(remote: Arc<ScriptedRemote>) -> MutationCoordinator {
        let config = Arc::new(EngineConfig::default().with_background_refetch(false));
        let executor = QueryExecutor::new(CacheStore::new(), config.clone(), EngineMetrics::new());
        MutationCoordinator::new(
            executor,
            Arc::new(default_graph()),
            remote,
            config,
            EngineMetrics::new(),
        )
    }

    #[tokio::test]
    async fn test_update_rejects_invalid_patch_without_touching_cache() {
        let remote = Arc::new(ScriptedRemote::new());
        let coordinator = coordinator(remote.clone());
        let detail = keys::detail("clients", &EntityId::new("1"));
        coordinator.store.set(detail.clone(), json!({"id": "1", "name": "A"}));
        let before = coordinator.store.entries();

        let err = coordinator
            .update("clients", "1", json!({"id": "2"}))
            .await
            .unwrap_err();

        assert!(err.is_validation());
        assert_eq!(coordinator.store.entries(), before);
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_update_drops_item_from_lists_it_no_longer_matches() {
        let remote = Arc::new(ScriptedRemote::new());
        remote.push_outcome(Err(RemoteError::unavailable("offline")));
        let coordinator = coordinator(remote);

        let active = keys::list("clients", KeyParams::new().with("status", "active"));
        let active_count = keys::count("clients", KeyParams::new().with("status", "active"));
        coordinator.store.set(
            active.clone(),
            json!({"items": [{"id": "1", "status": "active"}], "total": 1}),
        );
        coordinator.store.set(active_count.clone(), json!(1));
        let before = coordinator.store.entries();

        let mut invocation = coordinator.begin(MutationKind::Update, &Domain::clients());
        coordinator.apply_update(
            &mut invocation,
            &Domain::clients(),
            &EntityId::new("1"),
            &json!({"status": "archived"}),
        );

        assert_eq!(
            coordinator.store.data(&active),
            Some(json!({"items": [], "total": 0}))
        );
        assert_eq!(coordinator.store.data(&active_count), Some(json!(0)));

        coordinator.rollback(invocation, &"offline");
        assert_eq!(coordinator.store.entries(), before);
    }

    #[tokio::test]
    async fn test_write_canonical_ignores_foreign_entities() {
        let coordinator = coordinator(Arc::new(ScriptedRemote::new()));
        let keep = coordinator.write_canonical(
            &Domain::clients(),
            &EntityId::new("1"),
            &json!({"id": "2"}),
        );
        assert!(keep.is_empty());
        assert!(coordinator.store.is_empty());
    }
}
