//! Create: prepend a placeholder entity and swap it for the canonical one.

use std::collections::BTreeMap;

use optimist_core::{CacheKey, CoreError, Domain, EntityId, KeyKind, KeyPrefix, keys, record};
use optimist_remote::{RemoteError, RemoteOperation, RemoteResponse};
use serde_json::Value;
use tracing::debug;

use super::{Invocation, MutationCoordinator};
use crate::error::MutationError;
use crate::telemetry::MutationKind;

impl MutationCoordinator {
    /// Creates an entity.
    ///
    /// The fields are prepended, under a temporary id, to every cached first
    /// page whose filters they match, and the matching counts grow by one.
    /// On commit the placeholder is replaced in place by the canonical
    /// entity, so the temporary id never survives a successful create.
    pub async fn create(
        &self,
        entity_type: impl Into<Domain>,
        fields: Value,
    ) -> Result<Value, MutationError> {
        let kind = MutationKind::Create;
        let entity_type = entity_type.into();

        let object = record::require_object(&fields).map_err(|e| self.reject(kind, e))?;
        if object.contains_key(record::ID_FIELD) {
            return Err(self.reject(
                kind,
                CoreError::invalid_patch(record::ID_FIELD, "identifiers are assigned remotely"),
            ));
        }

        let temporary = EntityId::temporary();
        let mut placeholder = fields.clone();
        if let Value::Object(map) = &mut placeholder {
            map.insert(
                record::ID_FIELD.to_string(),
                Value::from(temporary.as_str()),
            );
        }

        let mut invocation = self.begin(kind, &entity_type);
        self.apply_create(&mut invocation, &entity_type, &placeholder);
        self.applied(&invocation);

        let operation = RemoteOperation::create(entity_type.clone(), fields);
        let outcome = self
            .perform(&operation)
            .await
            .and_then(RemoteResponse::into_entity)
            .and_then(|entity| match record::require_id(&entity) {
                Ok(id) => Ok((id, entity)),
                Err(e) => Err(RemoteError::MalformedResponse(e.to_string())),
            });

        match outcome {
            Ok((id, entity)) => {
                self.swap_placeholder(&entity_type, &temporary, &entity);
                let detail = keys::detail(entity_type.clone(), &id);
                self.store.set(detail.clone(), entity.clone());
                self.commit(invocation, &[detail]);
                Ok(entity)
            },
            Err(error @ RemoteError::MalformedResponse(_)) => {
                self.rollback(invocation, &error);
                // El servidor pudo haber creado la entidad igualmente
                self.invalidate_affected(&entity_type, &[]);
                Err(error.into())
            },
            Err(error) => {
                self.rollback(invocation, &error);
                Err(error.into())
            },
        }
    }

    fn apply_create(&self, invocation: &mut Invocation, entity_type: &Domain, placeholder: &Value) {
        let non_filters = self.non_filters();

        let lists = KeyPrefix::kind(entity_type.clone(), KeyKind::List);
        invocation.patch(&self.store, &lists, |key, data| {
            if !key.params().admits(placeholder, non_filters) {
                return false;
            }
            let Some(items) = record::list_items_mut(data) else {
                return false;
            };
            items.insert(0, placeholder.clone());
            record::adjust_list_total(data, 1);
            true
        });

        let deltas: BTreeMap<CacheKey, i64> = self
            .matching_counts(entity_type, placeholder)
            .into_iter()
            .map(|key| (key, 1))
            .collect();
        invocation.adjust_counts(&self.store, &deltas);

        if let Some(counters) = self.graph.status_counters(entity_type) {
            let to = placeholder.get(counters.field()).and_then(Value::as_str);
            self.apply_status_counters(invocation, entity_type, None, to);
        }
    }

    /// Replaces the placeholder with the canonical entity in the same slot.
    fn swap_placeholder(&self, entity_type: &Domain, temporary: &EntityId, entity: &Value) {
        let lists = KeyPrefix::kind(entity_type.clone(), KeyKind::List);
        let swapped = self.store.patch_many(&lists, |_, data| {
            let Some(items) = record::list_items_mut(data) else {
                return false;
            };
            match items.iter_mut().find(|item| record::has_id(item, temporary)) {
                Some(item) => {
                    *item = entity.clone();
                    true
                },
                None => false,
            }
        });
        debug!(
            temporary = %temporary,
            lists = swapped.len(),
            "Placeholder swapped for canonical entity"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use optimist_core::KeyParams;
    use optimist_remote::ScriptedRemote;
    use serde_json::json;

    use crate::config::EngineConfig;
    use crate::executor::QueryExecutor;
    use crate::invalidation::default_graph;
    use crate::metrics::EngineMetrics;
    use crate::store::CacheStore;

    fn coordinator() -> MutationCoordinator {
        let config = Arc::new(EngineConfig::default().with_background_refetch(false));
        let executor = QueryExecutor::new(CacheStore::new(), config.clone(), EngineMetrics::new());
        MutationCoordinator::new(
            executor,
            Arc::new(default_graph()),
            Arc::new(ScriptedRemote::new()),
            config,
            EngineMetrics::new(),
        )
    }

    #[test]
    fn test_placeholder_only_enters_matching_first_pages() {
        let coordinator = coordinator();
        let first = keys::list("clients", KeyParams::new().with("page", 1));
        let second = keys::list("clients", KeyParams::new().with("page", 2));
        let archived = keys::list("clients", KeyParams::new().with("status", "archived"));
        let count = keys::count("clients", KeyParams::new());
        for key in [&first, &second, &archived] {
            coordinator.store.set(key.clone(), json!([]));
        }
        coordinator.store.set(count.clone(), json!(7));

        let placeholder = json!({"id": "tmp-1", "status": "active"});
        let mut invocation = coordinator.begin(MutationKind::Create, &Domain::clients());
        coordinator.apply_create(&mut invocation, &Domain::clients(), &placeholder);

        assert_eq!(coordinator.store.data(&first), Some(json!([placeholder])));
        assert_eq!(coordinator.store.data(&second), Some(json!([])));
        assert_eq!(coordinator.store.data(&archived), Some(json!([])));
        assert_eq!(coordinator.store.data(&count), Some(json!(8)));
    }

    #[tokio::test]
    async fn test_create_rejects_client_ids() {
        let coordinator = coordinator();
        let err = coordinator
            .create("clients", json!({"id": "mine", "name": "Ann"}))
            .await
            .unwrap_err();
        assert!(err.is_validation());

        let err = coordinator.create("clients", json!([1])).await.unwrap_err();
        assert!(err.is_validation());
    }
}
