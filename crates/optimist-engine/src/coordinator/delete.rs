//! Delete: remove an entity from every cached collection.

use std::collections::BTreeMap;

use optimist_core::{CacheKey, Domain, EntityId, KeyKind, KeyPrefix, keys, record};
use optimist_remote::{RemoteOperation, RemoteResponse};
use serde_json::Value;

use super::{Invocation, MutationCoordinator};
use crate::error::MutationError;
use crate::telemetry::MutationKind;

impl MutationCoordinator {
    /// Removes the entity from every cached list and decrements the paired
    /// counts, then asks the remote service to delete it.
    ///
    /// The detail entry is only dropped once the remote service confirms.
    /// On failure every list comes back with its original ordering.
    pub async fn delete(
        &self,
        entity_type: impl Into<Domain>,
        id: impl Into<EntityId>,
    ) -> Result<Value, MutationError> {
        let kind = MutationKind::Delete;
        let entity_type = entity_type.into();
        let id = id.into();

        self.require_target(kind, &id)?;
        self.check_cached(kind, &entity_type, &id)?;

        let mut invocation = self.begin(kind, &entity_type);
        self.apply_delete(&mut invocation, &entity_type, &id);
        self.applied(&invocation);

        let operation = RemoteOperation::delete(entity_type.clone(), id.clone());
        match self
            .perform(&operation)
            .await
            .and_then(RemoteResponse::into_entity)
        {
            Ok(response) => {
                self.store.remove(&keys::detail(entity_type.clone(), &id));
                self.commit(invocation, &[]);
                Ok(response)
            },
            Err(error) => {
                self.rollback(invocation, &error);
                Err(error.into())
            },
        }
    }

    /// Optimistic step shared by delete and bulk delete.
    pub(super) fn apply_delete(
        &self,
        invocation: &mut Invocation,
        entity_type: &Domain,
        id: &EntityId,
    ) {
        let before = self.cached_record(entity_type, id);

        let mut emptied = Vec::new();
        let lists = KeyPrefix::kind(entity_type.clone(), KeyKind::List);
        invocation.patch(&self.store, &lists, |key, data| {
            let Some(items) = record::list_items_mut(data) else {
                return false;
            };
            let len = items.len();
            items.retain(|item| !record::has_id(item, id));
            let removed = (len - items.len()) as i64;
            if removed == 0 {
                return false;
            }
            record::adjust_list_total(data, -removed);
            emptied.push(key.clone());
            true
        });

        let mut deltas: BTreeMap<CacheKey, i64> = emptied
            .iter()
            .filter_map(CacheKey::paired_count)
            .map(|key| (key, -1))
            .collect();
        if let Some(before) = &before {
            for key in self.matching_counts(entity_type, before) {
                deltas.entry(key).or_insert(-1);
            }
        }
        invocation.adjust_counts(&self.store, &deltas);

        if let Some(counters) = self.graph.status_counters(entity_type) {
            let from = before
                .as_ref()
                .and_then(|record| record.get(counters.field()))
                .and_then(Value::as_str);
            self.apply_status_counters(invocation, entity_type, from, None);
        }
    }
}
