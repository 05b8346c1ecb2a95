//! Status change: an update of the status field with derived counters.

use optimist_core::{CoreError, Domain, EntityId, record};
use optimist_remote::{RemoteOperation, RemoteResponse};
use serde_json::{Map, Value};

use super::{Invocation, MutationCoordinator};
use crate::error::MutationError;
use crate::telemetry::MutationKind;

impl MutationCoordinator {
    /// Moves an entity to a new status.
    ///
    /// Behaves like [`update`](Self::update) with a patch of the status
    /// field. When the entity type has status counters registered, the
    /// counter of the old status is decremented and the counter of the new
    /// one incremented in the same patch, so a rollback restores both.
    pub async fn change_status(
        &self,
        entity_type: impl Into<Domain>,
        id: impl Into<EntityId>,
        status: impl Into<String>,
    ) -> Result<Value, MutationError> {
        let kind = MutationKind::ChangeStatus;
        let entity_type = entity_type.into();
        let id = id.into();
        let status = status.into();

        self.require_target(kind, &id)?;
        if status.trim().is_empty() {
            return Err(self.reject(kind, CoreError::invalid_patch("status", "status is blank")));
        }
        self.check_cached(kind, &entity_type, &id)?;

        let patch = self.status_patch(&entity_type, &status);
        let mut invocation = self.begin(kind, &entity_type);
        self.apply_update(&mut invocation, &entity_type, &id, &patch);
        self.applied(&invocation);

        let operation = RemoteOperation::set_status(
            entity_type.clone(),
            id.clone(),
            self.status_field(&entity_type),
            &status,
        );
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

    /// Name of the status field of `entity_type`, `status` unless its
    /// counters declare another one.
    fn status_field(&self, entity_type: &Domain) -> &str {
        self.graph
            .status_counters(entity_type)
            .map_or("status", |counters| counters.field())
    }

    /// Builds the patch setting the status field of `entity_type`.
    pub(super) fn status_patch(&self, entity_type: &Domain, status: &str) -> Value {
        let mut patch = Map::new();
        patch.insert(self.status_field(entity_type).to_string(), Value::from(status));
        Value::Object(patch)
    }

    /// Moves one unit between status counters in a single patch of the stats
    /// key. `from: None` only increments, `to: None` only decrements.
    pub(super) fn apply_status_counters(
        &self,
        invocation: &mut Invocation,
        entity_type: &Domain,
        from: Option<&str>,
        to: Option<&str>,
    ) {
        if from == to {
            return;
        }
        let Some(counters) = self.graph.status_counters(entity_type) else {
            return;
        };
        let decrement = from.and_then(|status| counters.counter_for(status));
        let increment = to.and_then(|status| counters.counter_for(status));
        if decrement.is_none() && increment.is_none() {
            return;
        }

        invocation.patch(&self.store, counters.stats_key(), |_, data| {
            let mut changed = false;
            if let Some(field) = decrement {
                changed |= record::adjust_counter(data, field, -1);
            }
            if let Some(field) = increment {
                changed |= record::adjust_counter(data, field, 1);
            }
            changed
        });
    }
}
