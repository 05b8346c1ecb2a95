//! Bulk: one action over many entities, committed or rolled back as a unit.

use std::collections::HashSet;

use optimist_core::{CoreError, Domain, EntityId, keys, record};
use optimist_remote::{BulkReport, RemoteError, RemoteOperation, RemoteResponse};

use super::{BulkAction, MutationCoordinator};
use crate::error::MutationError;
use crate::telemetry::MutationKind;

impl MutationCoordinator {
    /// Applies `action` to every id under a single invocation.
    ///
    /// The cache never keeps a partial bulk: if the remote service reports
    /// that some ids failed, every optimistic patch is rolled back, the
    /// affected prefixes are invalidated (the ids that succeeded did change
    /// remotely) and `PartialBulkFailure` is returned.
    pub async fn bulk(
        &self,
        entity_type: impl Into<Domain>,
        ids: Vec<EntityId>,
        action: BulkAction,
    ) -> Result<BulkReport, MutationError> {
        let kind = MutationKind::Bulk;
        let entity_type = entity_type.into();

        self.validate_bulk(&ids, &action)
            .map_err(|e| self.reject(kind, e))?;
        for id in &ids {
            self.check_cached(kind, &entity_type, id)?;
        }

        let mut invocation = self.begin(kind, &entity_type);
        match &action {
            BulkAction::Update { patch } => {
                for id in &ids {
                    self.apply_update(&mut invocation, &entity_type, id, patch);
                }
            },
            BulkAction::Delete => {
                for id in &ids {
                    self.apply_delete(&mut invocation, &entity_type, id);
                }
            },
            BulkAction::ChangeStatus { status } => {
                let patch = self.status_patch(&entity_type, status);
                for id in &ids {
                    self.apply_update(&mut invocation, &entity_type, id, &patch);
                }
            },
        }
        self.applied(&invocation);

        let operation = RemoteOperation::bulk(entity_type.clone(), &ids, action.payload());
        let outcome = self
            .perform(&operation)
            .await
            .and_then(|response| match response {
                RemoteResponse::Bulk(report) => report.into_result(),
                RemoteResponse::Entity(_) => Err(RemoteError::MalformedResponse(
                    "expected a bulk report, got an entity".to_string(),
                )),
            });

        match outcome {
            Ok(report) => {
                let mut keep = Vec::new();
                if action == BulkAction::Delete {
                    for id in &ids {
                        self.store.remove(&keys::detail(entity_type.clone(), id));
                    }
                } else {
                    for entity in &report.entities {
                        if let Some(id) = record::id_of(entity) {
                            keep.extend(self.write_canonical(&entity_type, &id, entity));
                        }
                    }
                }
                self.commit(invocation, &keep);
                Ok(report)
            },
            Err(RemoteError::PartialFailure { succeeded, failed }) => {
                let error = MutationError::PartialBulkFailure { succeeded, failed };
                self.rollback(invocation, &error);
                self.invalidate_affected(&entity_type, &[]);
                Err(error)
            },
            Err(error) => {
                self.rollback(invocation, &error);
                Err(error.into())
            },
        }
    }

    fn validate_bulk(&self, ids: &[EntityId], action: &BulkAction) -> Result<(), CoreError> {
        if ids.is_empty() {
            return Err(CoreError::invalid_record("bulk operation without ids"));
        }
        let mut seen = HashSet::new();
        for id in ids {
            if id.is_blank() {
                return Err(CoreError::invalid_record("entity id is blank"));
            }
            if !seen.insert(id) {
                return Err(CoreError::invalid_record(format!("duplicate id '{}'", id)));
            }
        }
        match action {
            BulkAction::Update { patch } => record::validate_patch(patch),
            BulkAction::ChangeStatus { status } if status.trim().is_empty() => {
                Err(CoreError::invalid_patch("status", "status is blank"))
            },
            _ => Ok(()),
        }
    }
}
