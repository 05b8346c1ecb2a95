//! Remote response types.

use optimist_core::EntityId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RemoteError;

/// A successful answer from the remote service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum RemoteResponse {
    /// The canonical post-mutation entity (or `null` after a delete).
    Entity(Value),
    /// Per-identifier outcome of a bulk operation.
    Bulk(BulkReport),
}

impl RemoteResponse {
    /// Returns the entity of an `Entity` response.
    pub fn into_entity(self) -> Result<Value, RemoteError> {
        match self {
            RemoteResponse::Entity(value) => Ok(value),
            RemoteResponse::Bulk(_) => Err(RemoteError::MalformedResponse(
                "expected an entity, got a bulk report".to_string(),
            )),
        }
    }
}

/// A failed identifier within a bulk operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkFailure {
    pub id: EntityId,
    pub message: String,
}

/// Outcome of a bulk operation, per identifier.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BulkReport {
    /// Identifiers the service applied the action to.
    pub succeeded: Vec<EntityId>,
    /// Identifiers the service refused.
    pub failed: Vec<BulkFailure>,
    /// Canonical entities after the action, when the service returns them.
    #[serde(default)]
    pub entities: Vec<Value>,
}

impl BulkReport {
    /// A report where every identifier succeeded.
    pub fn all_succeeded(ids: &[EntityId]) -> Self {
        Self {
            succeeded: ids.to_vec(),
            failed: Vec::new(),
            entities: Vec::new(),
        }
    }

    /// Returns true if no identifier failed.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Converts an incomplete report into `RemoteError::PartialFailure`.
    pub fn into_result(self) -> Result<BulkReport, RemoteError> {
        if self.is_complete() {
            return Ok(self);
        }
        Err(RemoteError::PartialFailure {
            succeeded: self.succeeded,
            failed: self.failed.into_iter().map(|f| f.id).collect(),
        })
    }
}
