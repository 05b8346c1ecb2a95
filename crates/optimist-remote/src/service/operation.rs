//! Remote operation types.

use optimist_core::{Domain, EntityId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::fmt;
use uuid::Uuid;

/// Name of a remote operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationName {
    Create,
    Update,
    Delete,
    SetStatus,
    Bulk,
}

impl OperationName {
    /// Returns the wire name of the operation.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationName::Create => "create",
            OperationName::Update => "update",
            OperationName::Delete => "delete",
            OperationName::SetStatus => "set_status",
            OperationName::Bulk => "bulk",
        }
    }
}

impl fmt::Display for OperationName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single invocation of a remote operation.
///
/// Each invocation carries a fresh idempotency key, so a service can
/// deduplicate replays of the same request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteOperation {
    /// The operation to perform.
    name: OperationName,

    /// The entity type the operation targets.
    entity_type: Domain,

    /// The target entity, absent for creates and bulk operations.
    target: Option<EntityId>,

    /// Operation payload (fields, patch, status, or bulk description).
    payload: Value,

    /// Unique per invocation.
    idempotency_key: String,
}

impl RemoteOperation {
    /// Creates a new operation with a fresh idempotency key.
    pub fn new(
        name: OperationName,
        entity_type: impl Into<Domain>,
        target: Option<EntityId>,
        payload: Value,
    ) -> Self {
        Self {
            name,
            entity_type: entity_type.into(),
            target,
            payload,
            idempotency_key: Uuid::now_v7().to_string(),
        }
    }

    /// Operation creating an entity from `fields`.
    ///
    /// # Example
    ///
    /// ```
    /// use optimist_remote::{OperationName, RemoteOperation};
    /// use serde_json::json;
    ///
    /// let op = RemoteOperation::create("clients", json!({"name": "Ann"}));
    /// assert_eq!(op.name(), OperationName::Create);
    /// assert!(op.target().is_none());
    /// ```
    pub fn create(entity_type: impl Into<Domain>, fields: Value) -> Self {
        Self::new(OperationName::Create, entity_type, None, fields)
    }

    /// Operation applying a partial patch to an entity.
    pub fn update(entity_type: impl Into<Domain>, id: EntityId, patch: Value) -> Self {
        Self::new(OperationName::Update, entity_type, Some(id), patch)
    }

    /// Operation deleting an entity.
    pub fn delete(entity_type: impl Into<Domain>, id: EntityId) -> Self {
        Self::new(OperationName::Delete, entity_type, Some(id), Value::Null)
    }

    /// Operation moving an entity to a new status. `field` names the
    /// entity's status field (`status`, `state`, ...).
    pub fn set_status(entity_type: impl Into<Domain>, id: EntityId, field: &str, status: &str) -> Self {
        let mut payload = Map::new();
        payload.insert(field.to_string(), Value::from(status));
        Self::new(OperationName::SetStatus, entity_type, Some(id), Value::Object(payload))
    }

    /// Operation applying one action to many entities.
    pub fn bulk(entity_type: impl Into<Domain>, ids: &[EntityId], action: Value) -> Self {
        Self::new(
            OperationName::Bulk,
            entity_type,
            None,
            json!({ "ids": ids, "action": action }),
        )
    }

    /// Returns the operation name.
    pub fn name(&self) -> OperationName {
        self.name
    }

    /// Returns the entity type.
    pub fn entity_type(&self) -> &Domain {
        &self.entity_type
    }

    /// Returns the target entity if any.
    pub fn target(&self) -> Option<&EntityId> {
        self.target.as_ref()
    }

    /// Returns the payload.
    pub fn payload(&self) -> &Value {
        &self.payload
    }

    /// Returns the idempotency key.
    pub fn idempotency_key(&self) -> &str {
        &self.idempotency_key
    }
}

impl fmt::Display for RemoteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.entity_type, self.name)?;
        if let Some(target) = &self.target {
            write!(f, "/{}", target)?;
        }
        Ok(())
    }
}
