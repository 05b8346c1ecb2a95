//! In-memory remote service for tests and demos.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use optimist_core::{EntityId, record};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::watch;
use tracing::debug;

use crate::error::RemoteError;
use crate::service::{BulkReport, OperationName, RemoteOperation, RemoteResponse, RemoteService};

type Outcome = Result<RemoteResponse, RemoteError>;

/// A remote service backed by an in-memory record table.
///
/// Outcomes pushed with [`ScriptedRemote::push_outcome`] are returned first,
/// in order. When the script is empty the service behaves like a tiny
/// backend: creates get a server id (`srv-N`), updates and status changes
/// are merged into the stored record, deletes remove it and bulk operations
/// succeed for every identifier.
///
/// The service can be held closed so callers can observe what happens
/// while an operation is in flight.
///
/// # Example
///
/// ```
/// use optimist_remote::{RemoteError, RemoteOperation, RemoteService, ScriptedRemote};
/// use serde_json::json;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let remote = ScriptedRemote::new();
/// remote.push_outcome(Err(RemoteError::unavailable("offline")));
///
/// let op = RemoteOperation::create("clients", json!({"name": "Ann"}));
/// assert!(remote.perform(&op).await.is_err());
/// assert!(remote.perform(&op).await.is_ok());
/// assert_eq!(remote.calls().len(), 2);
/// # }
/// ```
pub struct ScriptedRemote {
    script: Mutex<VecDeque<Outcome>>,
    records: Mutex<HashMap<EntityId, Value>>,
    calls: Mutex<Vec<RemoteOperation>>,
    call_count: watch::Sender<usize>,
    gate: watch::Sender<bool>,
    next_id: AtomicU64,
}

impl ScriptedRemote {
    /// Creates an open service with an empty script.
    pub fn new() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            records: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            call_count: watch::Sender::new(0),
            gate: watch::Sender::new(true),
            next_id: AtomicU64::new(1),
        }
    }

    /// Seeds the backing table with a record.
    pub fn with_record(self, value: Value) -> Self {
        if let Some(id) = record::id_of(&value) {
            self.records.lock().insert(id, value);
        }
        self
    }

    /// Queues an outcome for the next call.
    pub fn push_outcome(&self, outcome: Outcome) {
        self.script.lock().push_back(outcome);
    }

    /// Holds every subsequent call until [`release`](Self::release).
    pub fn hold(&self) {
        self.gate.send_replace(false);
    }

    /// Lets held and future calls through.
    pub fn release(&self) {
        self.gate.send_replace(true);
    }

    /// Waits until at least `n` calls have reached the service.
    pub async fn wait_for_calls(&self, n: usize) {
        let mut rx = self.call_count.subscribe();
        let _ = rx.wait_for(|count| *count >= n).await;
    }

    /// Returns every operation received so far.
    pub fn calls(&self) -> Vec<RemoteOperation> {
        self.calls.lock().clone()
    }

    /// Returns the stored record for an id.
    pub fn record(&self, id: &EntityId) -> Option<Value> {
        self.records.lock().get(id).cloned()
    }

    fn apply(&self, op: &RemoteOperation) -> Outcome {
        let mut records = self.records.lock();
        match op.name() {
            OperationName::Create => {
                let id = EntityId::new(format!(
                    "srv-{}",
                    self.next_id.fetch_add(1, Ordering::SeqCst)
                ));
                let mut entity = op.payload().clone();
                if let Value::Object(fields) = &mut entity {
                    fields.insert(record::ID_FIELD.to_string(), Value::from(id.as_str()));
                }
                records.insert(id, entity.clone());
                Ok(RemoteResponse::Entity(entity))
            },
            OperationName::Update | OperationName::SetStatus => {
                let id = op
                    .target()
                    .cloned()
                    .ok_or_else(|| RemoteError::MalformedResponse("missing target".into()))?;
                let entity = records.entry(id.clone()).or_insert_with(|| {
                    let mut fields = serde_json::Map::new();
                    fields.insert(record::ID_FIELD.to_string(), Value::from(id.as_str()));
                    Value::Object(fields)
                });
                record::merge_patch(entity, op.payload());
                Ok(RemoteResponse::Entity(entity.clone()))
            },
            OperationName::Delete => {
                if let Some(id) = op.target() {
                    records.remove(id);
                }
                Ok(RemoteResponse::Entity(Value::Null))
            },
            OperationName::Bulk => {
                let ids: Vec<EntityId> =
                    serde_json::from_value(op.payload()["ids"].clone()).unwrap_or_default();
                Ok(RemoteResponse::Bulk(BulkReport::all_succeeded(&ids)))
            },
        }
    }
}

impl Default for ScriptedRemote {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteService for ScriptedRemote {
    async fn perform(&self, op: &RemoteOperation) -> Result<RemoteResponse, RemoteError> {
        self.calls.lock().push(op.clone());
        self.call_count.send_modify(|count| *count += 1);
        debug!(operation = %op, "Scripted remote received operation");

        let mut gate = self.gate.subscribe();
        let _ = gate.wait_for(|open| *open).await;

        let scripted = self.script.lock().pop_front();
        match scripted {
            Some(outcome) => outcome,
            None => self.apply(op),
        }
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_create_assigns_server_id() {
        let remote = ScriptedRemote::new();
        let op = RemoteOperation::create("clients", json!({"name": "Ann"}));

        let entity = remote.perform(&op).await.unwrap().into_entity().unwrap();
        assert_eq!(entity["id"], json!("srv-1"));
        assert_eq!(entity["name"], json!("Ann"));
        assert!(remote.record(&EntityId::new("srv-1")).is_some());
    }

    #[tokio::test]
    async fn test_update_merges_into_stored_record() {
        let remote =
            ScriptedRemote::new().with_record(json!({"id": "7", "name": "A", "email": "a@x.io"}));
        let op = RemoteOperation::update("clients", EntityId::new("7"), json!({"name": "B"}));

        let entity = remote.perform(&op).await.unwrap().into_entity().unwrap();
        assert_eq!(entity, json!({"id": "7", "name": "B", "email": "a@x.io"}));
    }

    #[tokio::test]
    async fn test_scripted_outcomes_come_first() {
        let remote = ScriptedRemote::new();
        remote.push_outcome(Err(RemoteError::Timeout { seconds: 5 }));

        let op = RemoteOperation::delete("clients", EntityId::new("1"));
        assert_eq!(
            remote.perform(&op).await,
            Err(RemoteError::Timeout { seconds: 5 })
        );
        assert!(remote.perform(&op).await.is_ok());
    }

    #[tokio::test]
    async fn test_hold_and_release() {
        let remote = Arc::new(ScriptedRemote::new());
        remote.hold();

        let task = {
            let remote = Arc::clone(&remote);
            tokio::spawn(async move {
                let op = RemoteOperation::delete("clients", EntityId::new("1"));
                remote.perform(&op).await
            })
        };

        remote.wait_for_calls(1).await;
        assert!(!task.is_finished());

        remote.release();
        assert!(task.await.unwrap().is_ok());
    }
}
