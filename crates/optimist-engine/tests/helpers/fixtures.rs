//! Fixtures: seeding the cache the way the UI does, through reads.

use optimist_core::{CacheKey, Domain, EntityId, KeyParams, keys};
use optimist_engine::{OptimistEngine, ReadOptions};
use serde_json::{Value, json};

/// Seeds `key` with `data` via a read.
pub async fn seed(engine: &OptimistEngine, key: &CacheKey, data: Value) {
    engine
        .read(key.clone(), move || async move { Ok(data) }, ReadOptions::new())
        .await
        .expect("seed read failed");
}

pub fn client(id: &str, name: &str) -> Value {
    json!({"id": id, "name": name, "status": "active"})
}

pub fn professional(id: &str, status: &str) -> Value {
    json!({"id": id, "name": format!("Dr. {}", id), "status": status})
}

pub fn clients_list() -> CacheKey {
    keys::list(Domain::clients(), KeyParams::new())
}

pub fn clients_count() -> CacheKey {
    keys::count(Domain::clients(), KeyParams::new())
}

pub fn client_detail(id: &str) -> CacheKey {
    keys::detail(Domain::clients(), &EntityId::new(id))
}

pub fn professionals_list() -> CacheKey {
    keys::list(Domain::professionals(), KeyParams::new())
}

pub fn professional_detail(id: &str) -> CacheKey {
    keys::detail(Domain::professionals(), &EntityId::new(id))
}

pub fn dashboard_summary() -> CacheKey {
    keys::stats(Domain::dashboard(), "summary")
}

/// Returns the data of `key`, panicking if absent.
pub fn data(engine: &OptimistEngine, key: &CacheKey) -> Value {
    engine
        .entry(key)
        .and_then(|entry| entry.data().cloned())
        .unwrap_or_else(|| panic!("no data cached for {}", key))
}

/// Returns every string found under an `id` field anywhere in the cache.
pub fn cached_ids(engine: &OptimistEngine) -> Vec<String> {
    fn collect(value: &Value, out: &mut Vec<String>) {
        match value {
            Value::Object(map) => {
                if let Some(Value::String(id)) = map.get("id") {
                    out.push(id.clone());
                }
                map.values().for_each(|v| collect(v, out));
            },
            Value::Array(items) => items.iter().for_each(|v| collect(v, out)),
            _ => {},
        }
    }

    let mut ids = Vec::new();
    for entry in engine.snapshot().values() {
        if let Some(data) = entry.data() {
            collect(data, &mut ids);
        }
    }
    ids
}
