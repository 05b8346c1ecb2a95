#![allow(dead_code)]
use optimist_core::{CacheKey, Domain, KeyParams, keys};
use serde_json::{Value, json};

/// Helper to build a client record fixture.
pub fn client(id: &str, name: &str, status: &str) -> Value {
    json!({ "id": id, "name": name, "status": status })
}

/// Returns a small set of keys spread across domains and kinds.
pub fn key_fixture() -> Vec<CacheKey> {
    vec![
        keys::list(Domain::clients(), KeyParams::new()),
        keys::list(Domain::clients(), KeyParams::new().with("status", "active")),
        keys::count(Domain::clients(), KeyParams::new()),
        keys::detail(Domain::clients(), &"client-7".into()),
        keys::list(Domain::professionals(), KeyParams::new()),
        keys::stats(Domain::dashboard(), "summary"),
    ]
}
