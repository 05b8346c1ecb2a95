//! Helpers for the JSON records held in cached query results.
//!
//! Cached data is plain `serde_json::Value`. By convention:
//! - a detail entry holds a record (an object with an `id` field);
//! - a list entry holds an array of records, or an envelope object
//!   `{ "items": [...], "total": n }`;
//! - a count entry holds a number, or an object `{ "count": n }`;
//! - a stats entry holds an object of named integer counters.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::{CoreError, Result};
use crate::types::EntityId;

/// Field holding a record's identifier.
pub const ID_FIELD: &str = "id";

/// Field holding the items of a list envelope.
pub const ITEMS_FIELD: &str = "items";

/// Fields of a list envelope or count object that hold a total.
const TOTAL_FIELDS: &[&str] = &["total", "count"];

/// Returns the id of a record, accepting string and integer ids.
pub fn id_of(record: &Value) -> Option<EntityId> {
    match record.get(ID_FIELD)? {
        Value::String(s) => Some(EntityId::new(s.clone())),
        Value::Number(n) => Some(EntityId::new(n.to_string())),
        _ => None,
    }
}

/// Returns true if `record` carries the given id.
pub fn has_id(record: &Value, id: &EntityId) -> bool {
    id_of(record).as_ref() == Some(id)
}

/// Returns the record as an object, or an `InvalidRecord` error.
pub fn require_object(record: &Value) -> Result<&Map<String, Value>> {
    record
        .as_object()
        .ok_or_else(|| CoreError::invalid_record("record must be a JSON object"))
}

/// Returns the id of a record, or an `InvalidRecord` error.
pub fn require_id(record: &Value) -> Result<EntityId> {
    require_object(record)?;
    match id_of(record) {
        Some(id) if !id.is_blank() => Ok(id),
        _ => Err(CoreError::invalid_record("record has no usable 'id'")),
    }
}

/// Validates a partial update: an object that does not try to change the id.
pub fn validate_patch(patch: &Value) -> Result<()> {
    let fields = patch
        .as_object()
        .ok_or_else(|| CoreError::invalid_patch("*", "patch must be a JSON object"))?;
    if fields.is_empty() {
        return Err(CoreError::invalid_patch("*", "patch is empty"));
    }
    if fields.contains_key(ID_FIELD) {
        return Err(CoreError::invalid_patch(ID_FIELD, "identifiers are immutable"));
    }
    Ok(())
}

/// Merges a partial patch into a record.
///
/// # Rules
/// 1. Fields present in `patch` but not in `base` are added.
/// 2. Fields present in both:
///    a. If BOTH values are objects, they are merged recursively.
///    b. Otherwise, the patch value replaces the base value.
/// 3. Arrays are NOT merged; the patch array replaces the base array.
/// 4. Fields absent from `patch` are preserved untouched.
pub fn merge_patch(base: &mut Value, patch: &Value) {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            for (key, patch_val) in patch_map {
                match base_map.get_mut(key) {
                    Some(base_val) => merge_patch(base_val, patch_val),
                    None => {
                        base_map.insert(key.clone(), patch_val.clone());
                    },
                }
            }
        },
        (base_val, patch_val) => {
            *base_val = patch_val.clone();
        },
    }
}

/// Returns the items of a list value (bare array or envelope).
pub fn list_items(data: &Value) -> Option<&Vec<Value>> {
    match data {
        Value::Array(items) => Some(items),
        Value::Object(map) => map.get(ITEMS_FIELD)?.as_array(),
        _ => None,
    }
}

/// Mutable variant of [`list_items`].
pub fn list_items_mut(data: &mut Value) -> Option<&mut Vec<Value>> {
    match data {
        Value::Array(items) => Some(items),
        Value::Object(map) => map.get_mut(ITEMS_FIELD)?.as_array_mut(),
        _ => None,
    }
}

/// Applies `delta` to the total of a list envelope, if it has one.
pub fn adjust_list_total(data: &mut Value, delta: i64) {
    if let Value::Object(map) = data {
        adjust_first_total(map, delta);
    }
}

/// Applies `delta` to a count value (a bare number or a `{count}` object).
///
/// Counts never go below zero. Returns false if the value has no count.
pub fn adjust_count(data: &mut Value, delta: i64) -> bool {
    if let Some(current) = data.as_i64() {
        *data = shifted(current, delta);
        return true;
    }
    match data {
        Value::Object(map) => adjust_first_total(map, delta),
        _ => false,
    }
}

/// Applies `delta` to a named integer counter of a stats object.
///
/// Returns false if the counter is absent or not an integer.
pub fn adjust_counter(data: &mut Value, field: &str, delta: i64) -> bool {
    let Some(slot) = data.as_object_mut().and_then(|map| map.get_mut(field)) else {
        return false;
    };
    match slot.as_i64() {
        Some(current) => {
            *slot = shifted(current, delta);
            true
        },
        None => false,
    }
}

/// Decodes a cached value into a typed result.
pub fn decode<T: DeserializeOwned>(data: &Value) -> Result<T> {
    serde_json::from_value(data.clone())
        .map_err(|e| CoreError::decode_with_cause(std::any::type_name::<T>(), e))
}

fn adjust_first_total(map: &mut Map<String, Value>, delta: i64) -> bool {
    for field in TOTAL_FIELDS {
        if let Some(slot) = map.get_mut(*field)
            && let Some(current) = slot.as_i64()
        {
            *slot = shifted(current, delta);
            return true;
        }
    }
    false
}

/// Counters saturate instead of overflowing and never go below zero.
fn shifted(current: i64, delta: i64) -> Value {
    Value::from(current.saturating_add(delta).max(0))
}
