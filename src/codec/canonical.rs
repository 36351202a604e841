// Canonical JSON rendering. Used wherever a value has to become a stable key.

use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Sorts a JSON object's keys recursively.
/// Arrays keep their order; only object keys are normalised.
pub fn sort_json_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted_map: BTreeMap<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), sort_json_value(v)))
                .collect();
            Value::Object(sorted_map.into_iter().collect())
        }
        Value::Array(arr) => Value::Array(arr.iter().map(sort_json_value).collect()),
        _ => value.clone(),
    }
}

/// Serializes a value with sorted keys, so equal values always render the same string.
pub fn canonical_json(value: &Value) -> String {
    sort_json_value(value).to_string()
}

/// Same as [`canonical_json`] for an object, minus the given top-level keys.
pub fn canonical_object_without(map: &Map<String, Value>, skip: &[String]) -> String {
    let filtered: Map<String, Value> = map
        .iter()
        .filter(|(k, _)| !skip.iter().any(|s| s == *k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    canonical_json(&Value::Object(filtered))
}
