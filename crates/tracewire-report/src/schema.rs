//! Schema identity digest.
//!
//! Collectors correlate traces against a specific schema version, identified
//! by a SHA-512 digest of the introspection result. Two processes serving
//! the same schema must produce the same digest, so the JSON is normalized
//! with sorted object keys at every level before hashing (the normalization
//! fast-json-stable-stringify applies).

use serde_json::Value;
use sha2::{Digest, Sha512};

/// Hex SHA-512 digest of a normalized introspection result.
///
/// Accepts either a full introspection response or its `data.__schema`
/// subtree; a full response is narrowed to the subtree first so both forms
/// digest identically.
pub fn digest(introspection: &Value) -> String {
    let schema = introspection
        .pointer("/data/__schema")
        .unwrap_or(introspection);
    let json = normalize(schema).to_string();
    let hash = Sha512::digest(json.as_bytes());
    hash.iter().map(|byte| format!("{byte:02x}")).collect()
}

/// Rewrites every object with its keys in sorted order. Array order is
/// meaningful and left alone.
fn normalize(value: &Value) -> Value {
    match value {
        Value::Object(fields) => {
            let mut keys: Vec<&String> = fields.keys().collect();
            keys.sort();
            let mut sorted = serde_json::Map::new();
            for key in keys {
                if let Some(field) = fields.get(key) {
                    sorted.insert(key.clone(), normalize(field));
                }
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(normalize).collect()),
        other => other.clone(),
    }
}
