//! Stable cache key construction.
//!
//! Keys have the form `namespace:symbol:component:hash`, where the hash
//! covers the request parameters with volatile fields removed. Two requests
//! that differ only in timestamps or request ids share a key.

use std::collections::BTreeMap;

use serde_json::Value;

/// Parameter names ignored when hashing, at any depth.
pub const VOLATILE_FIELDS: [&str; 6] = ["timestamp", "time", "ts", "request_id", "flow_id", "nonce"];

const HASH_LEN: usize = 16;

/// Copy of `value` with volatile fields stripped and object keys sorted.
#[must_use]
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<&String, Value> = map
                .iter()
                .filter(|(k, _)| !VOLATILE_FIELDS.contains(&k.as_str()))
                .map(|(k, v)| (k, canonicalize(v)))
                .collect();
            Value::Object(sorted.into_iter().map(|(k, v)| (k.clone(), v)).collect())
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Short blake3 digest of the canonical parameters.
#[must_use]
pub fn params_hash(params: &Value) -> String {
    let canonical = canonicalize(params).to_string();
    let mut digest = blake3::hash(canonical.as_bytes()).to_hex().to_string();
    digest.truncate(HASH_LEN);
    digest
}

/// Builds the full cache key for one indicator result.
#[must_use]
pub fn build_key(namespace: &str, symbol: &str, component: &str, params: &Value) -> String {
    format!("{namespace}:{symbol}:{component}:{}", params_hash(params))
}

/// Lock key guarding computation of `key`.
#[must_use]
pub fn lock_key(key: &str) -> String {
    format!("lock:{key}")
}
