//! Deterministic JSON hashing and canonical encoding for call identities.
//!
//! Two calls with structurally equal parameters must share a cache identity regardless of
//! object key order. [`canonical_json`] produces the collision-free form used as the actual
//! key; [`hash_json_value`] gives a cheap fingerprint of the same structure for logging and
//! sharding.

use ahash::AHasher;
use serde_json::Value;
use std::hash::{Hash, Hasher};

/// Hash a `serde_json::Value` directly without serialization.
///
/// Object keys are sorted so `{"a":1,"b":2}` and `{"b":2,"a":1}` hash equally.
///
/// # Type Discrimination
///
/// Each JSON type is prefixed with a discriminant byte to prevent collisions:
/// - Null: 0u8
/// - Bool: 1u8 + bool value
/// - Number: 2u8 + number representation
/// - String: 3u8 + length + bytes
/// - Array: 4u8 + length + each element
/// - Object: 5u8 + length + sorted (key, value) pairs
pub fn hash_json_value(value: &Value, hasher: &mut impl Hasher) {
    match value {
        Value::Null => {
            0u8.hash(hasher);
        }
        Value::Bool(b) => {
            1u8.hash(hasher);
            b.hash(hasher);
        }
        Value::Number(n) => {
            2u8.hash(hasher);
            if let Some(i) = n.as_i64() {
                0u8.hash(hasher);
                i.hash(hasher);
            } else if let Some(u) = n.as_u64() {
                1u8.hash(hasher);
                u.hash(hasher);
            } else if let Some(f) = n.as_f64() {
                2u8.hash(hasher);
                // serde_json never produces NaN or infinities, so raw bits are canonical.
                f.to_bits().hash(hasher);
            }
        }
        Value::String(s) => {
            3u8.hash(hasher);
            s.hash(hasher);
        }
        Value::Array(arr) => {
            4u8.hash(hasher);
            arr.len().hash(hasher);
            for element in arr {
                hash_json_value(element, hasher);
            }
        }
        Value::Object(obj) => {
            5u8.hash(hasher);
            obj.len().hash(hasher);

            let mut sorted_keys: Vec<&String> = obj.keys().collect();
            sorted_keys.sort_unstable();

            for key in sorted_keys {
                key.hash(hasher);
                if let Some(value) = obj.get(key) {
                    hash_json_value(value, hasher);
                }
            }
        }
    }
}

/// Fingerprint of a method name and its positional parameters.
#[must_use]
pub fn fingerprint_call(method: &str, params: &[Value]) -> u64 {
    let mut hasher = AHasher::default();
    method.hash(&mut hasher);
    params.len().hash(&mut hasher);
    for param in params {
        hash_json_value(param, &mut hasher);
    }
    hasher.finish()
}

fn write_canonical(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Array(arr) => {
            out.push(b'[');
            for (i, element) in arr.iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                write_canonical(element, out);
            }
            out.push(b']');
        }
        Value::Object(obj) => {
            let mut entries: Vec<(&String, &Value)> = obj.iter().collect();
            entries.sort_unstable_by(|a, b| a.0.cmp(b.0));

            out.push(b'{');
            for (i, (key, value)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(b',');
                }
                // Writing a str or scalar into a Vec cannot fail.
                let _ = serde_json::to_writer(&mut *out, key);
                out.push(b':');
                write_canonical(value, out);
            }
            out.push(b'}');
        }
        scalar => {
            let _ = serde_json::to_writer(&mut *out, scalar);
        }
    }
}

/// Canonical JSON text of a parameter list: compact, object keys sorted.
///
/// Equal structures always produce equal text and distinct structures never do, which makes
/// the output usable as an exact cache key.
#[must_use]
pub fn canonical_json(params: &[Value]) -> String {
    let mut buf = Vec::with_capacity(64);
    buf.push(b'[');
    for (i, param) in params.iter().enumerate() {
        if i > 0 {
            buf.push(b',');
        }
        write_canonical(param, &mut buf);
    }
    buf.push(b']');

    // serde_json only emits UTF-8.
    String::from_utf8(buf).unwrap_or_else(|e| String::from_utf8_lossy(e.as_bytes()).into_owned())
}
