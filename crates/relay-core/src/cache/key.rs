use serde_json::Value;
use std::{
    fmt,
    hash::{Hash, Hasher},
};

use crate::utils::json_hash::{canonical_json, fingerprint_call};

/// Identity of a daemon call: method name plus its ordered parameter list.
///
/// Parameters are held in canonical JSON form, so structurally equal calls compare equal
/// regardless of object key order, and distinct calls never do. The precomputed fingerprint
/// only speeds up hashing.
#[derive(Debug, Clone)]
pub struct CallKey {
    method: String,
    params: String,
    fingerprint: u64,
}

impl CallKey {
    #[must_use]
    pub fn new(method: &str, params: &[Value]) -> Self {
        Self {
            method: method.to_string(),
            params: canonical_json(params),
            fingerprint: fingerprint_call(method, params),
        }
    }

    #[must_use]
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Canonical JSON text of the parameter list.
    #[must_use]
    pub fn params_json(&self) -> &str {
        &self.params
    }

    #[must_use]
    pub fn fingerprint(&self) -> u64 {
        self.fingerprint
    }
}

impl PartialEq for CallKey {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint &&
            self.method == other.method &&
            self.params == other.params
    }
}

impl Eq for CallKey {}

impl Hash for CallKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fingerprint.hash(state);
    }
}

impl fmt::Display for CallKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.method, self.params)
    }
}
