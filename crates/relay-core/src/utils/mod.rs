//! Utility functions shared by the cache and proxy layers.
//!
//! ## JSON Hashing (`json_hash`)
//! - Canonical key ordering ensures structurally equal parameters share one cache identity
//! - Structural fingerprints of a call for logging

pub mod json_hash;

pub use json_hash::{canonical_json, fingerprint_call, hash_json_value};
