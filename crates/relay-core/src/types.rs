//! Core type definitions shared across the gateway, cache and broadcast layers.
//!
//! # Type Categories
//!
//! ## Daemon Wire Types
//! - [`JsonRpcRequest`], [`JsonRpcResponse`], [`JsonRpcError`]: the JSON-RPC 1.0 dialect spoken
//!   by bitcoind-family daemons (positional `params`, `error` object on failure)
//!
//! ## Result Provenance
//! - [`CacheStatus`]: how a façade call was satisfied (fresh hit, upstream, stale fallback or
//!   synthesized estimate)
//!
//! ## Method Guard
//! - [`ALLOWED_METHODS`] / [`is_method_allowed`]: read-only daemon methods the thin HTTP route is
//!   permitted to forward

use ahash::AHashSet;
use serde::{Deserialize, Serialize};
use std::{borrow::Cow, sync::LazyLock};

/// JSON-RPC dialect version understood by the daemon.
pub const JSONRPC_VERSION: &str = "1.0";

/// Pre-allocated `Cow` for the version string.
pub const JSONRPC_VERSION_COW: Cow<'static, str> = Cow::Borrowed(JSONRPC_VERSION);

/// Read-only daemon methods that may be forwarded on behalf of external callers.
pub const ALLOWED_METHODS: &[&str] = &[
    "getbestblockhash",
    "getblock",
    "getblockchaininfo",
    "getblockcount",
    "getblockhash",
    "getblockheader",
    "getblockreward",
    "getchaintxstats",
    "getdifficulty",
    "getmempoolinfo",
    "getmininginfo",
    "getnetworkinfo",
    "getpeerinfo",
    "getrawmempool",
    "getrawtransaction",
    "gettxout",
    "gettxoutsetinfo",
    "decoderawtransaction",
];

static ALLOWED_METHODS_SET: LazyLock<AHashSet<&'static str>> =
    LazyLock::new(|| ALLOWED_METHODS.iter().copied().collect());

/// Check if a method is in the allowed list (O(1) lookup)
#[inline]
#[must_use]
pub fn is_method_allowed(method: &str) -> bool {
    ALLOWED_METHODS_SET.contains(method)
}

/// Describes how a façade call was served.
///
/// # Example
///
/// ```
/// use relay_core::types::CacheStatus;
///
/// assert_eq!(CacheStatus::Hit.to_string(), "HIT");
/// assert!(CacheStatus::Stale.is_degraded());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheStatus {
    /// Fresh cache entry, no upstream interaction.
    Hit,
    /// Fetched from the daemon and written back to the cache.
    Miss,
    /// The daemon call failed and an expired entry was served instead.
    Stale,
    /// The daemon call failed, nothing was cached, and a placeholder was synthesized.
    Estimated,
}

impl CacheStatus {
    /// Returns `true` when the value did not come from a successful, fresh read.
    #[must_use]
    pub fn is_degraded(self) -> bool {
        matches!(self, Self::Stale | Self::Estimated)
    }
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheStatus::Hit => write!(f, "HIT"),
            CacheStatus::Miss => write!(f, "MISS"),
            CacheStatus::Stale => write!(f, "STALE"),
            CacheStatus::Estimated => write!(f, "ESTIMATED"),
        }
    }
}

/// JSON-RPC request sent to the daemon.
///
/// `params` is always a positional array; the daemon rejects named parameters on most methods.
///
/// # Example
///
/// ```
/// use relay_core::types::JsonRpcRequest;
/// use serde_json::json;
///
/// let request = JsonRpcRequest::new("getblockhash", vec![json!(100)], 7);
/// assert_eq!(request.method, "getblockhash");
/// assert_eq!(request.id, 7);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: Cow<'static, str>,
    pub id: u64,
    pub method: String,
    pub params: Vec<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Creates a new request with zero allocation for the version string.
    #[must_use]
    pub fn new(method: impl Into<String>, params: Vec<serde_json::Value>, id: u64) -> Self {
        Self { jsonrpc: JSONRPC_VERSION_COW, id, method: method.into(), params }
    }
}

/// JSON-RPC response returned by the daemon.
///
/// The daemon always includes both `result` and `error`; exactly one of them is non-null.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub result: Option<serde_json::Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
    #[serde(default)]
    pub id: serde_json::Value,
}

impl JsonRpcResponse {
    /// Creates a successful response.
    #[must_use]
    pub fn success(result: serde_json::Value, id: u64) -> Self {
        Self { result: Some(result), error: None, id: serde_json::Value::from(id) }
    }

    /// Creates an error response.
    #[must_use]
    pub fn error(code: i32, message: impl Into<String>, id: u64) -> Self {
        Self {
            result: None,
            error: Some(JsonRpcError { code, message: message.into() }),
            id: serde_json::Value::from(id),
        }
    }
}

/// Structured daemon error.
///
/// Common codes: `-5` invalid address or key (unknown txid/hash), `-8` invalid parameter,
/// `-28` daemon still warming up, `-32601` method not found.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
}
