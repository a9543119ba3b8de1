//! Response cache for daemon calls.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │                     CacheStore                       │
//! │  LRU (max_entries) of CallKey → CacheEntry           │
//! │  • get_fresh: honours expires_at                     │
//! │  • get_stale: ignores expiry (degraded reads)        │
//! └──────────────────────────────────────────────────────┘
//!            ▲                              ▲
//!   CallKey (canonical params)     CachePolicy (method → TTL)
//! ```
//!
//! # Freshness Classes
//!
//! | Class | Default TTL | Methods |
//! |-------|-------------|---------|
//! | Volatile | 10s | `getmempoolinfo`, `getrawmempool`, `getbestblockhash`, `getblockcount` |
//! | Default | 60s | everything else |
//! | Immutable | 1h | `getblock`, `getblockhash`, `getblockheader`, `getrawtransaction`, `decoderawtransaction` |
//! | Expensive | 1h, 5 min timeout | `gettxoutsetinfo` |
//!
//! Expired entries are never deleted on read: they remain available to stale reads until a
//! successful call overwrites them or capacity pressure evicts them.

pub mod key;
pub mod policy;
pub mod store;

pub use key::CallKey;
pub use policy::{CachePolicy, MethodClass};
pub use store::{CacheEntry, CacheStats, CacheStore};
