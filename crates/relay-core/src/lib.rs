//! # Relay Core
//!
//! Core library for the block explorer relay: a single-daemon RPC gateway with caching, a
//! block and transaction lifecycle tracker, and a fanout hub for live subscribers.
//!
//! - **[`upstream`]**: the dispatch gateway. Bounded in-flight calls to the daemon, priority
//!   lanes, request pacing and per-call timeouts.
//!
//! - **[`cache`]** / **[`proxy`]**: the cache store and the cached call façade on top of the
//!   gateway, with per-method TTLs, stale fallback and synthesized estimates for expensive calls.
//!
//! - **[`chain`]**: the lifecycle tracker. Maintains the recent-blocks window, pending and
//!   recently confirmed transactions, and emits deltas.
//!
//! - **[`broadcast`]**: the broadcast hub. Holds the initial-state mirror, registers
//!   subscribers and fans out deltas.
//!
//! - **[`persistence`]**: the snapshot file and the sidecar that keeps it current.
//!
//! - **[`peers`]**: `peers.dat` parsing and geolocation join for the peer map.
//!
//! - **[`metrics`]**, **[`config`]**, **[`runtime`]**: observability, settings and wiring.
//!
//! ## Data Flow
//!
//! ```text
//!  daemon ◄──── DispatchGateway ◄──── ProxyEngine (cache) ◄──── HTTP /rpc
//!                                          ▲
//!                                          │ fetch
//!  notifications ──► LifecycleTracker ─────┘
//!                         │ deltas
//!                         ▼
//!                    BroadcastHub ──► subscribers (WebSocket)
//!                         ▲
//!        summary / geo refreshers
//!
//!  LifecycleTracker ──► PersistenceSidecar ──► snapshot.json
//! ```

pub mod broadcast;
pub mod cache;
pub mod chain;
pub mod config;
pub mod metrics;
pub mod peers;
pub mod persistence;
pub mod proxy;
pub mod runtime;
pub mod types;
pub mod upstream;
pub mod utils;
