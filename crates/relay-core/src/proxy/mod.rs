//! Cached call façade.
//!
//! Every daemon call made on behalf of route handlers, the lifecycle tracker and the summary
//! refresher goes through [`ProxyEngine`].
//!
//! # Call Flow
//!
//! ```text
//! call(method, params)
//!       │
//!       ▼
//! ┌─────────────┐
//! │ Cache Check │ ─── fresh hit ──► HIT
//! └──────┬──────┘
//!        │ miss / bypass
//!        ▼
//! ┌─────────────────┐
//! │ DispatchGateway │ ─── ok ──► write back (method TTL) ──► MISS
//! └────────┬────────┘
//!          │ Timeout / Transport / Rpc
//!          ▼
//!   stale entry? ─── yes ──► STALE
//!          │ no
//!          ▼
//!   gettxoutsetinfo? ─── yes ──► placeholder { "_estimated": true } ──► ESTIMATED
//!          │ no
//!          ▼
//!        error
//! ```

pub mod engine;
pub mod errors;

pub use engine::{
    CallOptions, CallOutcome, EngineStats, ProxyEngine, RetryPolicy, ESTIMATED_MARKER,
    ESTIMATED_METHOD,
};
pub use errors::ProxyError;
