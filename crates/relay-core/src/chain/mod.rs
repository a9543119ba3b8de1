//! Chain observation: tip tracking, block parsing and the transaction lifecycle.
//!
//! ```text
//!                   ┌──────────────────┐
//!  daemon ─────────►│ LifecycleTracker │──── LifecycleDelta ───► DeltaSink (broadcast hub)
//!  (via ProxyEngine)└───────┬──────────┘
//!                           │ single writer
//!                           ▼
//!                   ┌──────────────────┐      ┌────────────┐
//!                   │  LifecycleState  │      │ ChainState │ ◄── cache policy, estimates
//!                   └──────────────────┘      └────────────┘
//! ```
//!
//! [`ChainState`] is shared through `Arc` and read wait-free via `ArcSwap`. The tracker is the
//! only component that moves it.

pub mod lifecycle;
pub mod mining;
pub mod state;
pub mod tracker;
pub mod types;

pub use lifecycle::{BlockApplied, LifecycleConfig, LifecycleSnapshot, LifecycleState};
pub use mining::{identify_pool, identify_pool_on, parse_block, signals_taproot};
pub use state::{ChainState, ChainTip};
pub use tracker::{
    DeltaSink, LifecycleDelta, LifecycleTracker, TrackerConfig, TrackerError, TrackerEvent,
    TrackerHandle, TrackerStats,
};
pub use types::{Block, Network, ObservedBlock, Transaction, TxState};
