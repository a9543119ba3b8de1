//! Broadcast hub and its wire protocol.
//!
//! ```text
//! LifecycleTracker ──► DeltaSink ──┐
//! summary refresher ───────────────┼──► BroadcastHub ──► Subscriber (per-connection queue)
//! geo refresher ───────────────────┘         │
//!                                            └──► mirror (snapshot for new subscribers)
//! ```

pub mod hub;
pub mod messages;
pub mod refresh;

pub use hub::{
    BroadcastHub, DeliveryError, HubConfig, HubStats, Outbound, Subscriber, SubscriberId,
    SNAPSHOT_MESSAGES,
};
pub use messages::{
    ChainSummary, ClientMessage, ConfirmedBatch, MempoolSnapshot, RemovedTransaction, ServerMessage,
};
pub use refresh::{fetch_summary, mempool_snapshot, start_geo_refresher, start_summary_refresher};
