use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::broadcast,
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, info, trace, warn};

use super::messages::{ChainSummary, ServerMessage};
use crate::{
    chain::{Block, DeltaSink, LifecycleDelta, Transaction},
    metrics::MetricsCollector,
    peers::GeoPeer,
};

pub type SubscriberId = u64;

/// A frame handed to a subscriber's writer.
#[derive(Debug, Clone)]
pub enum Outbound {
    Message(Arc<ServerMessage>),
    /// Liveness probe. The subscriber answers by calling [`BroadcastHub::touch`].
    Ping,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DeliveryError {
    #[error("subscriber queue full")]
    Full,
    #[error("subscriber disconnected")]
    Closed,
}

/// One connected client.
///
/// `send` is called with the hub lock held and must not block: implementations hand the frame
/// to a bounded per-connection queue and report a full or closed queue as a failure.
pub trait Subscriber: Send + Sync + 'static {
    /// # Errors
    ///
    /// Returns a [`DeliveryError`] when the frame cannot be queued.
    fn send(&self, frame: Outbound) -> Result<(), DeliveryError>;
}

#[derive(Debug, Clone)]
pub struct HubConfig {
    pub ping_interval: Duration,
    /// Subscribers silent for longer than this are dropped by the next probe.
    pub pong_grace: Duration,
    pub window_size: usize,
    pub confirmed_cap: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            pong_grace: Duration::from_secs(90),
            window_size: 240,
            confirmed_cap: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HubStats {
    pub subscribers: usize,
    pub published_total: u64,
    pub removed_total: u64,
}

struct Entry {
    subscriber: Arc<dyn Subscriber>,
    last_seen: Instant,
}

/// Messages a subscriber receives on registration, before any delta. Per-connection queues
/// must hold at least this many.
pub const SNAPSHOT_MESSAGES: usize = 4;

/// What a new subscriber is shown. Kept current from the messages the hub publishes, so the
/// snapshot and the delta stream always agree.
#[derive(Default)]
struct Mirror {
    blocks: Vec<Block>,
    confirmed: Vec<Transaction>,
    summary: ChainSummary,
    geo: Vec<GeoPeer>,
}

impl Mirror {
    fn apply(&mut self, message: &ServerMessage, config: &HubConfig) {
        match message {
            ServerMessage::RecentBlocks(blocks) => self.blocks.clone_from(blocks),
            ServerMessage::NewBlock(block) => {
                self.blocks.retain(|b| b.height != block.height);
                let at = self.blocks.partition_point(|b| b.height > block.height);
                self.blocks.insert(at, block.clone());
                self.blocks.truncate(config.window_size);
            }
            ServerMessage::RecentTransactions(txs) => self.confirmed.clone_from(txs),
            ServerMessage::TransactionConfirmed(batch) => {
                for tx in &batch.transactions {
                    self.confirmed.insert(0, tx.clone());
                }
                self.confirmed.truncate(config.confirmed_cap);
            }
            ServerMessage::InitialData(summary) => self.summary = summary.clone(),
            ServerMessage::GeoData(peers) => self.geo.clone_from(peers),
            ServerMessage::NewTransaction(_) |
            ServerMessage::RemovedTransaction(_) |
            ServerMessage::Mempool(_) => {}
        }
    }

    /// Subscribe snapshot, in delivery order.
    fn snapshot(&self) -> [ServerMessage; SNAPSHOT_MESSAGES] {
        [
            ServerMessage::RecentBlocks(self.blocks.clone()),
            ServerMessage::InitialData(self.summary.clone()),
            ServerMessage::GeoData(self.geo.clone()),
            ServerMessage::RecentTransactions(self.confirmed.clone()),
        ]
    }
}

#[derive(Default)]
struct HubState {
    subscribers: BTreeMap<SubscriberId, Entry>,
    mirror: Mirror,
}

/// Fans lifecycle deltas and summary refreshes out to every live subscriber.
///
/// Snapshot capture, registration and publication all happen under one lock, so a subscriber
/// never sees a delta before its snapshot and never misses one emitted after it. A failed send
/// removes only the failing subscriber.
pub struct BroadcastHub {
    state: Mutex<HubState>,
    next_id: AtomicU64,
    published_total: AtomicU64,
    removed_total: AtomicU64,
    config: HubConfig,
    metrics: Arc<MetricsCollector>,
}

impl BroadcastHub {
    #[must_use]
    pub fn new(config: HubConfig, metrics: Arc<MetricsCollector>) -> Self {
        Self {
            state: Mutex::new(HubState::default()),
            next_id: AtomicU64::new(1),
            published_total: AtomicU64::new(0),
            removed_total: AtomicU64::new(0),
            config,
            metrics,
        }
    }

    /// Registers a subscriber after sending it the full current snapshot.
    ///
    /// # Errors
    ///
    /// Returns the [`DeliveryError`] of the first snapshot frame that could not be queued; the
    /// subscriber is not registered then.
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> Result<SubscriberId, DeliveryError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let mut state = self.state.lock();

        for message in state.mirror.snapshot() {
            if let Err(e) = subscriber.send(Outbound::Message(Arc::new(message))) {
                warn!(subscriber = id, error = %e, "failed to deliver snapshot");
                return Err(e);
            }
        }

        state.subscribers.insert(id, Entry { subscriber, last_seen: Instant::now() });
        let count = state.subscribers.len();
        drop(state);

        self.metrics.record_subscribers(count);
        debug!(subscriber = id, subscribers = count, "subscriber registered");
        Ok(id)
    }

    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut state = self.state.lock();
        let removed = state.subscribers.remove(&id).is_some();
        let count = state.subscribers.len();
        drop(state);

        if removed {
            self.metrics.record_subscribers(count);
            debug!(subscriber = id, subscribers = count, "subscriber left");
        }
        removed
    }

    /// Records inbound activity (pong or client frame) from a subscriber.
    pub fn touch(&self, id: SubscriberId) {
        if let Some(entry) = self.state.lock().subscribers.get_mut(&id) {
            entry.last_seen = Instant::now();
        }
    }

    /// Sends `message` to every subscriber. Returns how many received it.
    pub fn publish(&self, message: ServerMessage) -> usize {
        let kind = message.kind();
        let message = Arc::new(message);
        let mut failed = Vec::new();

        let mut state = self.state.lock();
        state.mirror.apply(&message, &self.config);
        for (id, entry) in &state.subscribers {
            if let Err(e) = entry.subscriber.send(Outbound::Message(Arc::clone(&message))) {
                debug!(subscriber = id, kind = kind, error = %e, "delivery failed");
                failed.push(*id);
            }
        }
        for id in &failed {
            state.subscribers.remove(id);
        }
        let delivered = state.subscribers.len();
        drop(state);

        self.published_total.fetch_add(1, Ordering::Relaxed);
        self.record_removed(failed.len(), "send_failed", delivered);
        trace!(kind = kind, delivered = delivered, "published");
        delivered
    }

    /// Sends `message` to one subscriber. A failure removes it.
    ///
    /// # Errors
    ///
    /// Returns [`DeliveryError::Closed`] for an unknown id, or the send failure.
    pub fn send_to(&self, id: SubscriberId, message: ServerMessage) -> Result<(), DeliveryError> {
        let mut state = self.state.lock();
        let entry = state.subscribers.get(&id).ok_or(DeliveryError::Closed)?;
        let result = entry.subscriber.send(Outbound::Message(Arc::new(message)));
        if result.is_err() {
            state.subscribers.remove(&id);
            let remaining = state.subscribers.len();
            drop(state);
            self.record_removed(1, "send_failed", remaining);
        }
        result
    }

    /// Replaces the summary and fans it out as `initialData`.
    pub fn set_summary(&self, summary: ChainSummary) -> usize {
        self.publish(ServerMessage::InitialData(summary))
    }

    /// Replaces the peer list and fans it out as `geoData`.
    pub fn set_geo(&self, peers: Vec<GeoPeer>) -> usize {
        self.publish(ServerMessage::GeoData(peers))
    }

    /// Drops subscribers silent since before `now - pong_grace` and pings the rest. Returns the
    /// number removed.
    pub fn probe(&self, now: Instant) -> usize {
        let grace = self.config.pong_grace;
        let mut state = self.state.lock();

        let mut stale = Vec::new();
        let mut failed = Vec::new();
        for (id, entry) in &state.subscribers {
            if now.saturating_duration_since(entry.last_seen) > grace {
                stale.push(*id);
            } else if entry.subscriber.send(Outbound::Ping).is_err() {
                failed.push(*id);
            }
        }
        for id in stale.iter().chain(&failed) {
            state.subscribers.remove(id);
        }
        let remaining = state.subscribers.len();
        drop(state);

        if !stale.is_empty() {
            warn!(removed = stale.len(), "subscribers missed liveness probe");
        }
        self.record_removed(stale.len(), "timeout", remaining);
        self.record_removed(failed.len(), "send_failed", remaining);
        stale.len() + failed.len()
    }

    fn record_removed(&self, count: usize, reason: &'static str, remaining: usize) {
        if count == 0 {
            return;
        }
        self.removed_total.fetch_add(count as u64, Ordering::Relaxed);
        for _ in 0..count {
            self.metrics.record_subscriber_removed(reason);
        }
        self.metrics.record_subscribers(remaining);
        debug!(removed = count, reason = reason, subscribers = remaining, "subscribers removed");
    }

    /// Spawns the periodic liveness probe.
    pub fn start_probe(self: &Arc<Self>, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        let hub = Arc::clone(self);
        tokio::spawn(async move {
            let period = hub.config.ping_interval.max(Duration::from_millis(100));
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        hub.probe(Instant::now());
                    }
                    _ = shutdown_rx.recv() => {
                        info!("broadcast probe shutting down");
                        break;
                    }
                }
            }
        })
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscribers.len()
    }

    #[must_use]
    pub fn stats(&self) -> HubStats {
        HubStats {
            subscribers: self.subscriber_count(),
            published_total: self.published_total.load(Ordering::Relaxed),
            removed_total: self.removed_total.load(Ordering::Relaxed),
        }
    }
}

impl DeltaSink for BroadcastHub {
    fn publish(&self, delta: LifecycleDelta) {
        BroadcastHub::publish(self, delta.into());
    }
}
