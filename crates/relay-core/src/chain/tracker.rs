//! Lifecycle tracker: turns daemon observations into lifecycle deltas.
//!
//! One worker task consumes [`TrackerEvent`]s in arrival order and is the only writer of the
//! [`LifecycleState`]. Readers (broadcast snapshot, persistence, admin stats) take short read
//! locks and never hold them across an await point.
//!
//! # Event Sources
//!
//! ```text
//! webhook / push ──► TrackerHandle ──┐
//!                                    ├──► worker ──► LifecycleState ──► DeltaSink
//! poll tick / sweep tick ────────────┘       │
//!                                            └──► ProxyEngine (retrying daemon calls)
//! ```
//!
//! Polling checks the chain head before diffing the mempool, so a transaction that left the
//! mempool because it was mined is confirmed rather than reported as removed. Heights skipped
//! since the last diff are fetched first; while any of them is still missing, vanished ids stay
//! Pending and only the retention sweep may drop them.

use ahash::{AHashMap, AHashSet};
use futures::future::join_all;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, info, trace, warn};

use super::{
    lifecycle::{LifecycleConfig, LifecycleSnapshot, LifecycleState},
    mining::parse_block,
    state::ChainState,
    types::{Block, Network, ObservedBlock, Transaction},
};
use crate::{
    metrics::MetricsCollector,
    proxy::{CallOptions, ProxyEngine, ProxyError, RetryPolicy},
    upstream::UpstreamError,
};

/// Inputs to the tracker worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerEvent {
    /// A block became known (webhook or push notification).
    NewBlockHash(String),
    /// A raw transaction hex pushed by the daemon.
    NewTransaction(String),
    /// A transaction left the mempool without being mined.
    RemovedTransaction(String),
    /// Check the chain head and diff the mempool.
    Poll,
    /// Drop Pending transactions past the retention horizon.
    Sweep,
    /// Fetch and apply the blocks at heights `from..=to`.
    Backfill { from: u64, to: u64 },
}

/// Normalized state changes produced by the tracker, in emission order.
#[derive(Debug, Clone, PartialEq)]
pub enum LifecycleDelta {
    /// The whole window, newest first. Sent after reconciliation.
    RecentBlocks(Vec<Block>),
    NewBlock(Block),
    /// The recent-confirmed list, newest first. Sent after reconciliation.
    RecentTransactions(Vec<Transaction>),
    /// Every transaction one block confirmed.
    TransactionsConfirmed { height: u64, hash: String, transactions: Vec<Transaction> },
    NewTransaction(Transaction),
    RemovedTransaction(String),
}

/// Receiver of lifecycle deltas.
///
/// Called from the tracker worker; implementations must not block.
pub trait DeltaSink: Send + Sync + 'static {
    fn publish(&self, delta: LifecycleDelta);
}

#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    /// The first blockchain-info fetch failed. Fatal at startup.
    #[error("initial blockchain info fetch failed: {0}")]
    Initialization(ProxyError),

    #[error("tracker event channel closed")]
    ChannelClosed,

    #[error("tracker event channel full")]
    ChannelFull,

    #[error("tracker worker already started")]
    AlreadyStarted,
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub network: Network,
    pub lifecycle: LifecycleConfig,
    pub poll_interval: Duration,
    pub sweep_interval: Duration,
    /// Heights resolved concurrently per reconciliation batch.
    pub reconcile_batch_size: usize,
    /// New mempool ids fetched per poll tick.
    pub max_new_transactions_per_poll: usize,
    /// Fetch blocks skipped between the previous head and a newly announced block.
    pub backfill_gaps: bool,
    /// Periodic head and mempool polling. Off when the daemon pushes notifications.
    pub polling: bool,
    pub event_capacity: usize,
    pub retry: RetryPolicy,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            network: Network::Mainnet,
            lifecycle: LifecycleConfig::default(),
            poll_interval: Duration::from_secs(10),
            sweep_interval: Duration::from_secs(30),
            reconcile_batch_size: 40,
            max_new_transactions_per_poll: 50,
            backfill_gaps: false,
            polling: true,
            event_capacity: 1024,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackerStats {
    pub blocks: usize,
    pub pending: usize,
    pub recent_confirmed: usize,
    pub tip_height: Option<u64>,
}

/// Cloneable sender side of the tracker's event queue.
#[derive(Clone)]
pub struct TrackerHandle {
    tx: mpsc::Sender<TrackerEvent>,
}

impl TrackerHandle {
    /// Queues an event, waiting for room.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::ChannelClosed`] once the tracker is gone.
    pub async fn send(&self, event: TrackerEvent) -> Result<(), TrackerError> {
        self.tx.send(event).await.map_err(|_| TrackerError::ChannelClosed)
    }

    /// Queues an event without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::ChannelFull`] or [`TrackerError::ChannelClosed`].
    pub fn try_send(&self, event: TrackerEvent) -> Result<(), TrackerError> {
        self.tx.try_send(event).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TrackerError::ChannelFull,
            mpsc::error::TrySendError::Closed(_) => TrackerError::ChannelClosed,
        })
    }
}

fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

/// Sum of output values of a verbose transaction.
fn output_value(tx: &Value) -> f64 {
    tx.get("vout")
        .and_then(Value::as_array)
        .map(|outs| outs.iter().filter_map(|o| o.get("value").and_then(Value::as_f64)).sum())
        .unwrap_or(0.0)
}

/// Fee of a `getrawmempool true` entry, across daemon versions.
fn mempool_fee(entry: &Value) -> f64 {
    entry
        .get("fees")
        .and_then(|fees| fees.get("base"))
        .or_else(|| entry.get("fee"))
        .and_then(Value::as_f64)
        .unwrap_or(0.0)
}

pub struct LifecycleTracker {
    engine: Arc<ProxyEngine>,
    chain_state: Arc<ChainState>,
    state: RwLock<LifecycleState>,
    sink: Arc<dyn DeltaSink>,
    metrics: Arc<MetricsCollector>,
    config: TrackerConfig,
    events_tx: mpsc::Sender<TrackerEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<TrackerEvent>>>,
    /// Tip height at the last mempool diff that reported removals.
    mempool_synced_height: Mutex<Option<u64>>,
}

impl LifecycleTracker {
    #[must_use]
    pub fn new(
        engine: Arc<ProxyEngine>,
        sink: Arc<dyn DeltaSink>,
        metrics: Arc<MetricsCollector>,
        config: TrackerConfig,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(config.event_capacity.max(1));
        Self {
            chain_state: Arc::clone(engine.chain_state()),
            engine,
            state: RwLock::new(LifecycleState::new(config.lifecycle.clone())),
            sink,
            metrics,
            config,
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            mempool_synced_height: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn handle(&self) -> TrackerHandle {
        TrackerHandle { tx: self.events_tx.clone() }
    }

    #[must_use]
    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Spawns the worker. Runs until `shutdown_rx` fires.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::AlreadyStarted`] on a second call.
    pub fn start(
        self: &Arc<Self>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<JoinHandle<()>, TrackerError> {
        let mut events = self.events_rx.lock().take().ok_or(TrackerError::AlreadyStarted)?;
        let tracker = Arc::clone(self);

        Ok(tokio::spawn(async move {
            let poll_period = tracker.config.poll_interval.max(Duration::from_millis(100));
            let sweep_period = tracker.config.sweep_interval.max(Duration::from_millis(100));
            let mut poll = interval_at(Instant::now() + poll_period, poll_period);
            let mut sweep = interval_at(Instant::now() + sweep_period, sweep_period);
            poll.set_missed_tick_behavior(MissedTickBehavior::Skip);
            sweep.set_missed_tick_behavior(MissedTickBehavior::Skip);

            info!(polling = tracker.config.polling, "lifecycle tracker started");

            loop {
                tokio::select! {
                    biased;

                    _ = shutdown_rx.recv() => {
                        info!("lifecycle tracker shutting down");
                        break;
                    }
                    Some(event) = events.recv() => {
                        tracker.process(event).await;
                    }
                    _ = poll.tick(), if tracker.config.polling => {
                        tracker.process(TrackerEvent::Poll).await;
                    }
                    _ = sweep.tick() => {
                        tracker.process(TrackerEvent::Sweep).await;
                    }
                }
            }
        }))
    }

    /// Applies one event to completion.
    pub async fn process(&self, event: TrackerEvent) {
        trace!(event = ?event, "processing tracker event");
        match event {
            TrackerEvent::NewBlockHash(hash) => self.on_new_block(&hash).await,
            TrackerEvent::NewTransaction(raw) => self.on_pushed_transaction(&raw).await,
            TrackerEvent::RemovedTransaction(txid) => self.on_removed_transaction(&txid),
            TrackerEvent::Poll => self.poll().await,
            TrackerEvent::Sweep => {
                self.sweep_at(unix_millis());
            }
            TrackerEvent::Backfill { from, to } => self.backfill(from, to).await,
        }
        self.record_sizes();
    }

    /// Loads persisted state. Call before [`reconcile`](Self::reconcile).
    pub fn restore(&self, snapshot: LifecycleSnapshot) {
        let mut state = self.state.write();
        state.restore(snapshot);
        if let Some(tip) = state.tip() {
            self.chain_state.force_update_tip(tip.height, &tip.hash);
        }
        info!(
            blocks = state.blocks().len(),
            pending = state.pending_len(),
            confirmed = state.recent_confirmed().len(),
            "lifecycle state restored"
        );
    }

    /// Rebuilds the recent-blocks window from the daemon.
    ///
    /// Individual hash or block fetch failures are logged and skipped. Restored blocks whose
    /// hash still matches the chain are reused without a fetch.
    ///
    /// # Errors
    ///
    /// Returns [`TrackerError::Initialization`] when `getblockchaininfo` cannot be fetched.
    pub async fn reconcile(&self) -> Result<usize, TrackerError> {
        let info = self
            .engine
            .call_with_retry("getblockchaininfo", vec![], CallOptions::fresh(), &self.config.retry)
            .await
            .map_err(TrackerError::Initialization)?;

        let tip = info.get("blocks").and_then(Value::as_u64).ok_or_else(|| {
            TrackerError::Initialization(ProxyError::Upstream(UpstreamError::InvalidResponse(
                "getblockchaininfo without 'blocks'".into(),
            )))
        })?;

        let window = self.config.lifecycle.window_size.max(1) as u64;
        let heights: Vec<u64> = (tip.saturating_sub(window - 1)..=tip).rev().collect();
        let restored: AHashMap<u64, Block> =
            self.state.read().blocks().iter().map(|b| (b.height, b.clone())).collect();

        info!(tip = tip, target = heights.len(), restored = restored.len(), "reconciling recent blocks");

        let mut blocks = Vec::with_capacity(heights.len());
        let mut fetched: Vec<ObservedBlock> = Vec::new();
        let mut failures = 0usize;

        for batch in heights.chunks(self.config.reconcile_batch_size.max(1)) {
            let hashes = join_all(batch.iter().map(|height| self.fetch_block_hash(*height))).await;

            let mut missing = Vec::new();
            for (height, hash) in batch.iter().zip(hashes) {
                match hash {
                    Some(hash) => match restored.get(height).filter(|b| b.hash == hash) {
                        Some(block) => blocks.push(block.clone()),
                        None => missing.push(hash),
                    },
                    None => failures += 1,
                }
            }

            let details = join_all(missing.iter().map(|hash| self.fetch_block(hash, false))).await;
            for observed in details {
                match observed {
                    Some(observed) => {
                        blocks.push(observed.block.clone());
                        fetched.push(observed);
                    }
                    None => failures += 1,
                }
            }

            debug!(collected = blocks.len(), target = heights.len(), "reconciliation progress");
        }

        let (window_blocks, recent, confirmations) = {
            let mut state = self.state.write();
            state.replace_window(blocks);
            let confirmations: Vec<(Block, Vec<Transaction>)> = fetched
                .into_iter()
                .map(|observed| {
                    let confirmed = state.confirm_transactions(observed.block.height, &observed.txids);
                    (observed.block, confirmed)
                })
                .filter(|(_, confirmed)| !confirmed.is_empty())
                .collect();
            (state.blocks().to_vec(), state.recent_confirmed(), confirmations)
        };

        if let Some(tip_block) = window_blocks.first() {
            self.chain_state.force_update_tip(tip_block.height, &tip_block.hash);
            self.metrics.record_chain_tip(tip_block.height);
            *self.mempool_synced_height.lock() = Some(tip_block.height);
        }

        let collected = window_blocks.len();
        self.sink.publish(LifecycleDelta::RecentBlocks(window_blocks));
        self.sink.publish(LifecycleDelta::RecentTransactions(recent));
        for (block, transactions) in confirmations {
            self.metrics.record_confirmations(transactions.len());
            self.sink.publish(LifecycleDelta::TransactionsConfirmed {
                height: block.height,
                hash: block.hash,
                transactions,
            });
        }
        self.record_sizes();

        if failures > 0 {
            warn!(failures = failures, collected = collected, "reconciliation finished with gaps");
        } else {
            info!(collected = collected, "reconciliation finished");
        }
        Ok(collected)
    }

    async fn fetch_block_hash(&self, height: u64) -> Option<String> {
        match self
            .engine
            .call_with_retry("getblockhash", vec![json!(height)], CallOptions::default(), &self.config.retry)
            .await
        {
            Ok(Value::String(hash)) => Some(hash),
            Ok(other) => {
                warn!(height = height, value = %other, "unexpected getblockhash result");
                None
            }
            Err(e) => {
                warn!(height = height, error = %e, "failed to fetch block hash");
                None
            }
        }
    }

    async fn fetch_block(&self, hash: &str, priority: bool) -> Option<ObservedBlock> {
        let options = CallOptions { bypass_cache: false, priority };
        match self
            .engine
            .call_with_retry("getblock", vec![json!(hash), json!(2)], options, &self.config.retry)
            .await
        {
            Ok(raw) => {
                let observed = parse_block(&raw, self.config.network);
                if observed.is_none() {
                    warn!(hash = hash, "block response missing hash or height");
                }
                observed
            }
            Err(e) => {
                warn!(hash = hash, error = %e, "failed to fetch block");
                None
            }
        }
    }

    async fn on_new_block(&self, hash: &str) {
        if self.state.read().contains_block(hash) {
            trace!(hash = hash, "block already in window");
            return;
        }
        let Some(observed) = self.fetch_block(hash, true).await else {
            return;
        };

        if self.config.backfill_gaps {
            let previous_tip = self.state.read().tip().map(|b| b.height);
            if let Some(previous) = previous_tip {
                if observed.block.height > previous + 1 {
                    self.backfill(previous + 1, observed.block.height - 1).await;
                }
            }
        }

        self.apply_observed(observed);
    }

    fn apply_observed(&self, observed: ObservedBlock) {
        let block = observed.block.clone();
        let Some(applied) = self.state.write().apply_block(observed) else {
            trace!(hash = %block.hash, "duplicate block ignored");
            return;
        };

        if block.height >= self.chain_state.current_tip() || !self.chain_state.is_known() {
            self.chain_state.force_update_tip(block.height, &block.hash);
            self.metrics.record_chain_tip(block.height);
        }

        if let Some(replaced) = &applied.replaced {
            info!(height = block.height, old = %replaced.hash, new = %block.hash, "block replaced at height");
        }
        if let Some(previous) = applied.previous_tip {
            if block.height > previous + 1 {
                debug!(previous = previous, height = block.height, "gap in recent blocks");
            }
        }

        if applied.in_window {
            debug!(height = block.height, hash = %block.hash, pool = %block.pool, "new block");
            self.sink.publish(LifecycleDelta::NewBlock(block.clone()));
        }

        if !applied.confirmed.is_empty() {
            debug!(height = block.height, confirmed = applied.confirmed.len(), "transactions confirmed");
            self.metrics.record_confirmations(applied.confirmed.len());
            self.sink.publish(LifecycleDelta::TransactionsConfirmed {
                height: block.height,
                hash: block.hash,
                transactions: applied.confirmed,
            });
        }
    }

    async fn backfill(&self, from: u64, to: u64) {
        if from > to {
            return;
        }
        let window = self.config.lifecycle.window_size.max(1) as u64;
        let from = from.max(to.saturating_sub(window - 1));
        info!(from = from, to = to, "backfilling blocks");

        for height in from..=to {
            if self.state.read().block_at(height).is_some() {
                continue;
            }
            let Some(hash) = self.fetch_block_hash(height).await else {
                continue;
            };
            if let Some(observed) = self.fetch_block(&hash, false).await {
                self.apply_observed(observed);
            }
        }
    }

    async fn on_pushed_transaction(&self, raw: &str) {
        let decoded = match self
            .engine
            .call("decoderawtransaction", vec![json!(raw)], CallOptions::default())
            .await
        {
            Ok(outcome) => outcome.value,
            Err(e) => {
                warn!(error = %e, "failed to decode pushed transaction");
                return;
            }
        };
        let Some(txid) = decoded.get("txid").and_then(Value::as_str) else {
            warn!("decoded transaction without txid");
            return;
        };

        let tx = Transaction::pending(txid, output_value(&decoded), 0.0, unix_millis());
        self.admit_pending(tx);
    }

    fn admit_pending(&self, tx: Transaction) {
        if self.state.write().add_pending(tx.clone()) {
            trace!(txid = %tx.txid, "transaction pending");
            self.sink.publish(LifecycleDelta::NewTransaction(tx));
        }
    }

    fn on_removed_transaction(&self, txid: &str) {
        if self.state.write().remove_pending(txid).is_some() {
            trace!(txid = txid, "transaction removed from mempool");
            self.sink.publish(LifecycleDelta::RemovedTransaction(txid.to_string()));
        }
    }

    async fn poll(&self) {
        let head_applied = self.check_head().await;
        let covered = head_applied && self.catch_up().await;
        self.sync_mempool(covered).await;
    }

    /// Returns `true` when the daemon's best block is in the window afterwards.
    async fn check_head(&self) -> bool {
        let hash = match self.engine.call("getbestblockhash", vec![], CallOptions::fresh()).await {
            Ok(outcome) => match outcome.value.as_str() {
                Some(hash) => hash.to_string(),
                None => {
                    warn!(value = %outcome.value, "unexpected getbestblockhash result");
                    return false;
                }
            },
            Err(e) => {
                warn!(error = %e, "failed to poll chain head");
                return false;
            }
        };
        self.on_new_block(&hash).await;
        self.state.read().contains_block(&hash)
    }

    /// Fetches heights skipped since the last removal diff. Returns `true` when every one of
    /// them is now in the window.
    async fn catch_up(&self) -> bool {
        let tip = self.state.read().tip().map(|b| b.height);
        let synced = *self.mempool_synced_height.lock();
        let (Some(tip), Some(synced)) = (tip, synced) else {
            return tip.is_some();
        };
        if tip > synced + 1 {
            self.backfill(synced + 1, tip - 1).await;
        }
        self.state.read().covers(synced + 1, tip)
    }

    /// Diffs the daemon mempool against Pending. Vanished ids are reported as removed only
    /// when `covered`, i.e. every block that could have confirmed them has been applied.
    async fn sync_mempool(&self, covered: bool) {
        let outcome = match self
            .engine
            .call("getrawmempool", vec![json!(true)], CallOptions::fresh())
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(error = %e, "failed to poll mempool");
                return;
            }
        };
        if outcome.status.is_degraded() {
            debug!(status = %outcome.status, "skipping mempool diff on degraded data");
            return;
        }
        let Some(entries) = outcome.value.as_object() else {
            warn!("getrawmempool returned a non-object");
            return;
        };

        let (fresh, vanished) = {
            let state = self.state.read();
            let fresh: Vec<(String, f64)> = entries
                .iter()
                .filter(|(txid, _)| !state.is_pending(txid) && !state.is_known_mined(txid))
                .take(self.config.max_new_transactions_per_poll)
                .map(|(txid, entry)| (txid.clone(), mempool_fee(entry)))
                .collect();
            let present: AHashSet<&str> = entries.keys().map(String::as_str).collect();
            let vanished: Vec<String> =
                state.pending_ids().into_iter().filter(|id| !present.contains(id.as_str())).collect();
            (fresh, vanished)
        };

        if covered {
            for txid in &vanished {
                self.on_removed_transaction(txid);
            }
            let tip = self.state.read().tip().map(|b| b.height);
            *self.mempool_synced_height.lock() = tip;
        } else if !vanished.is_empty() {
            debug!(vanished = vanished.len(), "chain head not fully applied, keeping vanished ids pending");
        }

        for (txid, fee) in fresh {
            let value = match self
                .engine
                .call("getrawtransaction", vec![json!(txid), json!(true)], CallOptions::default())
                .await
            {
                Ok(outcome) => output_value(&outcome.value),
                Err(e) => {
                    debug!(txid = %txid, error = %e, "mempool transaction vanished before lookup");
                    continue;
                }
            };
            self.admit_pending(Transaction::pending(txid, value, fee, unix_millis()));
        }
    }

    /// Drops Pending entries older than the retention horizon at `now_ms`.
    pub fn sweep_at(&self, now_ms: u64) -> Vec<String> {
        let expired = self.state.write().sweep(now_ms);
        if !expired.is_empty() {
            debug!(expired = expired.len(), "pending transactions expired");
            self.metrics.record_expired(expired.len());
        }
        expired
    }

    fn record_sizes(&self) {
        let stats = self.stats();
        self.metrics.record_tracker_sizes(stats.blocks, stats.pending, stats.recent_confirmed);
    }

    #[must_use]
    pub fn snapshot(&self) -> LifecycleSnapshot {
        self.state.read().snapshot()
    }

    #[must_use]
    pub fn recent_blocks(&self) -> Vec<Block> {
        self.state.read().blocks().to_vec()
    }

    #[must_use]
    pub fn recent_confirmed(&self) -> Vec<Transaction> {
        self.state.read().recent_confirmed()
    }

    #[must_use]
    pub fn pending(&self) -> Vec<Transaction> {
        self.state.read().pending()
    }

    #[must_use]
    pub fn is_pending(&self, txid: &str) -> bool {
        self.state.read().is_pending(txid)
    }

    #[must_use]
    pub fn stats(&self) -> TrackerStats {
        let state = self.state.read();
        TrackerStats {
            blocks: state.blocks().len(),
            pending: state.pending_len(),
            recent_confirmed: state.recent_confirmed().len(),
            tip_height: state.tip().map(|b| b.height),
        }
    }
}
