//! Pure lifecycle state: the recent-blocks window and the two transaction sets.
//!
//! No I/O and no clock: callers pass `now` explicitly, which keeps every transition
//! deterministic under test. The [`LifecycleTracker`](super::tracker::LifecycleTracker) owns
//! the only mutable instance.
//!
//! # Invariants
//!
//! - the window holds at most `window_size` blocks, sorted by strictly descending height, one
//!   block per height
//! - a txid moves Pending → Confirmed at most once; the bounded confirmed-id index keeps this
//!   true after the transaction has been evicted from the recent-confirmed list
//! - every mutation is applied per item, so a failure between items never leaves a partially
//!   updated entry behind

use ahash::{AHashMap, AHashSet};
use serde::{Deserialize, Serialize};
use std::{collections::VecDeque, time::Duration};

use super::types::{Block, ObservedBlock, Transaction, TxState};

#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Size N of the recent-blocks window.
    pub window_size: usize,
    /// Size of the recent-confirmed list.
    pub confirmed_cap: usize,
    /// Pending entries older than this are dropped without confirmation.
    pub pending_retention: Duration,
    /// Number of mined txids remembered to reject late mempool sightings.
    pub confirmed_index_cap: usize,
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            window_size: 240,
            confirmed_cap: 10,
            pending_retention: Duration::from_secs(180),
            confirmed_index_cap: 10_000,
        }
    }
}

/// Durable subset of the lifecycle state.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LifecycleSnapshot {
    pub blocks: Vec<Block>,
    pub pending: Vec<Transaction>,
    pub confirmed: Vec<Transaction>,
}

/// What happened when a block was applied.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockApplied {
    /// `false` when the block fell outside a full window (older than everything kept).
    pub in_window: bool,
    /// The block previously stored at the same height, if it had a different hash.
    pub replaced: Option<Block>,
    /// Transactions this block moved from Pending to Confirmed.
    pub confirmed: Vec<Transaction>,
    /// Height of the newest block before this one was applied.
    pub previous_tip: Option<u64>,
}

#[derive(Debug, Clone, Default)]
pub struct LifecycleState {
    config: LifecycleConfig,
    blocks: Vec<Block>,
    pending: AHashMap<String, Transaction>,
    confirmed: VecDeque<Transaction>,
    mined_ids: AHashSet<String>,
    mined_order: VecDeque<String>,
}

impl LifecycleState {
    #[must_use]
    pub fn new(mut config: LifecycleConfig) -> Self {
        config.window_size = config.window_size.max(1);
        Self { config, ..Self::default() }
    }

    #[must_use]
    pub fn config(&self) -> &LifecycleConfig {
        &self.config
    }

    /// Recent blocks, newest first.
    #[must_use]
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    #[must_use]
    pub fn tip(&self) -> Option<&Block> {
        self.blocks.first()
    }

    #[must_use]
    pub fn contains_block(&self, hash: &str) -> bool {
        self.blocks.iter().any(|b| b.hash == hash)
    }

    #[must_use]
    pub fn block_at(&self, height: u64) -> Option<&Block> {
        self.blocks.iter().find(|b| b.height == height)
    }

    /// `true` when every height of `from..=to` that fits in the window is present.
    #[must_use]
    pub fn covers(&self, from: u64, to: u64) -> bool {
        let floor = to.saturating_sub(self.config.window_size as u64 - 1);
        (from.max(floor)..=to).all(|height| self.block_at(height).is_some())
    }

    #[must_use]
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_pending(&self, txid: &str) -> bool {
        self.pending.contains_key(txid)
    }

    #[must_use]
    pub fn pending_ids(&self) -> Vec<String> {
        self.pending.keys().cloned().collect()
    }

    /// Pending transactions, most recently observed first.
    #[must_use]
    pub fn pending(&self) -> Vec<Transaction> {
        let mut txs: Vec<Transaction> = self.pending.values().cloned().collect();
        txs.sort_by(|a, b| b.observed_at.cmp(&a.observed_at).then_with(|| a.txid.cmp(&b.txid)));
        txs
    }

    /// Recently confirmed transactions, newest confirmation first.
    #[must_use]
    pub fn recent_confirmed(&self) -> Vec<Transaction> {
        self.confirmed.iter().cloned().collect()
    }

    /// `true` if the txid was seen in a block or already confirmed.
    #[must_use]
    pub fn is_known_mined(&self, txid: &str) -> bool {
        self.mined_ids.contains(txid)
    }

    fn remember_mined(&mut self, txid: &str) {
        if self.config.confirmed_index_cap == 0 || !self.mined_ids.insert(txid.to_string()) {
            return;
        }
        self.mined_order.push_back(txid.to_string());
        while self.mined_order.len() > self.config.confirmed_index_cap {
            if let Some(oldest) = self.mined_order.pop_front() {
                self.mined_ids.remove(&oldest);
            }
        }
    }

    fn push_confirmed(&mut self, tx: Transaction) {
        self.confirmed.push_front(tx);
        self.confirmed.truncate(self.config.confirmed_cap);
    }

    fn insert_sorted(&mut self, block: Block) -> Option<Block> {
        let replaced = self
            .blocks
            .iter()
            .position(|b| b.height == block.height)
            .map(|idx| self.blocks.remove(idx));

        let idx = self.blocks.partition_point(|b| b.height > block.height);
        self.blocks.insert(idx, block);
        self.blocks.truncate(self.config.window_size);
        replaced
    }

    /// Applies a newly observed block.
    ///
    /// Returns `None` when the window already holds a block with this hash. A different block
    /// at an existing height replaces it. Every txid in the block that is Pending becomes
    /// Confirmed at this height.
    pub fn apply_block(&mut self, observed: ObservedBlock) -> Option<BlockApplied> {
        let ObservedBlock { block, txids } = observed;
        if self.contains_block(&block.hash) {
            return None;
        }

        let previous_tip = self.tip().map(|b| b.height);
        let height = block.height;
        let hash = block.hash.clone();
        let replaced = self.insert_sorted(block);
        let in_window = self.contains_block(&hash);
        let confirmed = self.confirm_transactions(height, &txids);

        Some(BlockApplied { in_window, replaced, confirmed, previous_tip })
    }

    /// Moves every Pending txid in `txids` to Confirmed at `height` and remembers all of them
    /// as mined. Returns the newly confirmed transactions in block order.
    pub fn confirm_transactions(&mut self, height: u64, txids: &[String]) -> Vec<Transaction> {
        let mut confirmed = Vec::new();
        for txid in txids {
            if let Some(mut tx) = self.pending.remove(txid) {
                tx.state = TxState::Confirmed;
                tx.confirming_block_height = Some(height);
                confirmed.push(tx.clone());
                self.push_confirmed(tx);
            }
            self.remember_mined(txid);
        }
        confirmed
    }

    /// Replaces the whole window, e.g. after startup reconciliation.
    pub fn replace_window(&mut self, mut blocks: Vec<Block>) {
        blocks.sort_by(|a, b| b.height.cmp(&a.height));
        blocks.dedup_by_key(|b| b.height);
        blocks.truncate(self.config.window_size);
        self.blocks = blocks;
    }

    /// Inserts a newly seen mempool transaction. Returns `false` if it is already Pending or
    /// already mined.
    pub fn add_pending(&mut self, tx: Transaction) -> bool {
        if self.pending.contains_key(&tx.txid) || self.mined_ids.contains(&tx.txid) {
            return false;
        }
        self.pending.insert(tx.txid.clone(), tx);
        true
    }

    /// Drops a Pending transaction without confirming it.
    pub fn remove_pending(&mut self, txid: &str) -> Option<Transaction> {
        self.pending.remove(txid)
    }

    /// Removes Pending entries older than the retention horizon. Returns the dropped ids.
    pub fn sweep(&mut self, now_ms: u64) -> Vec<String> {
        let horizon = u64::try_from(self.config.pending_retention.as_millis()).unwrap_or(u64::MAX);
        let expired: Vec<String> = self
            .pending
            .values()
            .filter(|tx| now_ms.saturating_sub(tx.observed_at) > horizon)
            .map(|tx| tx.txid.clone())
            .collect();

        for txid in &expired {
            self.pending.remove(txid);
        }
        expired
    }

    #[must_use]
    pub fn snapshot(&self) -> LifecycleSnapshot {
        LifecycleSnapshot {
            blocks: self.blocks.clone(),
            pending: self.pending(),
            confirmed: self.recent_confirmed(),
        }
    }

    /// Loads a snapshot into an empty state, re-establishing every invariant.
    pub fn restore(&mut self, snapshot: LifecycleSnapshot) {
        self.replace_window(snapshot.blocks);

        let mut confirmed = snapshot.confirmed;
        confirmed.retain(|tx| tx.state == TxState::Confirmed);
        confirmed.truncate(self.config.confirmed_cap);
        for tx in confirmed.iter().rev() {
            self.remember_mined(&tx.txid);
        }
        self.confirmed = confirmed.into();

        self.pending.clear();
        for tx in snapshot.pending.into_iter().filter(Transaction::is_pending) {
            if !self.mined_ids.contains(&tx.txid) {
                self.pending.insert(tx.txid.clone(), tx);
            }
        }
    }
}
