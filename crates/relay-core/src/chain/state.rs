//! Shared chain tip.
//!
//! `ChainState` is the single source of truth for the daemon's current best block as seen by
//! the lifecycle tracker. The tracker is the only writer; the cached call façade reads it to
//! build estimated placeholders when the daemon is unavailable.

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{SystemTime, UNIX_EPOCH},
};
use tracing::trace;

/// Combined tip state: height and hash.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChainTip {
    pub height: u64,
    pub hash: String,
}

/// Shared chain tip with wait-free reads.
///
/// # Tip Update Method Selection
///
/// | Method | Use When | Behavior |
/// |--------|----------|----------|
/// | `update_tip()` | Normal block progression | Rejects if new height ≤ current |
/// | `force_update_tip()` | Same-height replacement or rollback | Always updates |
///
/// # Example
///
/// ```
/// use relay_core::chain::ChainState;
///
/// let chain_state = ChainState::new();
/// assert!(chain_state.update_tip(1000, "00ab"));
/// assert!(!chain_state.update_tip(999, "00cd"));
/// assert_eq!(chain_state.current_tip(), 1000);
/// ```
#[derive(Clone)]
pub struct ChainState {
    tip: Arc<ArcSwap<ChainTip>>,

    /// Serializes writers; readers never take it.
    tip_write_lock: Arc<Mutex<()>>,

    /// Unix timestamp (seconds) of the last tip update.
    last_tip_update: Arc<AtomicU64>,
}

/// Returns the current unix timestamp in seconds.
pub(crate) fn current_unix_timestamp() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

impl ChainState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tip: Arc::new(ArcSwap::from_pointee(ChainTip::default())),
            tip_write_lock: Arc::new(Mutex::new(())),
            last_tip_update: Arc::new(AtomicU64::new(current_unix_timestamp())),
        }
    }

    #[inline]
    #[must_use]
    pub fn current_tip(&self) -> u64 {
        self.tip.load().height
    }

    #[must_use]
    pub fn current_tip_with_hash(&self) -> ChainTip {
        ChainTip::clone(&self.tip.load())
    }

    /// `true` once any tip has been recorded.
    #[must_use]
    pub fn is_known(&self) -> bool {
        !self.tip.load().hash.is_empty()
    }

    /// Seconds since the last tip update.
    #[inline]
    #[must_use]
    pub fn tip_age_seconds(&self) -> u64 {
        let last_update = self.last_tip_update.load(Ordering::Acquire);
        current_unix_timestamp().saturating_sub(last_update)
    }

    /// Moves the tip forward. Returns `false` when `height` is not above the current tip.
    pub fn update_tip(&self, height: u64, hash: &str) -> bool {
        let _guard = self.tip_write_lock.lock();

        if self.is_known() && height <= self.tip.load().height {
            return false;
        }

        self.tip.store(Arc::new(ChainTip { height, hash: hash.to_string() }));
        self.last_tip_update.store(current_unix_timestamp(), Ordering::Release);
        trace!(height = height, "chain tip updated");
        true
    }

    /// Sets the tip unconditionally, e.g. when a block at the tip height was replaced.
    pub fn force_update_tip(&self, height: u64, hash: &str) {
        let _guard = self.tip_write_lock.lock();
        self.tip.store(Arc::new(ChainTip { height, hash: hash.to_string() }));
        self.last_tip_update.store(current_unix_timestamp(), Ordering::Release);
        trace!(height = height, "chain tip force updated");
    }
}

impl Default for ChainState {
    fn default() -> Self {
        Self::new()
    }
}
