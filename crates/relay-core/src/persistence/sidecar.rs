use std::{sync::Arc, time::Duration};
use tokio::{
    sync::broadcast,
    task::JoinHandle,
    time::{interval_at, Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use super::{SnapshotError, SnapshotStore};
use crate::{chain::state::current_unix_timestamp, chain::LifecycleTracker, metrics::MetricsCollector};

/// Mirrors the tracker's durable state to disk on a fixed interval and once at shutdown.
pub struct PersistenceSidecar {
    store: SnapshotStore,
    tracker: Arc<LifecycleTracker>,
    interval: Duration,
    metrics: Arc<MetricsCollector>,
}

impl PersistenceSidecar {
    #[must_use]
    pub fn new(
        store: SnapshotStore,
        tracker: Arc<LifecycleTracker>,
        interval: Duration,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self { store, tracker, interval, metrics }
    }

    /// Writes one snapshot now.
    ///
    /// # Errors
    ///
    /// Returns the [`SnapshotError`] of the write.
    pub async fn save_now(&self) -> Result<usize, SnapshotError> {
        let snapshot = self.tracker.snapshot();
        let bytes = self.store.save(snapshot, current_unix_timestamp()).await?;
        self.metrics.record_snapshot_saved(bytes);
        debug!(path = %self.store.path().display(), bytes = bytes, "snapshot saved");
        Ok(bytes)
    }

    async fn save_logged(&self) {
        if let Err(e) = self.save_now().await {
            warn!(path = %self.store.path().display(), error = %e, "snapshot save failed");
        }
    }

    /// Spawns the save loop. The final snapshot is written before the task ends.
    pub fn start(self, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let period = self.interval.max(Duration::from_secs(1));
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = ticker.tick() => self.save_logged().await,
                    _ = shutdown_rx.recv() => {
                        self.save_logged().await;
                        info!(path = %self.store.path().display(), "persistence sidecar stopped after final snapshot");
                        break;
                    }
                }
            }
        })
    }
}
