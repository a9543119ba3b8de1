//! Runtime lifecycle management including background tasks and graceful shutdown.

use crate::{
    broadcast::{start_geo_refresher, start_summary_refresher, BroadcastHub},
    chain::{state::current_unix_timestamp, LifecycleTracker, TrackerHandle},
    config::AppConfig,
    persistence::PersistenceSidecar,
    proxy::ProxyEngine,
};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{sync::broadcast, task::JoinHandle};
use tracing::{debug, error, info, warn};

use super::{builder::RelayRuntimeBuilder, RelayComponents, RuntimeError};

/// Main runtime container managing component lifecycles and background tasks.
///
/// Owns all initialized components and their background tasks. `shutdown()` signals every
/// task over a broadcast channel and awaits them, so the persistence sidecar gets to write
/// its final snapshot before the process exits.
pub struct RelayRuntime {
    components: RelayComponents,
    shutdown_tx: broadcast::Sender<()>,
    config: AppConfig,
    enable_persistence: bool,
    enable_refreshers: bool,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
    started: bool,
    shutdown_initiated: Arc<AtomicBool>,
}

impl RelayRuntime {
    #[must_use]
    pub fn builder() -> RelayRuntimeBuilder {
        RelayRuntimeBuilder::new()
    }

    pub(super) fn new(
        components: RelayComponents,
        shutdown_tx: broadcast::Sender<()>,
        config: AppConfig,
        enable_persistence: bool,
        enable_refreshers: bool,
    ) -> Self {
        Self {
            components,
            shutdown_tx,
            config,
            enable_persistence,
            enable_refreshers,
            tasks: Vec::new(),
            started: false,
            shutdown_initiated: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Restores the persisted snapshot, reconciles with the daemon and spawns background tasks.
    ///
    /// Calling `start` on a started runtime is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::Tracker`] when the initial reconcile cannot reach the daemon.
    /// Nothing has been spawned in that case.
    pub async fn start(&mut self) -> Result<(), RuntimeError> {
        if self.started {
            warn!("Runtime already started, ignoring duplicate call");
            return Ok(());
        }

        let tracker = self.components.tracker().clone();
        let hub = self.components.hub().clone();

        if self.enable_persistence {
            if let Some(snapshot) =
                self.config.snapshot_store().load(current_unix_timestamp()).await
            {
                tracker.restore(snapshot);
            }
        }

        let blocks = tracker.reconcile().await?;
        info!(blocks = blocks, "Initial reconcile complete");

        self.tasks.push(("lifecycle tracker", tracker.start(self.shutdown_tx.subscribe())?));
        self.tasks.push(("liveness probe", hub.start_probe(self.shutdown_tx.subscribe())));
        debug!("Tracker and liveness probe started");

        if self.enable_persistence {
            let sidecar = PersistenceSidecar::new(
                self.config.snapshot_store(),
                tracker.clone(),
                Duration::from_secs(self.config.persistence.interval_seconds),
                self.components.metrics_collector().clone(),
            );
            self.tasks.push(("persistence sidecar", sidecar.start(self.shutdown_tx.subscribe())));
            debug!(path = %self.config.persistence.path.display(), "Persistence sidecar started");
        }

        if self.enable_refreshers {
            self.tasks.push((
                "summary refresher",
                start_summary_refresher(
                    self.components.proxy_engine().clone(),
                    hub.clone(),
                    Duration::from_secs(self.config.broadcast.summary_refresh_seconds),
                    self.shutdown_tx.subscribe(),
                ),
            ));
            if let Some(task) = start_geo_refresher(
                self.config.geo_directory(),
                hub,
                Duration::from_secs(self.config.broadcast.geo_refresh_seconds),
                self.shutdown_tx.subscribe(),
            ) {
                self.tasks.push(("geo refresher", task));
            }
        }

        self.started = true;
        info!(tasks = self.tasks.len(), "Relay runtime started");
        Ok(())
    }

    #[must_use]
    pub fn components(&self) -> &RelayComponents {
        &self.components
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    #[must_use]
    pub fn proxy_engine(&self) -> &Arc<ProxyEngine> {
        self.components.proxy_engine()
    }

    #[must_use]
    pub fn hub(&self) -> &Arc<BroadcastHub> {
        self.components.hub()
    }

    #[must_use]
    pub fn tracker(&self) -> &Arc<LifecycleTracker> {
        self.components.tracker()
    }

    /// Sender half for daemon notifications (webhooks, push endpoints).
    #[must_use]
    pub fn tracker_handle(&self) -> TrackerHandle {
        self.components.tracker().handle()
    }

    #[must_use]
    pub fn metrics_collector(&self) -> &Arc<crate::metrics::MetricsCollector> {
        self.components.metrics_collector()
    }

    /// Creates a new shutdown receiver for external shutdown coordination.
    #[must_use]
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Signals every background task and waits for it to finish. Idempotent.
    pub async fn shutdown(self) {
        if self
            .shutdown_initiated
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Shutdown already initiated, ignoring duplicate call");
            return;
        }

        info!("Initiating relay runtime shutdown");
        if let Err(e) = self.shutdown_tx.send(()) {
            warn!(error = %e, "Failed to send shutdown signal (no receivers)");
        }

        for (name, task) in self.tasks {
            match task.await {
                Ok(()) => debug!(task = name, "Background task completed"),
                Err(e) if e.is_cancelled() => debug!(task = name, "Background task cancelled"),
                Err(e) => error!(task = name, error = %e, "Background task failed"),
            }
        }

        self.components.proxy_engine().gateway().close();
        info!("Relay runtime shutdown complete");
    }

    /// Waits for a shutdown signal, then performs cleanup.
    pub async fn wait_for_shutdown(self) {
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let _ = shutdown_rx.recv().await;
        info!("Shutdown signal received, runtime terminating");
        self.shutdown().await;
    }
}

const _: () = {
    const fn assert_send<T: Send>() {}
    const fn assert_sync<T: Sync>() {}
    let _ = assert_send::<RelayRuntime>;
    let _ = assert_sync::<RelayRuntime>;
};
