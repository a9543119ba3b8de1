//! Periodic cache-refresh fanout: chain summary and geo peer list.

use futures::future::join3;
use serde_json::json;
use std::{sync::Arc, time::Duration};
use tokio::{
    sync::broadcast,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use super::{
    hub::BroadcastHub,
    messages::{ChainSummary, MempoolSnapshot},
};
use crate::{
    chain::LifecycleTracker,
    peers::GeoDirectory,
    proxy::{CallOptions, ProxyEngine, ProxyError},
};

/// Fetches `getblockchaininfo`, `getchaintxstats` and `gettxoutsetinfo` through the façade.
///
/// The three calls run concurrently; each may come back stale or estimated.
///
/// # Errors
///
/// Returns the first error among the three calls.
pub async fn fetch_summary(engine: &ProxyEngine) -> Result<ChainSummary, ProxyError> {
    let (info, stats, txouts) = join3(
        engine.call("getblockchaininfo", vec![], CallOptions::fresh()),
        engine.call("getchaintxstats", vec![], CallOptions::default()),
        engine.call("gettxoutsetinfo", vec![], CallOptions::default()),
    )
    .await;

    Ok(ChainSummary {
        blockchain_info: info?.value,
        chain_tx_stats: stats?.value,
        tx_out_set_info: txouts?.value,
    })
}

/// Builds the `mempool` answer: daemon mempool info plus the tracker's Pending set.
pub async fn mempool_snapshot(engine: &ProxyEngine, tracker: &LifecycleTracker) -> MempoolSnapshot {
    let info = match engine.call("getmempoolinfo", vec![], CallOptions::default()).await {
        Ok(outcome) => outcome.value,
        Err(e) => {
            warn!(error = %e, "failed to fetch mempool info");
            json!({})
        }
    };
    MempoolSnapshot { info, transactions: tracker.pending() }
}

/// Publishes a fresh summary every `every`, starting immediately.
pub fn start_summary_refresher(
    engine: Arc<ProxyEngine>,
    hub: Arc<BroadcastHub>,
    every: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(every.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match fetch_summary(&engine).await {
                        Ok(summary) => {
                            let delivered = hub.set_summary(summary);
                            debug!(delivered = delivered, "chain summary refreshed");
                        }
                        Err(e) => warn!(error = %e, "chain summary refresh failed"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("summary refresher shutting down");
                    break;
                }
            }
        }
    })
}

/// Reloads the geo peer list every `every`, starting immediately. Does nothing when the
/// directory is not configured.
pub fn start_geo_refresher(
    directory: GeoDirectory,
    hub: Arc<BroadcastHub>,
    every: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> Option<JoinHandle<()>> {
    if !directory.is_configured() {
        debug!("geo directory not configured, geoData stays empty");
        return None;
    }

    Some(tokio::spawn(async move {
        let mut ticker = interval(every.max(Duration::from_secs(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match directory.load().await {
                        Ok(peers) => {
                            let count = peers.len();
                            hub.set_geo(peers);
                            debug!(peers = count, "geo peers refreshed");
                        }
                        Err(e) => warn!(error = %e, "geo peer refresh failed"),
                    }
                }
                _ = shutdown_rx.recv() => {
                    info!("geo refresher shutting down");
                    break;
                }
            }
        }
    }))
}
