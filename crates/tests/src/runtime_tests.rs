//! Integration tests for the runtime against a mocked daemon.
//!
//! These tests verify the runtime's startup and shutdown contracts:
//! - Startup reconciliation fills the recent-blocks window from the daemon
//! - A daemon that cannot report its chain info makes startup fail
//! - Individual missing blocks leave gaps instead of failing startup
//! - A persisted snapshot lets a restart skip refetching unchanged blocks
//! - New subscribers receive the window before any delta
//!
//! Background refreshers are disabled so the daemon only sees tracker traffic.

use crate::mock_infrastructure::{block_hash, DaemonMockBuilder};
use parking_lot::Mutex;
use relay_core::{
    broadcast::{DeliveryError, Outbound, ServerMessage, Subscriber},
    config::AppConfig,
    persistence::SnapshotStore,
    runtime::{RelayRuntime, RuntimeError},
};
use serde_json::json;
use serial_test::serial;
use std::{path::Path, sync::Arc, time::Duration};
use tokio::time::timeout;

/// Creates a configuration pointing at the mock daemon with a three-block window.
fn create_test_runtime_config(url: &str, data_dir: &Path) -> AppConfig {
    let mut config = AppConfig::default();
    config.upstream.url = url.to_string();
    config.upstream.pacing_ms = 0;
    config.lifecycle.window_size = 3;
    config.persistence.path = data_dir.join("lifecycle-snapshot.json");
    config
}

fn build(config: AppConfig, persistence: bool) -> RelayRuntime {
    RelayRuntime::builder()
        .with_config(config)
        .disable_refreshers()
        .with_persistence(persistence)
        .build()
        .expect("Failed to build runtime")
}

#[derive(Default)]
struct CollectingSubscriber {
    received: Mutex<Vec<Arc<ServerMessage>>>,
}

impl Subscriber for CollectingSubscriber {
    fn send(&self, frame: Outbound) -> Result<(), DeliveryError> {
        if let Outbound::Message(message) = frame {
            self.received.lock().push(message);
        }
        Ok(())
    }
}

#[tokio::test]
#[serial]
async fn test_start_reconciles_recent_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let mut daemon = DaemonMockBuilder::new().await;
    daemon.mock_chain(100, 3);

    let mut runtime = build(create_test_runtime_config(&daemon.url(), dir.path()), false);
    timeout(Duration::from_secs(10), runtime.start())
        .await
        .expect("start should not hang")
        .expect("start succeeds");

    let blocks = runtime.tracker().recent_blocks();
    let heights: Vec<u64> = blocks.iter().map(|b| b.height).collect();
    assert_eq!(heights, vec![100, 99, 98]);
    assert_eq!(blocks[0].hash, block_hash(100));
    assert_eq!(blocks[0].pool, "DigiHash");
    assert_eq!(blocks[0].algorithm, "sha256d");
    assert_eq!(blocks[0].miner_address, "DMinerAddress1");
    assert_eq!(runtime.components().chain_state().current_tip(), 100);

    timeout(Duration::from_secs(5), runtime.shutdown()).await.expect("shutdown should complete");
}

#[tokio::test]
#[serial]
async fn test_start_fails_when_chain_info_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let mut daemon = DaemonMockBuilder::new().await;
    daemon.mock_rpc_error("getblockchaininfo", -28, "Loading block index...");

    let mut runtime = build(create_test_runtime_config(&daemon.url(), dir.path()), false);
    let result = timeout(Duration::from_secs(10), runtime.start()).await.expect("start returns");

    assert!(matches!(result, Err(RuntimeError::Tracker(_))));
    runtime.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_missing_blocks_leave_gaps() {
    let dir = tempfile::tempdir().unwrap();
    let mut daemon = DaemonMockBuilder::new().await;
    // Only heights 99 and 100 are answerable; 98 gets no mock.
    daemon.mock_chain(100, 2);

    let mut runtime = build(create_test_runtime_config(&daemon.url(), dir.path()), false);
    timeout(Duration::from_secs(10), runtime.start()).await.unwrap().expect("gaps are tolerated");

    let heights: Vec<u64> = runtime.tracker().recent_blocks().iter().map(|b| b.height).collect();
    assert_eq!(heights, vec![100, 99]);

    runtime.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_restart_reuses_persisted_blocks() {
    let dir = tempfile::tempdir().unwrap();

    {
        let mut daemon = DaemonMockBuilder::new().await;
        daemon.mock_chain(100, 3);

        let mut runtime = build(create_test_runtime_config(&daemon.url(), dir.path()), true);
        runtime.start().await.expect("first start");
        runtime.shutdown().await;
    }

    let store = SnapshotStore::new(dir.path().join("lifecycle-snapshot.json"), Duration::from_secs(60));
    let file = store.read().await.expect("snapshot written on shutdown");
    assert_eq!(file.lifecycle.blocks.len(), 3);

    // Same chain, but block bodies are no longer served.
    let mut daemon = DaemonMockBuilder::new().await;
    daemon
        .mock_blockchain_info(100)
        .mock_method("getbestblockhash", &json!(block_hash(100)))
        .mock_method("getrawmempool", &json!({}))
        .mock_method_times("getblock", &json!(null), 0);
    for height in 98..=100 {
        daemon.mock_block_hash(height, &block_hash(height));
    }

    let mut runtime = build(create_test_runtime_config(&daemon.url(), dir.path()), true);
    runtime.start().await.expect("restart");

    assert_eq!(runtime.tracker().recent_blocks().len(), 3);
    daemon.assert_expectations().await;

    runtime.shutdown().await;
}

#[tokio::test]
#[serial]
async fn test_new_subscriber_gets_window_first() {
    let dir = tempfile::tempdir().unwrap();
    let mut daemon = DaemonMockBuilder::new().await;
    daemon.mock_chain(100, 3);

    let mut runtime = build(create_test_runtime_config(&daemon.url(), dir.path()), false);
    runtime.start().await.expect("start");

    let subscriber = Arc::new(CollectingSubscriber::default());
    runtime.hub().subscribe(subscriber.clone()).expect("subscribe");

    let received = subscriber.received.lock().clone();
    match received.first().map(|m| &**m) {
        Some(ServerMessage::RecentBlocks(blocks)) => assert_eq!(blocks.len(), 3),
        other => panic!("expected recentBlocks first, got {other:?}"),
    }
    assert!(received.iter().any(|m| matches!(m.as_ref(), ServerMessage::RecentTransactions(_))));
    assert_eq!(runtime.hub().subscriber_count(), 1);

    runtime.shutdown().await;
}
