//! Integration tests for the cached call façade.
//!
//! The engine is wired exactly as the runtime wires it (gateway, cache, chain state) but talks to
//! a mockito daemon through the real HTTP transport. Covered:
//! - Miss then hit, and cache bypass
//! - Parameters as part of the cache key
//! - Stale fallback when the daemon fails after the entry expired
//! - Estimated placeholder for the UTXO-set summary
//! - The read-only method guard for external callers

use crate::mock_infrastructure::{block_hash, DaemonMockBuilder};
use relay_core::{
    cache::{CachePolicy, CacheStore},
    chain::ChainState,
    metrics::MetricsCollector,
    proxy::{CallOptions, ProxyEngine, ProxyError, ESTIMATED_MARKER},
    types::CacheStatus,
    upstream::{DispatchGateway, GatewayConfig, HttpTransport, HttpTransportConfig, UpstreamError},
};
use serde_json::json;
use serial_test::serial;
use std::{sync::Arc, time::Duration};

/// Creates a `ProxyEngine` connected to a mock daemon.
fn create_test_proxy_engine(url: &str, policy: CachePolicy) -> ProxyEngine {
    let transport = HttpTransport::new(HttpTransportConfig {
        url: url.to_string(),
        request_timeout: Duration::from_secs(5),
        ..HttpTransportConfig::default()
    })
    .expect("Failed to create transport");

    let metrics = Arc::new(MetricsCollector::new().expect("Failed to create metrics collector"));
    let gateway = DispatchGateway::new(
        Arc::new(transport),
        GatewayConfig { pacing: Duration::ZERO, ..GatewayConfig::default() },
        metrics.clone(),
    );

    ProxyEngine::new(
        gateway,
        Arc::new(CacheStore::new(1_000)),
        policy,
        Arc::new(ChainState::new()),
        metrics,
    )
}

fn short_lived_policy() -> CachePolicy {
    CachePolicy { volatile_ttl: Duration::from_millis(50), ..CachePolicy::default() }
}

#[tokio::test]
#[serial]
async fn test_second_call_is_served_from_cache() {
    let mut daemon = DaemonMockBuilder::new().await;
    daemon.mock_method_times("getblockcount", &json!(19_000_000), 1);

    let engine = create_test_proxy_engine(&daemon.url(), CachePolicy::default());

    let first = engine.call("getblockcount", vec![], CallOptions::default()).await.unwrap();
    let second = engine.call("getblockcount", vec![], CallOptions::default()).await.unwrap();

    assert_eq!(first.status, CacheStatus::Miss);
    assert_eq!(second.status, CacheStatus::Hit);
    assert_eq!(second.value, json!(19_000_000));
    daemon.assert_expectations().await;

    let stats = engine.stats();
    assert_eq!(stats.cache.entries, 1);
    assert_eq!(stats.gateway.dispatched_total, 1);
}

#[tokio::test]
#[serial]
async fn test_bypass_cache_always_reaches_daemon() {
    let mut daemon = DaemonMockBuilder::new().await;
    daemon.mock_method_times("getmempoolinfo", &json!({ "size": 3, "bytes": 900 }), 2);

    let engine = create_test_proxy_engine(&daemon.url(), CachePolicy::default());

    for _ in 0..2 {
        let outcome = engine.call_external("getmempoolinfo", vec![], true).await.unwrap();
        assert_eq!(outcome.status, CacheStatus::Miss);
    }
    daemon.assert_expectations().await;

    // The bypassing calls still refreshed the cache.
    let cached = engine.call("getmempoolinfo", vec![], CallOptions::default()).await.unwrap();
    assert_eq!(cached.status, CacheStatus::Hit);
}

#[tokio::test]
#[serial]
async fn test_params_are_part_of_the_cache_key() {
    let mut daemon = DaemonMockBuilder::new().await;
    daemon.mock_block_hash(1, &block_hash(1)).mock_block_hash(2, &block_hash(2));

    let engine = create_test_proxy_engine(&daemon.url(), CachePolicy::default());

    let one = engine.call("getblockhash", vec![json!(1)], CallOptions::default()).await.unwrap();
    let two = engine.call("getblockhash", vec![json!(2)], CallOptions::default()).await.unwrap();
    let again = engine.call("getblockhash", vec![json!(1)], CallOptions::default()).await.unwrap();

    assert_eq!(one.value, json!(block_hash(1)));
    assert_eq!(two.value, json!(block_hash(2)));
    assert_eq!(two.status, CacheStatus::Miss);
    assert_eq!(again.status, CacheStatus::Hit);
    assert!(daemon.verify_all_called());
}

#[tokio::test]
#[serial]
async fn test_expired_entry_served_when_daemon_disappears() {
    let mut daemon = DaemonMockBuilder::new().await;
    daemon.mock_method("getblockcount", &json!(42));

    let engine = create_test_proxy_engine(&daemon.url(), short_lived_policy());
    let fresh = engine.call("getblockcount", vec![], CallOptions::default()).await.unwrap();
    assert_eq!(fresh.status, CacheStatus::Miss);

    tokio::time::sleep(Duration::from_millis(100)).await;
    // Dropping the guard removes every mock; the daemon URL now answers with errors.
    drop(daemon);

    let degraded = engine.call("getblockcount", vec![], CallOptions::default()).await.unwrap();
    assert_eq!(degraded.status, CacheStatus::Stale);
    assert_eq!(degraded.value, json!(42));
    assert_eq!(engine.stats().cache.stale_served, 1);
}

#[tokio::test]
#[serial]
async fn test_error_surfaces_without_cached_value() {
    let mut daemon = DaemonMockBuilder::new().await;
    daemon.mock_rpc_error("getblockhash", -8, "Block height out of range");

    let engine = create_test_proxy_engine(&daemon.url(), CachePolicy::default());
    let result = engine.call("getblockhash", vec![json!(99_999_999)], CallOptions::default()).await;

    match result {
        Err(ProxyError::Upstream(UpstreamError::Rpc { code, .. })) => assert_eq!(code, -8),
        other => panic!("expected daemon error, got {other:?}"),
    }
    assert_eq!(engine.cache().len(), 0);
}

#[tokio::test]
#[serial]
async fn test_txoutset_failure_yields_estimate_at_tip() {
    let mut daemon = DaemonMockBuilder::new().await;
    daemon.mock_server_error("gettxoutsetinfo");

    let engine = create_test_proxy_engine(&daemon.url(), CachePolicy::default());
    engine.chain_state().force_update_tip(500, &block_hash(500));

    let outcome = engine.call("gettxoutsetinfo", vec![], CallOptions::default()).await.unwrap();

    assert_eq!(outcome.status, CacheStatus::Estimated);
    assert_eq!(outcome.value["height"], json!(500));
    assert_eq!(outcome.value["bestblock"], json!(block_hash(500)));
    assert_eq!(outcome.value[ESTIMATED_MARKER], json!(true));
    // Estimates are never cached.
    assert_eq!(engine.cache().len(), 0);
}

#[tokio::test]
#[serial]
async fn test_external_calls_are_limited_to_read_only_methods() {
    let mut daemon = DaemonMockBuilder::new().await;
    daemon.mock_method_times("sendrawtransaction", &json!("txid"), 0);

    let engine = create_test_proxy_engine(&daemon.url(), CachePolicy::default());

    let write = engine.call_external("sendrawtransaction", vec![json!("00")], false).await;
    assert!(matches!(write, Err(ProxyError::MethodNotAllowed(m)) if m == "sendrawtransaction"));

    let empty = engine.call_external("", vec![], false).await;
    assert!(matches!(empty, Err(ProxyError::InvalidRequest(_))));

    daemon.assert_expectations().await;
    assert_eq!(engine.stats().gateway.dispatched_total, 0);
}
