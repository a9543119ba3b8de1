//! Integration tests for the HTTP transport and the dispatch gateway over a real socket.
//!
//! These tests cover how daemon answers are classified on the wire:
//! - Successful JSON-RPC 1.0 envelopes
//! - RPC error envelopes delivered with HTTP 500
//! - Non-JSON bodies, with and without a success status
//! - Basic auth credentials
//! - Connect failures and read timeouts
//!
//! Timeouts use a bare TCP listener that accepts connections and never answers, since mockito
//! cannot delay a response.

use crate::mock_infrastructure::DaemonMockBuilder;
use relay_core::{
    metrics::MetricsCollector,
    upstream::{
        DispatchGateway, GatewayConfig, HttpTransport, HttpTransportConfig, SubmitOptions,
        UpstreamError, UpstreamTransport,
    },
};
use serde_json::json;
use serial_test::serial;
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpListener, task::JoinHandle};

/// `Authorization` header for `user:pass`.
const USER_PASS_AUTH: &str = "Basic dXNlcjpwYXNz";

fn transport(url: &str) -> HttpTransport {
    HttpTransport::new(HttpTransportConfig {
        url: url.to_string(),
        request_timeout: Duration::from_secs(5),
        ..HttpTransportConfig::default()
    })
    .expect("transport builds")
}

/// A listener that accepts and holds connections without ever responding.
async fn silent_daemon() -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let url = format!("http://{}", listener.local_addr().expect("local addr"));
    let handle = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    (url, handle)
}

#[tokio::test]
#[serial]
async fn test_successful_call_returns_result() {
    let mut daemon = DaemonMockBuilder::new().await;
    daemon.mock_method("getblockcount", &json!(19_500_000));

    let result = transport(&daemon.url()).invoke("getblockcount", &[]).await;

    assert_eq!(result.unwrap(), json!(19_500_000));
    assert!(daemon.verify_all_called());
}

#[tokio::test]
#[serial]
async fn test_null_result_is_not_an_error() {
    let mut daemon = DaemonMockBuilder::new().await;
    daemon.mock_method("getrawmempool", &json!(null));

    let result = transport(&daemon.url()).invoke("getrawmempool", &[json!(true)]).await;

    assert_eq!(result.unwrap(), json!(null));
}

#[tokio::test]
#[serial]
async fn test_basic_auth_credentials_are_sent() {
    let mut daemon = DaemonMockBuilder::new().await;
    daemon.require_authorization(USER_PASS_AUTH).mock_method("getblockcount", &json!(7));

    let authed = HttpTransport::new(HttpTransportConfig {
        url: daemon.url(),
        username: "user".into(),
        password: "pass".into(),
        ..HttpTransportConfig::default()
    })
    .unwrap();
    assert_eq!(authed.invoke("getblockcount", &[]).await.unwrap(), json!(7));

    // Without credentials no mock matches and mockito answers 501 with an empty body.
    let anonymous = transport(&daemon.url()).invoke("getblockcount", &[]).await;
    assert!(matches!(anonymous, Err(UpstreamError::Transport(msg)) if msg.contains("501")));
}

#[tokio::test]
#[serial]
async fn test_rpc_error_envelope_keeps_code() {
    let mut daemon = DaemonMockBuilder::new().await;
    daemon.mock_rpc_error("getrawtransaction", -5, "No such mempool or blockchain transaction");

    let result = transport(&daemon.url()).invoke("getrawtransaction", &[json!("ab"), json!(true)]).await;

    match result {
        Err(UpstreamError::Rpc { code, message }) => {
            assert_eq!(code, -5);
            assert!(message.contains("No such mempool"));
        }
        other => panic!("expected RPC error, got {other:?}"),
    }
}

#[tokio::test]
#[serial]
async fn test_http_error_with_text_body_is_transport_error() {
    let mut daemon = DaemonMockBuilder::new().await;
    daemon.mock_server_error("getblockchaininfo");

    let result = transport(&daemon.url()).invoke("getblockchaininfo", &[]).await;

    match result {
        Err(UpstreamError::Transport(msg)) => {
            assert!(msg.contains("500"));
            assert!(msg.contains("Internal Server Error"));
        }
        other => panic!("expected transport error, got {other:?}"),
    }
}

#[tokio::test]
#[serial]
async fn test_non_json_success_is_invalid_response() {
    let mut daemon = DaemonMockBuilder::new().await;
    daemon.mock_garbage("getmempoolinfo");

    let result = transport(&daemon.url()).invoke("getmempoolinfo", &[]).await;

    assert!(matches!(result, Err(UpstreamError::InvalidResponse(_))));
}

#[tokio::test]
async fn test_connection_refused_is_transport_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    drop(listener);

    let result = transport(&url).invoke("getblockcount", &[]).await;

    assert!(matches!(result, Err(UpstreamError::Transport(_))));
}

#[tokio::test]
async fn test_unresponsive_daemon_times_out() {
    let (url, server) = silent_daemon().await;
    let transport = HttpTransport::new(HttpTransportConfig {
        url,
        request_timeout: Duration::from_millis(200),
        ..HttpTransportConfig::default()
    })
    .unwrap();

    let result = transport.invoke("getblockcount", &[]).await;

    assert_eq!(result, Err(UpstreamError::Timeout));
    server.abort();
}

#[tokio::test]
async fn test_gateway_timeout_releases_slot() {
    let (url, server) = silent_daemon().await;
    let metrics = Arc::new(MetricsCollector::new().expect("metrics"));
    let gateway = DispatchGateway::new(
        Arc::new(transport(&url)),
        GatewayConfig {
            max_in_flight: 1,
            default_timeout: Duration::from_millis(100),
            pacing: Duration::ZERO,
        },
        metrics,
    );

    let first = gateway.submit("getblockcount", vec![], SubmitOptions::default()).await;
    assert_eq!(first, Err(UpstreamError::Timeout));

    // The only slot was freed by the timeout, so the next call is dispatched and times out too
    // instead of waiting forever in the queue.
    let second = tokio::time::timeout(
        Duration::from_secs(2),
        gateway.submit("getblockcount", vec![], SubmitOptions::default()),
    )
    .await
    .expect("second call was dispatched");
    assert_eq!(second, Err(UpstreamError::Timeout));

    let stats = gateway.stats();
    assert_eq!(stats.timeouts_total, 2);
    assert_eq!(stats.in_flight, 0);

    gateway.close();
    server.abort();
}

#[tokio::test]
#[serial]
async fn test_gateway_over_http_preserves_results() {
    let mut daemon = DaemonMockBuilder::new().await;
    daemon.mock_method("getdifficulty", &json!(1234.5));
    daemon.mock_rpc_error("getblockhash", -8, "Block height out of range");

    let metrics = Arc::new(MetricsCollector::new().expect("metrics"));
    let gateway =
        DispatchGateway::new(Arc::new(transport(&daemon.url())), GatewayConfig::default(), metrics);

    let ok = gateway.submit("getdifficulty", vec![], SubmitOptions::default());
    let err = gateway.submit("getblockhash", vec![json!(99_999_999)], SubmitOptions::priority());
    let (ok, err) = tokio::join!(ok, err);

    assert_eq!(ok.unwrap(), json!(1234.5));
    assert!(matches!(err, Err(UpstreamError::Rpc { code: -8, .. })));
    assert_eq!(gateway.stats().dispatched_total, 2);
    gateway.close();
}
