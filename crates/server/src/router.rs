use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use relay_core::{
    broadcast::BroadcastHub,
    chain::{LifecycleTracker, TrackerError, TrackerEvent},
    config::AppConfig,
    metrics::MetricsCollector,
    proxy::{ProxyEngine, ProxyError},
    runtime::RelayRuntime,
    upstream::UpstreamError,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::{compression::CompressionLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{debug, warn};

use crate::{middleware, ws};

/// Shared handles for every route.
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<ProxyEngine>,
    pub hub: Arc<BroadcastHub>,
    pub tracker: Arc<LifecycleTracker>,
    pub metrics: Arc<MetricsCollector>,
    /// Outbound queue length per WebSocket connection.
    pub channel_capacity: usize,
    pub metrics_enabled: bool,
}

impl AppState {
    #[must_use]
    pub fn from_runtime(runtime: &RelayRuntime) -> Self {
        Self {
            engine: runtime.proxy_engine().clone(),
            hub: runtime.hub().clone(),
            tracker: runtime.tracker().clone(),
            metrics: runtime.metrics_collector().clone(),
            channel_capacity: runtime.config().broadcast.channel_capacity,
            metrics_enabled: runtime.config().metrics.enabled,
        }
    }
}

/// Builds the full application router.
pub fn create_app(state: AppState, config: &AppConfig) -> Router {
    let (set_request_id, propagate_request_id) = middleware::create_request_id_layers();

    let public = Router::new()
        .route("/health", get(handle_health))
        .route("/metrics", get(handle_metrics))
        .route("/ws", get(ws::handle_upgrade))
        .route("/admin/stats", get(handle_admin_stats));

    let api = Router::new()
        .route("/rpc", post(handle_rpc))
        .route("/webhook/block", post(handle_block_webhook))
        .route("/webhook/transaction", post(handle_transaction_webhook))
        .layer(ConcurrencyLimitLayer::new(config.server.max_concurrent_requests))
        .layer(RequestBodyLimitLayer::new(1024 * 1024))
        .layer(CompressionLayer::new());

    public
        .merge(api)
        .with_state(state)
        .layer(TraceLayer::new_for_http().make_span_with(middleware::request_span))
        .layer(propagate_request_id)
        .layer(set_request_id)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcCall {
    pub method: String,
    #[serde(default)]
    pub params: Vec<Value>,
    #[serde(default)]
    pub bypass_cache: bool,
}

fn error_body(code: i32, message: impl Into<String>) -> Json<Value> {
    Json(json!({ "error": { "code": code, "message": message.into() } }))
}

fn proxy_error_response(error: &ProxyError) -> (StatusCode, Json<Value>) {
    match error {
        ProxyError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, error_body(-32600, error.to_string())),
        ProxyError::MethodNotAllowed(_) => (StatusCode::FORBIDDEN, error_body(-32601, error.to_string())),
        ProxyError::Upstream(UpstreamError::Rpc { code, message }) => {
            (StatusCode::BAD_GATEWAY, error_body(*code, message.clone()))
        }
        ProxyError::Upstream(UpstreamError::Timeout) => {
            (StatusCode::GATEWAY_TIMEOUT, error_body(-32603, error.to_string()))
        }
        ProxyError::Upstream(_) => (StatusCode::BAD_GATEWAY, error_body(-32603, error.to_string())),
    }
}

/// `POST /rpc`: `{method, params?, bypassCache?}` through the cached call façade.
pub async fn handle_rpc(State(state): State<AppState>, Json(call): Json<RpcCall>) -> impl IntoResponse {
    debug!(method = %call.method, bypass_cache = call.bypass_cache, "rpc call");

    match state.engine.call_external(&call.method, call.params, call.bypass_cache).await {
        Ok(outcome) => (
            StatusCode::OK,
            [("x-cache-status", outcome.status.to_string())],
            Json(json!({ "result": outcome.value, "cacheStatus": outcome.status })),
        ),
        Err(e) => {
            let (status, body) = proxy_error_response(&e);
            (status, [("x-cache-status", "MISS".to_string())], body)
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct BlockNotification {
    pub hash: String,
}

#[derive(Debug, Deserialize)]
pub struct TransactionNotification {
    /// Raw transaction hex as pushed by the daemon.
    pub hex: String,
}

fn enqueue(state: &AppState, event: TrackerEvent) -> (StatusCode, Json<Value>) {
    match state.tracker.handle().try_send(event) {
        Ok(()) => (StatusCode::ACCEPTED, Json(json!({ "queued": true }))),
        Err(TrackerError::ChannelFull) => {
            warn!("tracker event queue full, notification dropped");
            (StatusCode::SERVICE_UNAVAILABLE, error_body(-32603, "event queue full"))
        }
        Err(e) => (StatusCode::SERVICE_UNAVAILABLE, error_body(-32603, e.to_string())),
    }
}

/// `POST /webhook/block`: the daemon announces a new best block.
pub async fn handle_block_webhook(
    State(state): State<AppState>,
    Json(notification): Json<BlockNotification>,
) -> impl IntoResponse {
    if notification.hash.is_empty() {
        return (StatusCode::BAD_REQUEST, error_body(-32600, "hash must not be empty"));
    }
    enqueue(&state, TrackerEvent::NewBlockHash(notification.hash))
}

/// `POST /webhook/transaction`: the daemon pushes a raw mempool transaction.
pub async fn handle_transaction_webhook(
    State(state): State<AppState>,
    Json(notification): Json<TransactionNotification>,
) -> impl IntoResponse {
    if notification.hex.is_empty() {
        return (StatusCode::BAD_REQUEST, error_body(-32600, "hex must not be empty"));
    }
    enqueue(&state, TrackerEvent::NewTransaction(notification.hex))
}

#[allow(clippy::unused_async)]
pub async fn handle_metrics(State(state): State<AppState>) -> impl IntoResponse {
    if !state.metrics_enabled {
        return (StatusCode::NOT_FOUND, [("content-type", "text/plain")], String::new());
    }
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        state.metrics.get_prometheus_metrics(),
    )
}

#[allow(clippy::unused_async)]
pub async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    let chain = state.engine.chain_state();
    let tip = chain.current_tip_with_hash();
    let healthy = chain.is_known();

    let body = json!({
        "status": if healthy { "healthy" } else { "starting" },
        "tip": { "height": tip.height, "hash": tip.hash, "ageSeconds": chain.tip_age_seconds() },
        "subscribers": state.hub.subscriber_count(),
        "cacheEntries": state.engine.cache().len(),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE }, Json(body))
}

/// `GET /admin/stats`: cache, gateway, tracker and hub counters in one document.
#[allow(clippy::unused_async)]
pub async fn handle_admin_stats(State(state): State<AppState>) -> impl IntoResponse {
    let engine = state.engine.stats();
    Json(json!({
        "cache": engine.cache,
        "gateway": engine.gateway,
        "tracker": state.tracker.stats(),
        "hub": state.hub.stats(),
        "totals": state.metrics.summary(),
    }))
}
