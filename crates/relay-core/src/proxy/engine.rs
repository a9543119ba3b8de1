use arc_swap::ArcSwapOption;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::{sync::Arc, time::Duration};

use crate::{
    cache::{CachePolicy, CacheStats, CacheStore, CallKey, MethodClass},
    chain::ChainState,
    metrics::MetricsCollector,
    types::{is_method_allowed, CacheStatus},
    upstream::{DispatchGateway, GatewayStats, SubmitOptions},
};

use super::errors::ProxyError;

/// Expensive aggregate that degrades to a synthesized placeholder instead of failing.
pub const ESTIMATED_METHOD: &str = "gettxoutsetinfo";

/// Marker field added to synthesized placeholder values.
pub const ESTIMATED_MARKER: &str = "_estimated";

#[derive(Debug, Clone, Copy, Default)]
pub struct CallOptions {
    /// Skip the fresh-cache read. The result is still written back.
    pub bypass_cache: bool,
    /// Dispatch ahead of non-priority calls.
    pub priority: bool,
}

impl CallOptions {
    #[must_use]
    pub fn fresh() -> Self {
        Self { bypass_cache: true, priority: false }
    }

    #[must_use]
    pub fn priority() -> Self {
        Self { bypass_cache: false, priority: true }
    }
}

/// A façade result together with how it was obtained.
#[derive(Debug, Clone, PartialEq)]
pub struct CallOutcome {
    pub value: Value,
    pub status: CacheStatus,
}

/// Exponential backoff for transient failures.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(100),
            max_backoff: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStats {
    pub cache: CacheStats,
    pub gateway: GatewayStats,
}

/// Cached call façade in front of the dispatch gateway.
///
/// Reads go cache-first. Misses are submitted to the gateway and successful results are
/// written back with the method's TTL. When the gateway fails, the façade degrades in order:
/// expired cache entry, synthesized estimate (for [`ESTIMATED_METHOD`] only), then the
/// original error.
///
/// Concurrent misses for the same key are not coalesced; each submits its own call.
pub struct ProxyEngine {
    gateway: DispatchGateway,
    cache: Arc<CacheStore>,
    policy: CachePolicy,
    chain_state: Arc<ChainState>,
    metrics: Arc<MetricsCollector>,
    last_txoutset: ArcSwapOption<Value>,
}

impl ProxyEngine {
    #[must_use]
    pub fn new(
        gateway: DispatchGateway,
        cache: Arc<CacheStore>,
        policy: CachePolicy,
        chain_state: Arc<ChainState>,
        metrics: Arc<MetricsCollector>,
    ) -> Self {
        Self { gateway, cache, policy, chain_state, metrics, last_txoutset: ArcSwapOption::empty() }
    }

    /// Performs a daemon call through the cache.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Upstream`] when the gateway fails and no degraded value exists.
    pub async fn call(
        &self,
        method: &str,
        params: Vec<Value>,
        options: CallOptions,
    ) -> Result<CallOutcome, ProxyError> {
        let key = CallKey::new(method, &params);

        if !options.bypass_cache {
            if let Some(value) = self.cache.get_fresh(&key) {
                tracing::trace!(method = method, "cache hit");
                self.metrics.record_cache_outcome(method, CacheStatus::Hit);
                return Ok(CallOutcome { value, status: CacheStatus::Hit });
            }
        }

        let submit = SubmitOptions { priority: options.priority, timeout: self.policy.timeout_for(method) };
        match self.gateway.submit(method, params, submit).await {
            Ok(value) => {
                if method == ESTIMATED_METHOD && value.is_object() {
                    self.last_txoutset.store(Some(Arc::new(value.clone())));
                }
                self.cache.insert(key, value.clone(), self.policy.ttl_for(method), MethodClass::of(method));
                self.metrics.record_cache_outcome(method, CacheStatus::Miss);
                Ok(CallOutcome { value, status: CacheStatus::Miss })
            }
            Err(error) => self.degrade(method, &key, error.into()),
        }
    }

    fn degrade(
        &self,
        method: &str,
        key: &CallKey,
        error: ProxyError,
    ) -> Result<CallOutcome, ProxyError> {
        if let Some(value) = self.cache.get_stale(key) {
            tracing::warn!(method = method, error = %error, "daemon call failed, serving stale cache entry");
            self.metrics.record_cache_outcome(method, CacheStatus::Stale);
            return Ok(CallOutcome { value, status: CacheStatus::Stale });
        }

        if method == ESTIMATED_METHOD {
            let value = self.estimate_txoutset();
            let height = value.get("height").and_then(serde_json::Value::as_u64).unwrap_or_default();
            tracing::warn!(
                method = method,
                error = %error,
                height = height,
                "daemon call failed, serving estimated placeholder"
            );
            self.metrics.record_cache_outcome(method, CacheStatus::Estimated);
            return Ok(CallOutcome { value, status: CacheStatus::Estimated });
        }

        Err(error)
    }

    /// Placeholder UTXO-set summary from the current tip and the last observed real answer.
    fn estimate_txoutset(&self) -> Value {
        let tip = self.chain_state.current_tip_with_hash();
        let mut fields: Map<String, Value> = self
            .last_txoutset
            .load_full()
            .and_then(|last| last.as_object().cloned())
            .unwrap_or_default();

        for (field, default) in [
            ("transactions", json!(0)),
            ("txouts", json!(0)),
            ("bogosize", json!(0)),
            ("hash_serialized_2", json!("")),
            ("disk_size", json!(0)),
            ("total_amount", json!(0)),
        ] {
            fields.entry(field).or_insert(default);
        }
        fields.insert("height".into(), json!(tip.height));
        fields.insert("bestblock".into(), json!(tip.hash));
        fields.insert(ESTIMATED_MARKER.into(), Value::Bool(true));
        Value::Object(fields)
    }

    /// [`call`](Self::call) with exponential backoff on transient failures.
    ///
    /// # Errors
    ///
    /// Returns the last error once attempts are exhausted or on the first non-transient error.
    pub async fn call_with_retry(
        &self,
        method: &str,
        params: Vec<Value>,
        options: CallOptions,
        retry: &RetryPolicy,
    ) -> Result<Value, ProxyError> {
        let mut backoff = retry.initial_backoff;
        let mut attempt = 1;

        loop {
            match self.call(method, params.clone(), options).await {
                Ok(outcome) => return Ok(outcome.value),
                Err(e) if e.is_transient() && attempt < retry.max_attempts => {
                    tracing::debug!(
                        method = method,
                        attempt = attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "transient daemon failure, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(retry.max_backoff);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Entry point for externally requested calls: only read-only methods pass.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::MethodNotAllowed`] for methods outside the allow-list, otherwise
    /// whatever [`call`](Self::call) returns.
    pub async fn call_external(
        &self,
        method: &str,
        params: Vec<Value>,
        bypass_cache: bool,
    ) -> Result<CallOutcome, ProxyError> {
        if method.is_empty() {
            return Err(ProxyError::InvalidRequest("method must not be empty".into()));
        }
        if !is_method_allowed(method) {
            return Err(ProxyError::MethodNotAllowed(method.to_string()));
        }
        self.call(method, params, CallOptions { bypass_cache, priority: false }).await
    }

    #[must_use]
    pub fn stats(&self) -> EngineStats {
        EngineStats { cache: self.cache.stats(), gateway: self.gateway.stats() }
    }

    #[must_use]
    pub fn gateway(&self) -> &DispatchGateway {
        &self.gateway
    }

    #[must_use]
    pub fn chain_state(&self) -> &Arc<ChainState> {
        &self.chain_state
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }
}
