//! # Metrics Architecture
//!
//! Prometheus counters, gauges and histograms are recorded through the `metrics` facade on
//! every call; the recorder is installed once per process and rendered by `/metrics`.
//!
//! A handful of totals are mirrored in atomics so operational tooling can read a
//! [`MetricsSummary`] without scraping the Prometheus text.
//!
//! ## String Interning
//!
//! Daemon method names are interned to avoid per-call allocations for the label values.
//! The set of methods is small and fixed, so the leak is bounded.

use crate::{types::CacheStatus, upstream::UpstreamError};
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::{Deserialize, Serialize};
use std::{
    borrow::Cow,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, OnceLock,
    },
    time::Duration,
};

static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

static METHOD_NAME_POOL: OnceLock<dashmap::DashMap<String, &'static str>> = OnceLock::new();

#[inline]
fn method_to_static(method: &str) -> Cow<'static, str> {
    match method {
        "getblock" => Cow::Borrowed("getblock"),
        "getblockhash" => Cow::Borrowed("getblockhash"),
        "getblockchaininfo" => Cow::Borrowed("getblockchaininfo"),
        "getbestblockhash" => Cow::Borrowed("getbestblockhash"),
        "getrawmempool" => Cow::Borrowed("getrawmempool"),
        "getrawtransaction" => Cow::Borrowed("getrawtransaction"),
        "getmempoolinfo" => Cow::Borrowed("getmempoolinfo"),
        "gettxoutsetinfo" => Cow::Borrowed("gettxoutsetinfo"),
        _ => {
            let pool = METHOD_NAME_POOL.get_or_init(dashmap::DashMap::new);
            if let Some(interned) = pool.get(method) {
                return Cow::Borrowed(*interned);
            }
            let leaked: &'static str = Box::leak(method.to_string().into_boxed_str());
            pool.insert(method.to_string(), leaked);
            Cow::Borrowed(leaked)
        }
    }
}

fn try_init_prometheus_recorder(
) -> Result<PrometheusHandle, metrics_exporter_prometheus::BuildError> {
    PrometheusBuilder::new().install_recorder()
}

fn init_prometheus_recorder() -> PrometheusHandle {
    PROMETHEUS_HANDLE
        .get_or_init(|| match try_init_prometheus_recorder() {
            Ok(handle) => handle,
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "prometheus recorder already installed, using a detached recorder"
                );
                PrometheusBuilder::new().build_recorder().handle()
            }
        })
        .clone()
}

/// Totals mirrored from the Prometheus counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSummary {
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub stale_served: u64,
    pub estimated_served: u64,
    pub upstream_calls: u64,
    pub upstream_errors: u64,
    pub confirmations: u64,
    pub subscribers_removed: u64,
    pub snapshots_saved: u64,
}

#[derive(Default)]
struct Totals {
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    stale_served: AtomicU64,
    estimated_served: AtomicU64,
    upstream_calls: AtomicU64,
    upstream_errors: AtomicU64,
    confirmations: AtomicU64,
    subscribers_removed: AtomicU64,
    snapshots_saved: AtomicU64,
}

pub struct MetricsCollector {
    totals: Totals,
    prometheus_handle: PrometheusHandle,
}

impl MetricsCollector {
    /// # Errors
    ///
    /// Returns an error if the Prometheus recorder cannot be initialized.
    pub fn new() -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let prometheus_handle = init_prometheus_recorder();
        Ok(Self { totals: Totals::default(), prometheus_handle })
    }

    /// Records how a façade call was served.
    pub fn record_cache_outcome(&self, method: &str, status: CacheStatus) {
        let method_cow = method_to_static(method);
        let (name, total) = match status {
            CacheStatus::Hit => ("relay_cache_hits_total", &self.totals.cache_hits),
            CacheStatus::Miss => ("relay_cache_misses_total", &self.totals.cache_misses),
            CacheStatus::Stale => ("relay_cache_stale_served_total", &self.totals.stale_served),
            CacheStatus::Estimated => {
                ("relay_cache_estimated_served_total", &self.totals.estimated_served)
            }
        };
        total.fetch_add(1, Ordering::Relaxed);
        counter!(name, "method" => method_cow).increment(1);
    }

    /// Records one completed upstream call (success or failure) and its latency.
    pub fn record_upstream_call(
        &self,
        method: &str,
        latency: Duration,
        error: Option<&UpstreamError>,
    ) {
        let method_cow = method_to_static(method);
        self.totals.upstream_calls.fetch_add(1, Ordering::Relaxed);

        counter!("relay_upstream_calls_total", "method" => method_cow.clone()).increment(1);
        histogram!("relay_upstream_call_duration_seconds", "method" => method_cow.clone())
            .record(latency.as_secs_f64());

        if let Some(error) = error {
            self.totals.upstream_errors.fetch_add(1, Ordering::Relaxed);
            counter!("relay_upstream_errors_total", "method" => method_cow, "kind" => error.kind())
                .increment(1);
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn record_gateway_depth(&self, pending: usize, in_flight: usize) {
        gauge!("relay_gateway_pending").set(pending as f64);
        gauge!("relay_gateway_in_flight").set(in_flight as f64);
    }

    pub fn record_gateway_timeout(&self, method: &str) {
        counter!("relay_gateway_timeouts_total", "method" => method_to_static(method)).increment(1);
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn record_tracker_sizes(&self, blocks: usize, pending: usize, confirmed: usize) {
        gauge!("relay_tracker_window_blocks").set(blocks as f64);
        gauge!("relay_tracker_pending_transactions").set(pending as f64);
        gauge!("relay_tracker_recent_confirmed").set(confirmed as f64);
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn record_chain_tip(&self, height: u64) {
        gauge!("relay_chain_tip_height").set(height as f64);
    }

    pub fn record_confirmations(&self, count: usize) {
        self.totals.confirmations.fetch_add(count as u64, Ordering::Relaxed);
        counter!("relay_tracker_confirmations_total").increment(count as u64);
    }

    pub fn record_expired(&self, count: usize) {
        counter!("relay_tracker_expired_total").increment(count as u64);
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn record_subscribers(&self, count: usize) {
        gauge!("relay_broadcast_subscribers").set(count as f64);
    }

    pub fn record_subscriber_removed(&self, reason: &'static str) {
        self.totals.subscribers_removed.fetch_add(1, Ordering::Relaxed);
        counter!("relay_broadcast_subscribers_removed_total", "reason" => reason).increment(1);
    }

    pub fn record_snapshot_saved(&self, bytes: usize) {
        self.totals.snapshots_saved.fetch_add(1, Ordering::Relaxed);
        counter!("relay_snapshots_saved_total").increment(1);
        #[allow(clippy::cast_precision_loss)]
        gauge!("relay_snapshot_bytes").set(bytes as f64);
    }

    /// Get current metrics as a string (for Prometheus endpoint)
    #[must_use]
    pub fn get_prometheus_metrics(&self) -> String {
        self.prometheus_handle.render()
    }

    #[must_use]
    pub fn summary(&self) -> MetricsSummary {
        let t = &self.totals;
        MetricsSummary {
            cache_hits: t.cache_hits.load(Ordering::Relaxed),
            cache_misses: t.cache_misses.load(Ordering::Relaxed),
            stale_served: t.stale_served.load(Ordering::Relaxed),
            estimated_served: t.estimated_served.load(Ordering::Relaxed),
            upstream_calls: t.upstream_calls.load(Ordering::Relaxed),
            upstream_errors: t.upstream_errors.load(Ordering::Relaxed),
            confirmations: t.confirmations.load(Ordering::Relaxed),
            subscribers_removed: t.subscribers_removed.load(Ordering::Relaxed),
            snapshots_saved: t.snapshots_saved.load(Ordering::Relaxed),
        }
    }
}

/// # Errors
///
/// Returns an error if the metrics collector cannot be initialized.
pub fn init_metrics() -> Result<Arc<MetricsCollector>, Box<dyn std::error::Error + Send + Sync>> {
    let collector = Arc::new(MetricsCollector::new()?);
    Ok(collector)
}
