//! Core component container for the relay runtime.

use crate::{
    broadcast::BroadcastHub, cache::CacheStore, chain::ChainState, chain::LifecycleTracker,
    metrics::MetricsCollector, proxy::ProxyEngine,
};
use std::sync::Arc;

/// Container for all initialized relay components.
///
/// Everything is behind `Arc` and shared with route handlers and background tasks.
#[derive(Clone)]
pub struct RelayComponents {
    metrics_collector: Arc<MetricsCollector>,
    chain_state: Arc<ChainState>,
    cache: Arc<CacheStore>,
    proxy_engine: Arc<ProxyEngine>,
    hub: Arc<BroadcastHub>,
    tracker: Arc<LifecycleTracker>,
}

impl RelayComponents {
    #[must_use]
    pub fn new(
        metrics_collector: Arc<MetricsCollector>,
        chain_state: Arc<ChainState>,
        cache: Arc<CacheStore>,
        proxy_engine: Arc<ProxyEngine>,
        hub: Arc<BroadcastHub>,
        tracker: Arc<LifecycleTracker>,
    ) -> Self {
        Self { metrics_collector, chain_state, cache, proxy_engine, hub, tracker }
    }

    #[must_use]
    pub fn metrics_collector(&self) -> &Arc<MetricsCollector> {
        &self.metrics_collector
    }

    #[must_use]
    pub fn chain_state(&self) -> &Arc<ChainState> {
        &self.chain_state
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<CacheStore> {
        &self.cache
    }

    #[must_use]
    pub fn proxy_engine(&self) -> &Arc<ProxyEngine> {
        &self.proxy_engine
    }

    #[must_use]
    pub fn hub(&self) -> &Arc<BroadcastHub> {
        &self.hub
    }

    #[must_use]
    pub fn tracker(&self) -> &Arc<LifecycleTracker> {
        &self.tracker
    }
}
