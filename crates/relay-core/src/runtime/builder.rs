//! Builder for initializing the relay runtime.

use crate::{
    broadcast::BroadcastHub,
    cache::CacheStore,
    chain::{ChainState, LifecycleTracker},
    config::AppConfig,
    metrics::MetricsCollector,
    proxy::ProxyEngine,
    upstream::{DispatchGateway, HttpTransport, UpstreamTransport},
};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, info};

use super::{lifecycle::RelayRuntime, RelayComponents};

/// Errors that can occur during runtime initialization and startup.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("Failed to initialize metrics collector: {0}")]
    MetricsInitialization(String),

    #[error("Configuration validation failed: {0}")]
    ConfigValidation(String),

    /// Startup reconciliation could not reach the daemon.
    #[error("Lifecycle tracker failed to start: {0}")]
    Tracker(#[from] crate::chain::TrackerError),

    #[error("Runtime initialization failed: {0}")]
    Initialization(String),
}

#[derive(Clone)]
struct RuntimeOptions {
    enable_refreshers: bool,
    enable_persistence: Option<bool>,
    shutdown_channel_capacity: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self { enable_refreshers: true, enable_persistence: None, shutdown_channel_capacity: 16 }
    }
}

/// Builder for constructing a [`RelayRuntime`].
///
/// # Examples
///
/// ```no_run
/// # use relay_core::{config::AppConfig, runtime::RelayRuntimeBuilder};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = AppConfig::load()?;
///
/// let mut runtime = RelayRuntimeBuilder::new().with_config(config).build()?;
/// runtime.start().await?;
/// # Ok(())
/// # }
/// ```
pub struct RelayRuntimeBuilder {
    config: Option<AppConfig>,
    transport: Option<Arc<dyn UpstreamTransport>>,
    options: RuntimeOptions,
}

impl RelayRuntimeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self { config: None, transport: None, options: RuntimeOptions::default() }
    }

    #[must_use]
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replaces the HTTP transport built from `upstream` config.
    #[must_use]
    pub fn with_transport(mut self, transport: Arc<dyn UpstreamTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Skips the summary and geo refresh tasks.
    #[must_use]
    pub fn disable_refreshers(mut self) -> Self {
        self.options.enable_refreshers = false;
        self
    }

    /// Overrides `persistence.enabled`.
    #[must_use]
    pub fn with_persistence(mut self, enabled: bool) -> Self {
        self.options.enable_persistence = Some(enabled);
        self
    }

    #[must_use]
    pub fn with_shutdown_channel_capacity(mut self, capacity: usize) -> Self {
        self.options.shutdown_channel_capacity = capacity;
        self
    }

    /// Builds every component. No task runs until [`RelayRuntime::start`].
    ///
    /// # Errors
    ///
    /// Returns `RuntimeError` if configuration is missing or invalid, or if the metrics
    /// recorder or HTTP client cannot be created.
    pub fn build(self) -> Result<RelayRuntime, RuntimeError> {
        let config = self.config.ok_or_else(|| {
            RuntimeError::ConfigValidation("No configuration provided".to_string())
        })?;

        config.validate().map_err(RuntimeError::ConfigValidation)?;

        let persistence = self.options.enable_persistence.unwrap_or(config.persistence.enabled);
        info!(
            upstream = %config.upstream.url,
            max_in_flight = config.upstream.max_in_flight,
            network = %config.lifecycle.network,
            persistence_enabled = persistence,
            "Initializing relay runtime"
        );

        let (shutdown_tx, _) = broadcast::channel::<()>(self.options.shutdown_channel_capacity);

        let chain_state = Arc::new(ChainState::new());

        let metrics_collector = Arc::new(
            MetricsCollector::new()
                .map_err(|e| RuntimeError::MetricsInitialization(e.to_string()))?,
        );
        debug!("Metrics collector initialized");

        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(
                HttpTransport::new(config.transport_config())
                    .map_err(|e| RuntimeError::Initialization(format!("HTTP transport: {e}")))?,
            ),
        };
        let gateway =
            DispatchGateway::new(transport, config.gateway_config(), metrics_collector.clone());
        debug!(max_in_flight = gateway.max_in_flight(), "Dispatch gateway initialized");

        let cache = Arc::new(CacheStore::new(config.cache.max_entries));
        let proxy_engine = Arc::new(ProxyEngine::new(
            gateway,
            cache.clone(),
            config.cache_policy(),
            chain_state.clone(),
            metrics_collector.clone(),
        ));
        debug!("Proxy engine initialized");

        let hub = Arc::new(BroadcastHub::new(config.hub_config(), metrics_collector.clone()));
        let tracker = Arc::new(LifecycleTracker::new(
            proxy_engine.clone(),
            hub.clone(),
            metrics_collector.clone(),
            config.tracker_config(),
        ));
        debug!("Lifecycle tracker initialized");

        let components =
            RelayComponents::new(metrics_collector, chain_state, cache, proxy_engine, hub, tracker);

        Ok(RelayRuntime::new(
            components,
            shutdown_tx,
            config,
            persistence,
            self.options.enable_refreshers,
        ))
    }
}

impl Default for RelayRuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}
