//! Application configuration with layered loading.
//!
//! # Configuration Hierarchy
//!
//! Configuration is loaded in this order (later overrides earlier):
//!
//! 1. **Compiled defaults**: `Default` implementations of every section
//! 2. **Config file**: TOML file named by the `RELAY_CONFIG` env var (default
//!    `config/config.toml`, optional)
//! 3. **Environment variables**: `RELAY__SECTION__FIELD` overrides a single field
//!
//! # Configuration Sections
//!
//! - [`ServerConfig`]: HTTP bind address and request concurrency
//! - [`UpstreamConfig`]: daemon endpoint, credentials and gateway limits
//! - [`CacheConfig`]: cache capacity, TTL classes and per-method overrides
//! - [`LifecycleConfigSection`]: recent-blocks window, mempool retention and polling
//! - [`BroadcastConfig`]: subscriber liveness and refresh periods
//! - [`PersistenceConfig`]: snapshot file location and cadence
//! - [`PeersConfig`]: `peers.dat` and geolocation sources
//! - [`LoggingConfig`], [`MetricsConfig`]
//!
//! # Example
//!
//! ```toml
//! [upstream]
//! url = "http://127.0.0.1:14022"
//! username = "rpcuser"
//! password = "rpcpassword"
//! max_in_flight = 4
//!
//! [lifecycle]
//! network = "mainnet"
//! window_size = 240
//! ```

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{
    broadcast::{HubConfig, SNAPSHOT_MESSAGES},
    cache::CachePolicy,
    chain::{LifecycleConfig, Network, TrackerConfig},
    peers::GeoDirectory,
    persistence::SnapshotStore,
    proxy::RetryPolicy,
    upstream::{GatewayConfig, HttpTransportConfig},
};

/// HTTP server configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// IP address to bind the server to. Defaults to `127.0.0.1`.
    pub bind_address: String,

    /// Port number to listen on. Must be greater than 0. Defaults to `5001`.
    pub bind_port: u16,

    /// Maximum number of concurrent HTTP requests. Defaults to `100`.
    pub max_concurrent_requests: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_address: "127.0.0.1".to_string(), bind_port: 5001, max_concurrent_requests: 100 }
    }
}

/// Daemon endpoint and dispatch gateway limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Daemon RPC URL. Must start with `http`.
    pub url: String,

    /// RPC user for HTTP basic auth. Empty disables auth.
    pub username: String,

    pub password: String,

    /// Concurrency ceiling C of the dispatch gateway. Defaults to `4`.
    pub max_in_flight: usize,

    /// Per-call timeout in milliseconds. Defaults to `30000`.
    pub default_timeout_ms: u64,

    /// Delay between dispatches in milliseconds. Defaults to `25`.
    pub pacing_ms: u64,

    /// TCP connect timeout in milliseconds. Defaults to `5000`.
    pub connect_timeout_ms: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            url: "http://127.0.0.1:14022".to_string(),
            username: String::new(),
            password: String::new(),
            max_in_flight: 4,
            default_timeout_ms: 30_000,
            pacing_ms: 25,
            connect_timeout_ms: 5_000,
        }
    }
}

/// Cache capacity and TTL classes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of cached call results. Defaults to `10000`.
    pub max_entries: usize,

    /// TTL of mempool and chain-head answers. Defaults to `10`.
    pub volatile_ttl_seconds: u64,

    /// TTL of methods without a class. Defaults to `60`.
    pub default_ttl_seconds: u64,

    /// TTL of content-addressed answers (blocks, transactions). Defaults to `3600`.
    pub immutable_ttl_seconds: u64,

    /// TTL of expensive aggregates. Defaults to `3600`.
    pub expensive_ttl_seconds: u64,

    /// Per-call timeout of expensive aggregates in milliseconds. Defaults to `300000`.
    pub expensive_timeout_ms: u64,

    /// Per-method TTL overrides in seconds.
    pub method_ttls: BTreeMap<String, u64>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            volatile_ttl_seconds: 10,
            default_ttl_seconds: 60,
            immutable_ttl_seconds: 3600,
            expensive_ttl_seconds: 3600,
            expensive_timeout_ms: 300_000,
            method_ttls: BTreeMap::new(),
        }
    }
}

/// Recent-blocks window, transaction retention and event sources.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifecycleConfigSection {
    /// `mainnet` or `testnet`. Affects pool-tag extraction.
    pub network: String,

    /// Size N of the recent-blocks window. Defaults to `240`.
    pub window_size: usize,

    /// Size of the recent-confirmed list. Defaults to `10`.
    pub confirmed_cap: usize,

    /// Pending transactions older than this are dropped. Defaults to `180`.
    pub pending_retention_seconds: u64,

    /// Head and mempool polling period. Defaults to `10`.
    pub poll_interval_seconds: u64,

    /// Retention sweep period. Defaults to `30`.
    pub sweep_interval_seconds: u64,

    /// Heights resolved concurrently during reconciliation. Defaults to `40`.
    pub reconcile_batch_size: usize,

    /// New mempool transactions looked up per poll. Defaults to `50`.
    pub max_new_transactions_per_poll: usize,

    /// Fetch blocks skipped between two announced heads. Defaults to `false`.
    pub backfill_gaps: bool,

    /// The daemon pushes block and transaction events; periodic polling is disabled.
    pub push_notifications: bool,
}

impl Default for LifecycleConfigSection {
    fn default() -> Self {
        Self {
            network: "mainnet".to_string(),
            window_size: 240,
            confirmed_cap: 10,
            pending_retention_seconds: 180,
            poll_interval_seconds: 10,
            sweep_interval_seconds: 30,
            reconcile_batch_size: 40,
            max_new_transactions_per_poll: 50,
            backfill_gaps: false,
            push_notifications: false,
        }
    }
}

/// Subscriber liveness and periodic refresh fanout.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BroadcastConfig {
    pub ping_interval_seconds: u64,
    pub pong_grace_seconds: u64,
    /// Per-connection outbound queue length.
    pub channel_capacity: usize,
    pub summary_refresh_seconds: u64,
    pub geo_refresh_seconds: u64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            ping_interval_seconds: 30,
            pong_grace_seconds: 90,
            channel_capacity: 256,
            summary_refresh_seconds: 60,
            geo_refresh_seconds: 600,
        }
    }
}

/// Lifecycle snapshot file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    pub enabled: bool,
    pub path: PathBuf,
    pub interval_seconds: u64,
    /// Snapshots older than this are discarded at startup.
    pub max_age_hours: u64,
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("data/lifecycle-snapshot.json"),
            interval_seconds: 60,
            max_age_hours: 24,
        }
    }
}

/// Peer list sources. Without both paths `geoData` stays empty.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PeersConfig {
    pub peers_dat_path: Option<PathBuf>,
    /// JSON object mapping IP strings to `{country, city, lat, lon}`.
    pub geo_path: Option<PathBuf>,
}

/// Prometheus metrics collection and export configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Whether `/metrics` is served. Defaults to `true`.
    pub enabled: bool,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Application logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (e.g., "trace", "debug", "info", "warn", "error"). Defaults to `"info"`.
    pub level: String,

    /// Output format: `"json"` or `"pretty"`. Defaults to `"pretty"`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), format: "pretty".to_string() }
    }
}

/// Root application configuration containing all subsystem settings.
///
/// Environment overrides use the `RELAY` prefix with `__` as separator, e.g.
/// `RELAY__UPSTREAM__MAX_IN_FLIGHT=8`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub upstream: UpstreamConfig,
    pub cache: CacheConfig,
    pub lifecycle: LifecycleConfigSection,
    pub broadcast: BroadcastConfig,
    pub persistence: PersistenceConfig,
    pub peers: PeersConfig,
    pub metrics: MetricsConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    /// Loads configuration from a TOML file with environment variable overrides.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be parsed or deserialized.
    pub fn from_file<P: AsRef<Path>>(config_path: P) -> Result<Self, ConfigError> {
        Config::builder()
            .add_source(File::with_name(&config_path.as_ref().to_string_lossy()).required(false))
            .add_source(Environment::with_prefix("RELAY").separator("__"))
            .build()?
            .try_deserialize()
    }

    /// Loads configuration from `RELAY_CONFIG` or `config/config.toml`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the configuration cannot be loaded or parsed.
    pub fn load() -> Result<Self, ConfigError> {
        let config_path =
            std::env::var("RELAY_CONFIG").unwrap_or_else(|_| "config/config.toml".to_string());
        Self::from_file(&config_path)
    }

    /// Returns the parsed socket address for the HTTP server.
    ///
    /// # Errors
    ///
    /// Returns an error string if the address cannot be parsed.
    pub fn socket_addr(&self) -> Result<std::net::SocketAddr, String> {
        format!("{}:{}", self.server.bind_address, self.server.bind_port)
            .parse()
            .map_err(|_| {
                format!(
                    "Invalid socket address: {}:{}",
                    self.server.bind_address, self.server.bind_port
                )
            })
    }

    /// Validates the configuration for correctness and consistency.
    ///
    /// # Errors
    ///
    /// Returns a descriptive error string if validation fails.
    pub fn validate(&self) -> Result<(), String> {
        if self.upstream.url.is_empty() {
            return Err("Upstream URL must not be empty".to_string());
        }
        if !self.upstream.url.starts_with("http") {
            return Err(format!("Invalid upstream URL: {}", self.upstream.url));
        }
        if self.upstream.max_in_flight == 0 {
            return Err("Upstream max_in_flight must be greater than 0".to_string());
        }
        if self.upstream.default_timeout_ms == 0 {
            return Err("Upstream default timeout must be greater than 0".to_string());
        }

        if self.cache.max_entries == 0 {
            return Err("Cache max_entries must be greater than 0".to_string());
        }
        if self.cache.expensive_timeout_ms == 0 {
            return Err("Cache expensive timeout must be greater than 0".to_string());
        }

        self.network()?;
        if self.lifecycle.window_size == 0 {
            return Err("Lifecycle window_size must be greater than 0".to_string());
        }
        if self.lifecycle.confirmed_cap == 0 {
            return Err("Lifecycle confirmed_cap must be greater than 0".to_string());
        }
        if self.lifecycle.reconcile_batch_size == 0 {
            return Err("Lifecycle reconcile_batch_size must be greater than 0".to_string());
        }
        if self.lifecycle.poll_interval_seconds == 0 || self.lifecycle.sweep_interval_seconds == 0 {
            return Err("Lifecycle intervals must be greater than 0".to_string());
        }

        if self.broadcast.ping_interval_seconds == 0 ||
            self.broadcast.summary_refresh_seconds == 0 ||
            self.broadcast.geo_refresh_seconds == 0
        {
            return Err("Broadcast intervals must be greater than 0".to_string());
        }
        if self.broadcast.pong_grace_seconds < self.broadcast.ping_interval_seconds {
            return Err("Broadcast pong_grace_seconds must be at least ping_interval_seconds".to_string());
        }
        if self.broadcast.channel_capacity < SNAPSHOT_MESSAGES {
            return Err(format!(
                "Broadcast channel_capacity must be at least {SNAPSHOT_MESSAGES} to hold the subscribe snapshot"
            ));
        }

        if self.persistence.enabled && self.persistence.interval_seconds == 0 {
            return Err("Persistence interval must be greater than 0".to_string());
        }

        if self.server.max_concurrent_requests == 0 {
            return Err("Max concurrent requests must be greater than 0".to_string());
        }
        if self.server.bind_port == 0 {
            return Err("Bind port must be greater than 0".to_string());
        }

        if !["json", "pretty"].contains(&self.logging.format.as_str()) {
            return Err("Logging format must be 'json' or 'pretty'".to_string());
        }

        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error string for an unknown network name.
    pub fn network(&self) -> Result<Network, String> {
        self.lifecycle
            .network
            .parse()
            .map_err(|_| format!("Unknown network: {}", self.lifecycle.network))
    }

    #[must_use]
    pub fn transport_config(&self) -> HttpTransportConfig {
        let longest = self.upstream.default_timeout_ms.max(self.cache.expensive_timeout_ms);
        HttpTransportConfig {
            url: self.upstream.url.clone(),
            username: self.upstream.username.clone(),
            password: self.upstream.password.clone(),
            request_timeout: Duration::from_millis(longest) + Duration::from_secs(5),
            connect_timeout: Duration::from_millis(self.upstream.connect_timeout_ms),
        }
    }

    #[must_use]
    pub fn gateway_config(&self) -> GatewayConfig {
        GatewayConfig {
            max_in_flight: self.upstream.max_in_flight,
            default_timeout: Duration::from_millis(self.upstream.default_timeout_ms),
            pacing: Duration::from_millis(self.upstream.pacing_ms),
        }
    }

    #[must_use]
    pub fn cache_policy(&self) -> CachePolicy {
        CachePolicy {
            volatile_ttl: Duration::from_secs(self.cache.volatile_ttl_seconds),
            default_ttl: Duration::from_secs(self.cache.default_ttl_seconds),
            immutable_ttl: Duration::from_secs(self.cache.immutable_ttl_seconds),
            expensive_ttl: Duration::from_secs(self.cache.expensive_ttl_seconds),
            expensive_timeout: Duration::from_millis(self.cache.expensive_timeout_ms),
            overrides: self
                .cache
                .method_ttls
                .iter()
                .map(|(method, secs)| (method.clone(), Duration::from_secs(*secs)))
                .collect(),
        }
    }

    #[must_use]
    pub fn lifecycle_config(&self) -> LifecycleConfig {
        LifecycleConfig {
            window_size: self.lifecycle.window_size,
            confirmed_cap: self.lifecycle.confirmed_cap,
            pending_retention: Duration::from_secs(self.lifecycle.pending_retention_seconds),
            ..LifecycleConfig::default()
        }
    }

    /// Tracker settings. An unknown network falls back to mainnet; [`validate`](Self::validate)
    /// rejects it beforehand.
    #[must_use]
    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig {
            network: self.network().unwrap_or_default(),
            lifecycle: self.lifecycle_config(),
            poll_interval: Duration::from_secs(self.lifecycle.poll_interval_seconds),
            sweep_interval: Duration::from_secs(self.lifecycle.sweep_interval_seconds),
            reconcile_batch_size: self.lifecycle.reconcile_batch_size,
            max_new_transactions_per_poll: self.lifecycle.max_new_transactions_per_poll,
            backfill_gaps: self.lifecycle.backfill_gaps,
            polling: !self.lifecycle.push_notifications,
            event_capacity: 1024,
            retry: RetryPolicy::default(),
        }
    }

    #[must_use]
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            ping_interval: Duration::from_secs(self.broadcast.ping_interval_seconds),
            pong_grace: Duration::from_secs(self.broadcast.pong_grace_seconds),
            window_size: self.lifecycle.window_size,
            confirmed_cap: self.lifecycle.confirmed_cap,
        }
    }

    #[must_use]
    pub fn snapshot_store(&self) -> SnapshotStore {
        SnapshotStore::new(
            self.persistence.path.clone(),
            Duration::from_secs(self.persistence.max_age_hours * 3600),
        )
    }

    #[must_use]
    pub fn geo_directory(&self) -> GeoDirectory {
        GeoDirectory::new(self.peers.peers_dat_path.clone(), self.peers.geo_path.clone())
    }
}
