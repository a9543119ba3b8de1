//! Relay runtime initialization and lifecycle management.
//!
//! Wires the dispatch gateway, cache, lifecycle tracker, broadcast hub and persistence
//! sidecar together and owns their background tasks.
//!
//! ```text
//!   build()    validate config, construct components (nothing runs yet)
//!   start()    restore snapshot -> reconcile -> spawn tracker, probe, sidecar, refreshers
//!   shutdown() broadcast () -> await every task (final snapshot) -> close gateway
//! ```
//!
//! # Examples
//!
//! ```no_run
//! use relay_core::{config::AppConfig, runtime::RelayRuntime};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load()?;
//!
//!     let mut runtime = RelayRuntime::builder().with_config(config).build()?;
//!     runtime.start().await?;
//!
//!     let hub = runtime.hub().clone();
//!     // ... hand the hub and proxy engine to HTTP routes ...
//!
//!     runtime.wait_for_shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod builder;
pub mod components;
pub mod lifecycle;

pub use builder::{RelayRuntimeBuilder, RuntimeError};
pub use components::RelayComponents;
pub use lifecycle::RelayRuntime;
