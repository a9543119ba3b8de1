//! Upstream daemon access.
//!
//! - [`transport`]: the single request/response call primitive ([`UpstreamTransport`]) and its
//!   JSON-RPC over HTTP implementation
//! - [`gateway`]: the concurrency-limited, priority-aware [`DispatchGateway`] every daemon call
//!   goes through
//! - [`errors`]: the failure taxonomy shared by both
//!
//! ```text
//! ProxyEngine ──► DispatchGateway ──► UpstreamTransport ──► daemon
//!                 (queue, ≤ C slots,    (one HTTP exchange)
//!                  timeout, pacing)
//! ```

pub mod errors;
pub mod gateway;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use errors::{RpcErrorCategory, UpstreamError};
pub use gateway::{DispatchGateway, GatewayConfig, GatewayStats, SubmitOptions};
pub use transport::{HttpTransport, HttpTransportConfig, UpstreamTransport};
