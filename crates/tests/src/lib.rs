//! Integration tests for the relay.
//!
//! Every test runs against a mockito server that answers the daemon's JSON-RPC 1.0 dialect, so
//! the real [`HttpTransport`](relay_core::upstream::HttpTransport) is exercised end to end.
//!
//! - `http_transport_tests`: wire behavior of the HTTP transport (auth, error bodies, timeouts)
//! - `proxy_engine_tests`: the cached call façade over the gateway and a live HTTP transport
//! - `runtime_tests`: runtime build, startup reconciliation, persistence and shutdown
//! - `mock_infrastructure`: reusable daemon mocks
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --package tests
//! ```

#[cfg(test)]
mod http_transport_tests;

#[cfg(test)]
mod proxy_engine_tests;

#[cfg(test)]
mod runtime_tests;

/// Mock infrastructure for testing
pub mod mock_infrastructure;
