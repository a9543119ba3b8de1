//! Mock daemon for integration tests.
//!
//! [`DaemonMockBuilder`] wraps mockito and answers bitcoind-style JSON-RPC 1.0 calls;
//! [`BlockResponseBuilder`] produces `getblock <hash> 2` shaped bodies.
//!
//! ## Usage
//!
//! ```ignore
//! use tests::mock_infrastructure::{BlockResponseBuilder, DaemonMockBuilder};
//!
//! let mut daemon = DaemonMockBuilder::new().await;
//! daemon.mock_chain(100, 3);
//!
//! // Point an HttpTransport at daemon.url()
//! ```

pub mod rpc_mock;

pub use rpc_mock::{block_hash, BlockResponseBuilder, DaemonMockBuilder};
