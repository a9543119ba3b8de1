//! HTTP middleware for the relay server.

pub mod request_id;

pub use request_id::{create_request_id_layers, request_span, UuidRequestIdGenerator, X_REQUEST_ID};
