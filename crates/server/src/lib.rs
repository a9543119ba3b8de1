//! HTTP and WebSocket surface of the relay.
//!
//! Route handlers are thin: they translate requests into calls on the cached call façade,
//! events for the lifecycle tracker, or registrations with the broadcast hub.

pub mod middleware;
pub mod router;
pub mod ws;
