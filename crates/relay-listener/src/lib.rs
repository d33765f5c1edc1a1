//! relay-listener library entry point.
//!
//! The listener side of the bridge accepts WebSocket connections that the chat
//! gateway dials in, authenticates them with a bearer token, and exposes the
//! live set as a [`ConnectionPool`] that business logic can send through.
//!
//! - `application` – pure, I/O-free logic (the round-robin connection set).
//! - `infrastructure` – the accept loop and the pool API built on top of it.

pub mod application;
pub mod infrastructure;

pub use application::connection_set::{ConnectionId, ConnectionSet};
pub use infrastructure::network::pool::ConnectionPool;
pub use infrastructure::network::server::{run_listener, serve, ListenerConfig};
