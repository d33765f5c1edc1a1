//! Network infrastructure for the listener.
//!
//! - [`pool`] – the live connection set plus the send / notify / call API.
//! - [`server`] – TCP accept loop, handshake authentication, per-connection tasks.

pub mod pool;
pub mod server;
