//! Infrastructure layer: the WebSocket accept loop and the connection pool.

pub mod network;
