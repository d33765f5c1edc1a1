//! Infrastructure layer for relay-bridge: wiring the transports to the routers.

pub mod runtime;

pub use runtime::Bridge;
