//! Application layer for the dialer.
//!
//! - **`connection_state`** – the `Disconnected → Connecting → Connected` state
//!   machine.  It holds no sockets, so every transition is unit-testable.

pub mod connection_state;
