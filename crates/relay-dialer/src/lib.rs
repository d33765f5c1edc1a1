//! relay-dialer library entry point.
//!
//! # What does the dialer do? (for beginners)
//!
//! The dialer is the side of the bridge that *connects out*.  It keeps exactly
//! one WebSocket connection open to a fixed endpoint (the game server's bridge
//! plugin) and re-establishes it whenever it drops:
//!
//! 1. Dial the configured URI, presenting `Authorization: Bearer <token>` and
//!    `x-self-name: <name>` in the HTTP upgrade request.
//! 2. While connected, install the connection as the *current channel* so the
//!    rest of the process can send through it, and run the shared receive loop
//!    from `relay-core`.
//! 3. When the connection ends for any reason, clear the current channel, wait
//!    a fixed interval, and go back to step 1.
//!
//! Senders never queue: a send while disconnected fails immediately.

/// Application layer: the pure connection state machine.
pub mod application;

/// Infrastructure layer: the current channel and the reconnect loop.
pub mod infrastructure;

pub use application::connection_state::{ConnectionStateMachine, DialerState, InvalidTransition};
pub use infrastructure::network::channel::DialerChannel;
pub use infrastructure::network::client::{
    DialerConfig, DialerError, DialerEvent, ReconnectingClient, MIN_RECONNECT_INTERVAL,
};
