//! Network infrastructure for the dialer.
//!
//! - [`channel`] holds the *current* connection, if any, and is what senders
//!   talk to.
//! - [`client`] owns the reconnect loop that fills and clears that channel.

pub mod channel;
pub mod client;
