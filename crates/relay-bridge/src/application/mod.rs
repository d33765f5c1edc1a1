//! Application layer for relay-bridge.
//!
//! - **`format`** – decides what is forwarded and builds the text for it.
//!   Pure functions, no I/O.
//! - **`router`** – the two [`MessageHandler`](relay_core::MessageHandler)s
//!   that apply `format` and send through the opposite side.

pub mod format;
pub mod router;

pub use router::{ChatOutbound, GameOutbound, McToQqRouter, QqToMcRouter};
