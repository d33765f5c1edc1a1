//! # relay-core
//!
//! Shared library for the relay bridge containing the payload template engine,
//! the request/response correlator, the canonical event normalizer, the inbound
//! dispatcher, and the WebSocket session driver.
//!
//! This crate is used by both the listener (inbound pool) and the dialer
//! (outbound reconnecting client).  It never opens or accepts sockets itself;
//! the transport crates hand it already-established WebSocket streams.
//!
//! # Architecture overview
//!
//! The bridge relays events between two independent real-time peers:
//!
//! ```text
//! inbound frame ─► JSON parse ─► echo present? ──yes─► Correlator (wake the waiter)
//!                                     │
//!                                     no
//!                                     ▼
//!                           MessageHandler (router) ─► send API ─► Template Engine ─► outbound frame
//! ```
//!
//! - **`protocol`** – How outbound messages are shaped.  A [`TemplateRegistry`]
//!   holds typed templates compiled once at startup and renders them into
//!   [`OutboundMessage`]s; a [`WireShape`] names the action/data keys each peer
//!   expects.
//!
//! - **`correlation`** – How replies find their request.  The [`Correlator`]
//!   hands out unique tokens and wakes exactly one waiter per token.
//!
//! - **`event`** – How heterogeneous inbound events become a fixed-shape
//!   [`CanonicalEvent`] through a per-discriminator field-path table.
//!
//! - **`dispatch`** and **`session`** – The per-connection receive-loop
//!   contract shared by both transport crates.

pub mod correlation;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod protocol;
pub mod session;

// Re-export the most-used types at the crate root so callers can write
// `relay_core::Correlator` instead of `relay_core::correlation::Correlator`.
pub use correlation::{CorrelationError, Correlator, PendingResponse};
pub use dispatch::{EchoPolicy, HeartbeatFilter, Inbound, InboundDispatcher, MessageHandler};
pub use error::{ConnectionError, RequestError};
pub use event::{CanonicalEvent, CanonicalField, FieldPath, Normalizer};
pub use protocol::{
    OutboundMessage, Params, ProtocolError, ProtocolTemplate, TemplateDefinition,
    TemplateRegistry, WireShape,
};
pub use session::{drive_session, Keepalive, Outbound, SessionEnd};
