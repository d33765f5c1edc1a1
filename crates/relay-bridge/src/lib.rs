//! relay-bridge library crate.
//!
//! Bridges one chat group with one game server:
//!
//! ```text
//! chat gateway (OneBot v11)          game-server plugin (QueQiao)
//!        │  dials in                          ▲  dialed out
//!        ▼                                    │
//!   [relay-listener] ◀──── relay-bridge ────▶ [relay-dialer]
//! ```
//!
//! # Layers
//!
//! - `domain/` – the TOML configuration schema.
//! - `application/` – which messages cross the bridge and how they read.
//! - `infrastructure/` – builds the pool, the dialer and the routers and runs them.
//!
//! The binary in `main.rs` only parses the command line, loads the config
//! and sets up logging.

/// Domain layer: configuration.
pub mod domain;

/// Application layer: routing and formatting.
pub mod application;

/// Infrastructure layer: process wiring.
pub mod infrastructure;
