//! Domain layer for relay-bridge.
//!
//! Holds the configuration schema.  Everything here is plain data plus
//! conversion into the transport crates' own config types.

pub mod config;

pub use config::{load_config, BridgeConfig, ConfigError, DialerSection, ForwardingConfig, ListenerSection};
