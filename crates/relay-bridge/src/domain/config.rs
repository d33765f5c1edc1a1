//! TOML configuration for the bridge process.
//!
//! # File layout
//!
//! ```toml
//! debug = false
//!
//! [forwarding]
//! target_group_id = 123456789
//! mc_chat = true
//! mc_command = true
//!
//! [listener]            # the chat gateway dials in here
//! host = "0.0.0.0"
//! port = 6100
//! token = "change-me"
//!
//! [dialer]              # the bridge dials out to the game-server plugin
//! uri = "ws://127.0.0.1:6101"
//! token = "change-me"
//! self_name = "Survival"
//!
//! [templates."mc.broadcast"]   # optional: replace a built-in template
//! api = "broadcast"
//! data = { message = [{ text = "<{sender}> {content}" }] }
//! ```
//!
//! # Serde default values
//!
//! Every field carries `#[serde(default = "...")]`, so a file only needs the
//! keys it changes.  A section that is missing entirely takes its `Default`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use relay_core::protocol::{queqiao, ProtocolError, ProtocolTemplate, TemplateRegistry};
use relay_core::{Keepalive, TemplateDefinition};
use relay_dialer::DialerConfig;
use relay_listener::ListenerConfig;
use serde::Deserialize;
use thiserror::Error;

/// Error type for loading the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// A `[templates.*]` entry does not compile.
    #[error("invalid template override: {0}")]
    Template(#[from] ProtocolError),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct BridgeConfig {
    /// Verbose logging (`debug` level).
    #[serde(default)]
    pub debug: bool,
    #[serde(default)]
    pub forwarding: ForwardingConfig,
    #[serde(default)]
    pub listener: ListenerSection,
    #[serde(default)]
    pub dialer: DialerSection,
    /// Template overrides and additions, keyed by kind (e.g. `"mc.broadcast"`).
    #[serde(default)]
    pub templates: BTreeMap<String, TemplateDefinition>,
}

/// What gets forwarded between the chat group and the game server.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ForwardingConfig {
    /// The one chat group bridged to the game.
    #[serde(default)]
    pub target_group_id: i64,
    #[serde(default = "default_true")]
    pub mc_chat: bool,
    #[serde(default = "default_true")]
    pub mc_command: bool,
    #[serde(default = "default_true")]
    pub mc_join: bool,
    #[serde(default = "default_true")]
    pub mc_quit: bool,
    #[serde(default = "default_true")]
    pub mc_death: bool,
    #[serde(default = "default_true")]
    pub mc_achievement: bool,
}

/// `[listener]`: the WebSocket server the chat gateway connects to.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ListenerSection {
    #[serde(default = "default_listener_host")]
    pub host: String,
    #[serde(default = "default_listener_port")]
    pub port: u16,
    #[serde(default)]
    pub token: String,
    /// Allow request/response correlation with the gateway.
    #[serde(default = "default_true")]
    pub enable_echo: bool,
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
    /// `0` disables pings.
    #[serde(default = "default_ping_secs")]
    pub ping_interval_secs: u64,
    #[serde(default = "default_ping_secs")]
    pub ping_timeout_secs: u64,
}

/// `[dialer]`: the game-server plugin endpoint the bridge connects to.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DialerSection {
    #[serde(default = "default_dialer_uri")]
    pub uri: String,
    #[serde(default)]
    pub token: String,
    /// Sent as `x-self-name`; the plugin uses it as this bridge's display name.
    #[serde(default = "default_self_name")]
    pub self_name: String,
    /// `0` retries after the dialer's minimum wait (100 ms) rather than spinning.
    #[serde(default = "default_reconnect_secs")]
    pub reconnect_interval_secs: u64,
    /// `0` disables pings.
    #[serde(default = "default_ping_secs")]
    pub ping_interval_secs: u64,
    #[serde(default = "default_ping_secs")]
    pub ping_timeout_secs: u64,
    /// Off by default: the plugin connection is treated as a pure event stream.
    #[serde(default)]
    pub enable_echo: bool,
    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_true() -> bool {
    true
}
fn default_listener_host() -> String {
    "0.0.0.0".to_string()
}
fn default_listener_port() -> u16 {
    6100
}
fn default_max_frame_bytes() -> usize {
    1 << 24
}
fn default_ping_secs() -> u64 {
    20
}
fn default_dialer_uri() -> String {
    "ws://127.0.0.1:6101".to_string()
}
fn default_self_name() -> String {
    "relay-bridge".to_string()
}
fn default_reconnect_secs() -> u64 {
    5
}

impl Default for ForwardingConfig {
    fn default() -> Self {
        Self {
            target_group_id: 0,
            mc_chat: default_true(),
            mc_command: default_true(),
            mc_join: default_true(),
            mc_quit: default_true(),
            mc_death: default_true(),
            mc_achievement: default_true(),
        }
    }
}

impl Default for ListenerSection {
    fn default() -> Self {
        Self {
            host: default_listener_host(),
            port: default_listener_port(),
            token: String::new(),
            enable_echo: default_true(),
            max_frame_bytes: default_max_frame_bytes(),
            ping_interval_secs: default_ping_secs(),
            ping_timeout_secs: default_ping_secs(),
        }
    }
}

impl Default for DialerSection {
    fn default() -> Self {
        Self {
            uri: default_dialer_uri(),
            token: String::new(),
            self_name: default_self_name(),
            reconnect_interval_secs: default_reconnect_secs(),
            ping_interval_secs: default_ping_secs(),
            ping_timeout_secs: default_ping_secs(),
            enable_echo: false,
            max_frame_bytes: default_max_frame_bytes(),
        }
    }
}

fn keepalive(interval_secs: u64, timeout_secs: u64) -> Option<Keepalive> {
    (interval_secs > 0).then(|| {
        Keepalive::new(
            Duration::from_secs(interval_secs),
            Duration::from_secs(timeout_secs),
        )
    })
}

impl ListenerSection {
    pub fn to_listener_config(&self) -> ListenerConfig {
        ListenerConfig {
            host: self.host.clone(),
            port: self.port,
            token: self.token.clone(),
            max_frame_bytes: self.max_frame_bytes,
            keepalive: keepalive(self.ping_interval_secs, self.ping_timeout_secs),
        }
    }
}

impl DialerSection {
    pub fn to_dialer_config(&self) -> DialerConfig {
        DialerConfig {
            uri: self.uri.clone(),
            token: self.token.clone(),
            self_name: self.self_name.clone(),
            reconnect_interval: Duration::from_secs(self.reconnect_interval_secs),
            keepalive: keepalive(self.ping_interval_secs, self.ping_timeout_secs),
            max_frame_bytes: self.max_frame_bytes,
        }
    }
}

impl BridgeConfig {
    /// The built-in game-server templates with `[templates.*]` applied on top.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Template`] if an override does not compile.
    pub fn game_templates(&self) -> Result<TemplateRegistry, ConfigError> {
        let mut registry = queqiao::registry(self.dialer.enable_echo)?;
        for (kind, definition) in &self.templates {
            registry.insert(ProtocolTemplate::from_definition(kind.as_str(), definition)?);
        }
        Ok(registry)
    }
}

// ── Loading ───────────────────────────────────────────────────────────────────

/// Parses configuration from TOML text.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] if the TOML is malformed or a value has the
/// wrong type.
pub fn parse_config(content: &str) -> Result<BridgeConfig, ConfigError> {
    Ok(toml::from_str(content)?)
}

/// Loads the configuration file at `path`.  A missing file is an error.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] if the file cannot be read and
/// [`ConfigError::Parse`] if its content is invalid.
pub fn load_config(path: &Path) -> Result<BridgeConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_config(&content)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
