//! relay-bridge entry point.
//!
//! # Usage
//!
//! ```text
//! relay-bridge [OPTIONS]
//!
//! Options:
//!   --config <PATH>   TOML configuration file [default: relay.toml]
//!   --debug           Log at debug level (also enabled by `debug = true` in the file)
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable       | Default      | Description              |
//! |----------------|--------------|--------------------------|
//! | `RELAY_CONFIG` | `relay.toml` | Configuration file path  |
//! | `RELAY_DEBUG`  | unset        | Debug-level logging      |
//! | `RUST_LOG`     | unset        | Full `tracing` filter; wins over both switches |

use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use relay_bridge::domain::load_config;
use relay_bridge::infrastructure::Bridge;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Chat-group <-> game-server relay bridge.
#[derive(Debug, Parser)]
#[command(name = "relay-bridge", version)]
struct Cli {
    /// Path of the TOML configuration file.
    #[arg(long, default_value = "relay.toml", env = "RELAY_CONFIG")]
    config: PathBuf,

    /// Log at debug level.
    #[arg(long, env = "RELAY_DEBUG")]
    debug: bool,
}

fn log_filter(debug: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if debug { "debug" } else { "info" }))
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Configuration errors are fatal; they are reported by anyhow on exit.
    let config = load_config(&cli.config)
        .with_context(|| format!("cannot start without configuration ({})", cli.config.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(log_filter(cli.debug || config.debug))
        .init();

    info!(
        "relay bridge starting: listener {}:{}, dialer {}",
        config.listener.host, config.listener.port, config.dialer.uri
    );

    let bridge = Bridge::new(&config)?;

    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C; shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    bridge.run(running).await
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_defaults() {
        // Arrange / Act
        let cli = Cli::parse_from(["relay-bridge"]);

        // Assert
        assert_eq!(cli.config, PathBuf::from("relay.toml"));
        assert!(!cli.debug);
    }

    #[test]
    fn test_cli_config_override() {
        let cli = Cli::parse_from(["relay-bridge", "--config", "/etc/relay/bridge.toml"]);
        assert_eq!(cli.config, PathBuf::from("/etc/relay/bridge.toml"));
    }

    #[test]
    fn test_cli_debug_flag() {
        let cli = Cli::parse_from(["relay-bridge", "--debug"]);
        assert!(cli.debug);
    }
}
