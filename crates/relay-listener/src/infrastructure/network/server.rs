//! WebSocket accept loop and per-connection tasks.
//!
//! This module is responsible for:
//!
//! 1. Binding a TCP listener on the configured address.
//! 2. Upgrading each accepted TCP connection to a WebSocket, capturing the
//!    `Authorization` header from the HTTP upgrade request.
//! 3. Rejecting connections whose header is not exactly `Bearer <token>` with
//!    close code **4001** `"Unauthorized"`; they never join the pool.
//! 4. Registering authorized connections with the [`ConnectionPool`] and
//!    running their receive loop until the connection ends.
//! 5. Stopping the accept loop when the shared `running` flag is cleared.
//!
//! Each connection runs in its own Tokio task, so one slow or misbehaving
//! gateway never delays the others.

use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::StreamExt;
use relay_core::{drive_session, InboundDispatcher, Keepalive, Outbound};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::accept_hdr_async_with_config;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, WebSocketConfig};
use tracing::{debug, error, info, warn};

use super::pool::ConnectionPool;

/// Close code sent to connections that fail the bearer-token check.
pub const UNAUTHORIZED_CLOSE_CODE: u16 = 4001;

/// Default maximum inbound message / frame size: 16 MiB.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1 << 24;

// ── Configuration ─────────────────────────────────────────────────────────────

/// Listener transport settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    /// Interface to bind; `"0.0.0.0"` accepts connections on every interface.
    pub host: String,
    pub port: u16,
    /// Expected bearer token; peers must send `Authorization: Bearer <token>`.
    pub token: String,
    pub max_frame_bytes: usize,
    /// Ping cadence for accepted connections; `None` disables pings.
    pub keepalive: Option<Keepalive>,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 6100,
            token: String::new(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            keepalive: Some(Keepalive::new(
                Duration::from_secs(20),
                Duration::from_secs(20),
            )),
        }
    }
}

impl ListenerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// The exact `Authorization` header value a peer must present.
    pub fn expected_authorization(&self) -> String {
        format!("Bearer {}", self.token)
    }

    fn websocket_config(&self) -> WebSocketConfig {
        let mut ws = WebSocketConfig::default();
        ws.max_message_size = Some(self.max_frame_bytes);
        ws.max_frame_size = Some(self.max_frame_bytes);
        ws
    }
}

/// State shared by every connection task.
struct Shared {
    config: ListenerConfig,
    pool: Arc<ConnectionPool>,
    dispatcher: Arc<InboundDispatcher>,
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds `config.host:config.port` and serves until `running` is cleared.
///
/// # Errors
///
/// Returns an error if the TCP listener cannot be bound.  Failures of
/// individual connections are logged and never end the loop.
pub async fn run_listener(
    config: ListenerConfig,
    pool: Arc<ConnectionPool>,
    dispatcher: Arc<InboundDispatcher>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let address = config.bind_address();
    let listener = TcpListener::bind(&address)
        .await
        .with_context(|| format!("failed to bind WebSocket listener on {address}"))?;
    serve(listener, config, pool, dispatcher, running).await
}

/// Runs the accept loop on an already-bound listener.
pub async fn serve(
    listener: TcpListener,
    config: ListenerConfig,
    pool: Arc<ConnectionPool>,
    dispatcher: Arc<InboundDispatcher>,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let local = listener
        .local_addr()
        .context("listener has no local address")?;
    info!("listening for gateway connections on ws://{local}");

    let shared = Arc::new(Shared {
        config,
        pool,
        dispatcher,
    });

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        // Short accept timeout so the `running` flag is rechecked regularly.
        match timeout(Duration::from_millis(200), listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                debug!("TCP connection from {peer_addr}");
                let shared = Arc::clone(&shared);
                tokio::spawn(async move {
                    handle_connection(stream, peer_addr, shared).await;
                });
            }
            Ok(Err(e)) => error!("accept error: {e}"),
            Err(_) => {}
        }
    }

    Ok(())
}

// ── Per-connection handler ────────────────────────────────────────────────────

async fn handle_connection(stream: TcpStream, peer_addr: SocketAddr, shared: Arc<Shared>) {
    match run_connection(stream, peer_addr, shared).await {
        Ok(()) => debug!("connection task for {peer_addr} finished"),
        Err(e) => warn!("connection {peer_addr} failed: {e:#}"),
    }
}

async fn run_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    shared: Arc<Shared>,
) -> anyhow::Result<()> {
    let mut authorization: Option<String> = None;
    let capture = |request: &Request, response: Response| -> Result<Response, ErrorResponse> {
        authorization = request
            .headers()
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);
        Ok(response)
    };
    let ws = accept_hdr_async_with_config(stream, capture, Some(shared.config.websocket_config()))
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    let (sink, mut reader) = ws.split();
    let outbound = Outbound::new(peer_addr.to_string(), sink);

    if authorization.as_deref() != Some(shared.config.expected_authorization().as_str()) {
        warn!("rejecting unauthorized connection from {peer_addr}");
        outbound
            .close(Some(CloseFrame {
                code: CloseCode::from(UNAUTHORIZED_CLOSE_CODE),
                reason: "Unauthorized".into(),
            }))
            .await
            .with_context(|| format!("failed to close unauthorized connection {peer_addr}"))?;
        // Give the peer a moment to acknowledge the close frame.
        let _ = timeout(Duration::from_secs(1), async {
            while reader.next().await.is_some() {}
        })
        .await;
        return Ok(());
    }

    info!("gateway connected: {peer_addr}");
    let id = shared.pool.accept(outbound.clone()).await;

    let end = drive_session(
        reader,
        &outbound,
        &shared.dispatcher,
        shared.config.keepalive,
    )
    .await;

    shared.pool.remove(id).await;
    info!("gateway {peer_addr} disconnected: {end}");
    Ok(())
}
