//! Reconnecting WebSocket client.
//!
//! [`ReconnectingClient::run`] loops for the life of the process:
//!
//! ```text
//! loop while running:
//!     Connecting   – one handshake attempt with auth headers
//!     Connected    – install channel, drive the session until it ends
//!     Disconnected – clear channel, log the cause
//!     wait reconnect_interval (always, even after a long healthy session)
//! ```
//!
//! Lifecycle observations are published as [`DialerEvent`]s on a broadcast
//! channel so callers (and tests) can follow the loop without parsing logs.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, PoisonError,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::stream::SplitStream;
use futures_util::StreamExt;
use relay_core::{drive_session, InboundDispatcher, Keepalive, Outbound};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio::time;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::http::header::AUTHORIZATION;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{connect_async_with_config, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use super::channel::DialerChannel;
use crate::application::connection_state::{ConnectionStateMachine, DialerState};

/// Header carrying the bridge's display name to the game server.
pub const SELF_NAME_HEADER: &str = "x-self-name";

/// Default maximum inbound message / frame size: 16 MiB.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 1 << 24;

const EVENT_CAPACITY: usize = 64;

/// Floor for the reconnect wait, so a zero interval cannot spin.
pub const MIN_RECONNECT_INTERVAL: Duration = Duration::from_millis(100);

type WsReader = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Errors detected before the loop starts.
#[derive(Debug, Error)]
pub enum DialerError {
    #[error("invalid dialer URI {uri:?}: {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("invalid value for header {header}: {reason}")]
    InvalidHeader { header: &'static str, reason: String },
}

/// Dialer transport settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialerConfig {
    /// Endpoint to dial, e.g. `ws://127.0.0.1:6101`.
    pub uri: String,
    /// Sent as `Authorization: Bearer <token>`.
    pub token: String,
    /// Sent as `x-self-name`; the game server shows it as the bridge's name.
    pub self_name: String,
    /// Fixed wait between the end of one attempt and the start of the next.
    /// Values below [`MIN_RECONNECT_INTERVAL`] are raised to it.
    pub reconnect_interval: Duration,
    pub keepalive: Option<Keepalive>,
    pub max_frame_bytes: usize,
}

impl Default for DialerConfig {
    fn default() -> Self {
        Self {
            uri: "ws://127.0.0.1:6101".to_string(),
            token: String::new(),
            self_name: "relay-bridge".to_string(),
            reconnect_interval: Duration::from_secs(5),
            keepalive: Some(Keepalive::new(
                Duration::from_secs(20),
                Duration::from_secs(20),
            )),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }
}

impl DialerConfig {
    /// Builds the HTTP upgrade request with both credential headers.
    ///
    /// # Errors
    ///
    /// Fails when the URI does not parse or a header value contains control
    /// characters.
    pub fn handshake_request(&self) -> Result<Request, DialerError> {
        let mut request =
            self.uri
                .as_str()
                .into_client_request()
                .map_err(|e| DialerError::InvalidUri {
                    uri: self.uri.clone(),
                    reason: e.to_string(),
                })?;

        let authorization = HeaderValue::from_str(&format!("Bearer {}", self.token)).map_err(
            |e| DialerError::InvalidHeader {
                header: "Authorization",
                reason: e.to_string(),
            },
        )?;
        // Display names may be non-ASCII; send the raw UTF-8 bytes.
        let self_name = HeaderValue::from_bytes(self.self_name.as_bytes()).map_err(|e| {
            DialerError::InvalidHeader {
                header: SELF_NAME_HEADER,
                reason: e.to_string(),
            }
        })?;

        let headers = request.headers_mut();
        headers.insert(AUTHORIZATION, authorization);
        headers.insert(SELF_NAME_HEADER, self_name);
        Ok(request)
    }

    /// The wait actually used between attempts.
    pub fn reconnect_delay(&self) -> Duration {
        self.reconnect_interval.max(MIN_RECONNECT_INTERVAL)
    }

    fn websocket_config(&self) -> WebSocketConfig {
        let mut ws = WebSocketConfig::default();
        ws.max_message_size = Some(self.max_frame_bytes);
        ws.max_frame_size = Some(self.max_frame_bytes);
        ws
    }
}

/// Observable steps of the reconnect loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DialerEvent {
    /// A handshake attempt is starting; attempts restart at 1 after a success.
    Connecting { attempt: u32 },
    Connected,
    /// The attempt failed or the session ended.
    Disconnected { cause: String },
    /// The loop is about to wait `delay` before the next attempt.
    ReconnectScheduled { delay: Duration },
}

/// Keeps one outbound connection alive and feeds it into a [`DialerChannel`].
pub struct ReconnectingClient {
    config: DialerConfig,
    channel: Arc<DialerChannel>,
    dispatcher: Arc<InboundDispatcher>,
    state: Mutex<ConnectionStateMachine>,
    events: broadcast::Sender<DialerEvent>,
}

impl ReconnectingClient {
    /// Validates the handshake settings and creates an idle client.
    ///
    /// # Errors
    ///
    /// Returns [`DialerError`] if the URI or a header value is unusable; such a
    /// configuration could never connect.
    pub fn new(
        config: DialerConfig,
        channel: Arc<DialerChannel>,
        dispatcher: Arc<InboundDispatcher>,
    ) -> Result<Self, DialerError> {
        config.handshake_request()?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self {
            config,
            channel,
            dispatcher,
            state: Mutex::new(ConnectionStateMachine::new()),
            events,
        })
    }

    pub fn config(&self) -> &DialerConfig {
        &self.config
    }

    pub fn channel(&self) -> &Arc<DialerChannel> {
        &self.channel
    }

    /// Subscribes to lifecycle events.  Events sent before subscribing are not
    /// replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<DialerEvent> {
        self.events.subscribe()
    }

    pub fn state(&self) -> DialerState {
        self.machine().state()
    }

    /// Runs the reconnect loop until `running` is cleared.
    ///
    /// The flag is checked before every attempt and after every wait; an
    /// established session is not interrupted by it.
    pub async fn run(&self, running: Arc<AtomicBool>) {
        info!("dialer started, target {}", self.config.uri);

        while running.load(Ordering::Relaxed) {
            let begun = self.machine().begin_attempt();
            let attempt = match begun {
                Ok(attempt) => attempt,
                Err(e) => {
                    warn!("{e}; resetting dialer state");
                    self.machine().disconnected();
                    continue;
                }
            };
            debug!("connecting to {} (attempt {attempt})", self.config.uri);
            self.publish(DialerEvent::Connecting { attempt });

            let cause = match self.connect().await {
                Ok((outbound, reader)) => self.run_session(outbound, reader).await,
                Err(e) => format!("{e:#}"),
            };

            if self.channel.clear().await {
                debug!("current channel cleared");
            }
            self.machine().disconnected();
            warn!("connection to {} lost: {cause}", self.config.uri);
            self.publish(DialerEvent::Disconnected { cause });

            let delay = self.config.reconnect_delay();
            info!("reconnecting to {} in {delay:?}", self.config.uri);
            self.publish(DialerEvent::ReconnectScheduled { delay });
            time::sleep(delay).await;
        }

        info!("shutdown flag set; dialer stopped");
    }

    /// One handshake attempt.
    async fn connect(&self) -> anyhow::Result<(Outbound, WsReader)> {
        let request = self.config.handshake_request()?;
        let (ws, _response) =
            connect_async_with_config(request, Some(self.config.websocket_config()), false)
                .await
                .with_context(|| format!("failed to connect to {}", self.config.uri))?;
        let (sink, reader) = ws.split();
        Ok((Outbound::new(self.config.uri.clone(), sink), reader))
    }

    /// Installs the connection and drives it; returns why the session ended.
    async fn run_session(&self, outbound: Outbound, reader: WsReader) -> String {
        let transition = self.machine().connected();
        if let Err(e) = transition {
            warn!("{e}");
        }
        self.channel.install(outbound.clone()).await;
        info!("connected to {}", self.config.uri);
        self.publish(DialerEvent::Connected);

        drive_session(reader, &outbound, &self.dispatcher, self.config.keepalive)
            .await
            .to_string()
    }

    fn machine(&self) -> std::sync::MutexGuard<'_, ConnectionStateMachine> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, event: DialerEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }
}
