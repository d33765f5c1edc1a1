//! The dialer's current outbound channel.
//!
//! At most one connection is installed at a time.  The reconnect loop installs
//! it after a successful handshake and clears it when the session ends; every
//! sender goes through [`DialerChannel`] and fails fast with
//! [`ConnectionError::ChannelNotActive`] in between.
//!
//! Outbound messages are rendered from named templates (`mc.broadcast`,
//! `mc.rcon`, ...) in the QueQiao `{"api", "data", "echo"}` wire shape.

use std::time::Duration;

use relay_core::dispatch::{EchoPolicy, InboundDispatcher};
use relay_core::protocol::{OutboundMessage, Params, TemplateRegistry};
use relay_core::{ConnectionError, Correlator, Outbound, RequestError};
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

/// Current connection plus the rendering and correlation state for the dialer.
#[derive(Debug)]
pub struct DialerChannel {
    current: RwLock<Option<Outbound>>,
    registry: TemplateRegistry,
    correlator: Correlator,
}

impl DialerChannel {
    /// Creates an inactive channel.  Whether correlation is available follows
    /// the registry's echo switch.
    pub fn new(registry: TemplateRegistry) -> Self {
        Self {
            current: RwLock::new(None),
            registry,
            correlator: Correlator::new(),
        }
    }

    pub fn registry(&self) -> &TemplateRegistry {
        &self.registry
    }

    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    pub fn echo_enabled(&self) -> bool {
        self.registry.echo_enabled()
    }

    /// Builds the dispatcher for this channel's sessions.
    ///
    /// With echo enabled, replies resolve pending requests.  With echo disabled,
    /// an `echo` field means nothing and the message is an ordinary event.
    pub fn inbound_dispatcher(&self) -> InboundDispatcher {
        let policy = if self.echo_enabled() {
            EchoPolicy::Correlate
        } else {
            EchoPolicy::Forward
        };
        InboundDispatcher::new("dialer", self.correlator.clone(), policy)
    }

    pub async fn is_active(&self) -> bool {
        self.current.read().await.is_some()
    }

    /// Makes `outbound` the current channel, replacing any previous one.
    pub(crate) async fn install(&self, outbound: Outbound) {
        *self.current.write().await = Some(outbound);
    }

    /// Clears the current channel.  Returns `true` if one was installed.
    pub(crate) async fn clear(&self) -> bool {
        self.current.write().await.take().is_some()
    }

    /// Sends an already-rendered message on the current channel.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::ChannelNotActive`] while disconnected.
    /// - [`ConnectionError::SendFailed`] when the write fails.
    pub async fn send(&self, message: &OutboundMessage) -> Result<(), ConnectionError> {
        // Clone the handle so the lock is not held across the socket write.
        let outbound = self
            .current
            .read()
            .await
            .clone()
            .ok_or(ConnectionError::ChannelNotActive)?;

        outbound
            .send_text(message.to_text(self.registry.shape()))
            .await
            .map_err(|e| ConnectionError::SendFailed {
                peer: outbound.peer().to_string(),
                reason: e.to_string(),
            })
    }

    /// Renders `kind` without a token and sends it.  Failures are logged and
    /// reported as `false`.
    pub async fn notify(&self, kind: &str, params: &Params) -> bool {
        let message = match self.registry.render(kind, params, None) {
            Ok(message) => message,
            Err(e) => {
                error!("cannot render {kind}: {e}");
                return false;
            }
        };
        match self.send(&message).await {
            Ok(()) => {
                debug!("notification {kind} sent");
                true
            }
            Err(e) => {
                warn!("notification {kind} not delivered: {e}");
                false
            }
        }
    }

    /// Renders `kind` with a fresh token, sends it and waits for the reply.
    ///
    /// # Errors
    ///
    /// - [`RequestError::CorrelationDisabled`] when echo is off for the dialer;
    ///   nothing is sent.
    /// - [`RequestError::Protocol`] when rendering fails.
    /// - [`RequestError::Connection`] when the channel is down or the write fails.
    /// - [`RequestError::Correlation`] when no reply arrives within `timeout`.
    pub async fn call_api(
        &self,
        kind: &str,
        params: &Params,
        timeout: Duration,
    ) -> Result<Value, RequestError> {
        if !self.echo_enabled() {
            return Err(RequestError::CorrelationDisabled("dialer".to_string()));
        }
        let pending = self.correlator.issue();
        let message = self.registry.render(kind, params, Some(pending.token()))?;
        debug!("request {kind} sent, echo {}", pending.token());

        self.send(&message).await?;

        pending.wait(timeout).await.map_err(|e| {
            error!("request {kind} failed: {e}");
            RequestError::from(e)
        })
    }
}
