//! Per-message routing for the receive loop.
//!
//! Every text frame a connection receives goes through
//! [`InboundDispatcher::dispatch_text`], which decides what the message is:
//!
//! 1. not a JSON object → logged and dropped ([`Inbound::Malformed`]);
//! 2. carries an `echo` token → handled by the [`EchoPolicy`]: correlated to a
//!    pending request, rejected with an error reply, or treated as an event;
//! 3. matches the heartbeat filter → dropped ([`Inbound::Heartbeat`]);
//! 4. otherwise → handed to the registered [`MessageHandler`].
//!
//! Handler failures (an `Err` or a panic) are contained here so one bad message
//! never tears down the connection that carried it.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::FutureExt;
use serde_json::{json, Value};
use tracing::{debug, error, warn};

use crate::correlation::Correlator;
use crate::protocol::extract_echo;

/// Business logic invoked for every ordinary inbound event.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, message: Value) -> anyhow::Result<()>;
}

/// What to do with an inbound message that carries an `echo` token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoPolicy {
    /// Correlation is enabled: resolve the pending request and consume the message.
    Correlate,
    /// Correlation is disabled and the peer should be told so.
    Reject,
    /// Correlation is disabled; the token is ignored and the message is an event.
    Forward,
}

/// Drops messages whose `field` equals `value` (keep-alive chatter).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeartbeatFilter {
    pub field: String,
    pub value: String,
}

impl HeartbeatFilter {
    pub fn new(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
        }
    }

    /// OneBot v11 heartbeats and lifecycle notices: `post_type == "meta_event"`.
    pub fn onebot() -> Self {
        Self::new("post_type", "meta_event")
    }

    pub fn matches(&self, message: &Value) -> bool {
        message.get(&self.field).and_then(Value::as_str) == Some(self.value.as_str())
    }
}

/// Outcome of dispatching one inbound message.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A reply was matched against the correlator; `fulfilled` is false for stale tokens.
    Correlated { token: String, fulfilled: bool },
    /// Correlation is off; `reply` must be sent back on the same connection.
    Rejected { token: String, reply: Value },
    Heartbeat,
    /// The handler processed the message.
    Handled,
    /// The handler returned an error or panicked.
    HandlerFailed,
    /// No handler is registered.
    Unhandled,
    Malformed,
}

/// Body of the error reply sent when a peer uses `echo` on a channel with
/// correlation disabled.
pub fn echo_rejection() -> Value {
    json!({
        "status": "failed",
        "retcode": 400,
        "message": "echo-response disabled on server"
    })
}

/// Routes inbound messages for one channel (all connections of a pool share one).
pub struct InboundDispatcher {
    label: String,
    correlator: Correlator,
    echo_policy: EchoPolicy,
    heartbeat: Option<HeartbeatFilter>,
    handler: Option<Arc<dyn MessageHandler>>,
}

impl InboundDispatcher {
    /// `label` only appears in log lines (e.g. `"listener"`, `"dialer"`).
    pub fn new(label: impl Into<String>, correlator: Correlator, echo_policy: EchoPolicy) -> Self {
        Self {
            label: label.into(),
            correlator,
            echo_policy,
            heartbeat: None,
            handler: None,
        }
    }

    pub fn with_handler(mut self, handler: Arc<dyn MessageHandler>) -> Self {
        self.handler = Some(handler);
        self
    }

    pub fn with_heartbeat_filter(mut self, filter: HeartbeatFilter) -> Self {
        self.heartbeat = Some(filter);
        self
    }

    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    pub fn echo_policy(&self) -> EchoPolicy {
        self.echo_policy
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Parses and dispatches one text frame.
    pub async fn dispatch_text(&self, text: &str) -> Inbound {
        match serde_json::from_str::<Value>(text) {
            Ok(message) if message.is_object() => self.dispatch(message).await,
            Ok(_) => {
                warn!("[{}] dropping non-object JSON message, length {}", self.label, text.len());
                Inbound::Malformed
            }
            Err(e) => {
                warn!("[{}] dropping malformed JSON, length {}: {e}", self.label, text.len());
                Inbound::Malformed
            }
        }
    }

    /// Dispatches one already-parsed message.
    pub async fn dispatch(&self, message: Value) -> Inbound {
        if let Some(token) = extract_echo(&message) {
            match self.echo_policy {
                EchoPolicy::Correlate => {
                    let fulfilled = self.correlator.resolve(&token, message);
                    return Inbound::Correlated { token, fulfilled };
                }
                EchoPolicy::Reject => {
                    warn!(
                        "[{}] peer sent echo={token} but echo-response is disabled",
                        self.label
                    );
                    return Inbound::Rejected {
                        token,
                        reply: echo_rejection(),
                    };
                }
                EchoPolicy::Forward => {}
            }
        }

        if self.heartbeat.as_ref().is_some_and(|f| f.matches(&message)) {
            return Inbound::Heartbeat;
        }

        let Some(handler) = &self.handler else {
            debug!("[{}] message received but no handler registered, dropped", self.label);
            return Inbound::Unhandled;
        };

        match AssertUnwindSafe(handler.handle(message)).catch_unwind().await {
            Ok(Ok(())) => Inbound::Handled,
            Ok(Err(e)) => {
                error!("[{}] handler failed: {e:#}", self.label);
                Inbound::HandlerFailed
            }
            Err(_) => {
                error!("[{}] handler panicked; message dropped", self.label);
                Inbound::HandlerFailed
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn dispatcher(policy: EchoPolicy, handler: MockMessageHandler) -> InboundDispatcher {
        InboundDispatcher::new("test", Correlator::new(), policy)
            .with_heartbeat_filter(HeartbeatFilter::onebot())
            .with_handler(Arc::new(handler))
    }

    #[tokio::test]
    async fn test_ordinary_event_reaches_handler() {
        // Arrange
        let mut handler = MockMessageHandler::new();
        handler
            .expect_handle()
            .withf(|m| m["post_type"] == "message")
            .times(1)
            .returning(|_| Ok(()));
        let d = dispatcher(EchoPolicy::Correlate, handler);

        // Act
        let outcome = d.dispatch_text(r#"{"post_type":"message"}"#).await;

        // Assert
        assert_eq!(outcome, Inbound::Handled);
    }

    #[tokio::test]
    async fn test_heartbeat_is_filtered() {
        let mut handler = MockMessageHandler::new();
        handler.expect_handle().never();
        let d = dispatcher(EchoPolicy::Correlate, handler);

        let outcome = d
            .dispatch_text(r#"{"post_type":"meta_event","meta_event_type":"heartbeat"}"#)
            .await;

        assert_eq!(outcome, Inbound::Heartbeat);
    }

    #[tokio::test]
    async fn test_malformed_json_is_dropped() {
        let mut handler = MockMessageHandler::new();
        handler.expect_handle().never();
        let d = dispatcher(EchoPolicy::Correlate, handler);

        assert_eq!(d.dispatch_text("{not json").await, Inbound::Malformed);
        assert_eq!(d.dispatch_text("[1,2,3]").await, Inbound::Malformed);
    }

    #[tokio::test]
    async fn test_reply_with_echo_resolves_pending_request() {
        // Arrange
        let mut handler = MockMessageHandler::new();
        handler.expect_handle().never();
        let d = dispatcher(EchoPolicy::Correlate, handler);
        let pending = d.correlator().issue();
        let token = pending.token().to_string();
        let reply = format!(r#"{{"status":"ok","echo":"{token}"}}"#);

        // Act
        let outcome = d.dispatch_text(&reply).await;

        // Assert
        assert_eq!(
            outcome,
            Inbound::Correlated {
                token: token.clone(),
                fulfilled: true
            }
        );
        let value = pending.wait(Duration::from_secs(1)).await.unwrap();
        assert_eq!(value["status"], "ok");
    }

    #[tokio::test]
    async fn test_stale_echo_is_consumed_not_forwarded() {
        let mut handler = MockMessageHandler::new();
        handler.expect_handle().never();
        let d = dispatcher(EchoPolicy::Correlate, handler);

        let outcome = d.dispatch_text(r#"{"echo":"unknown"}"#).await;

        assert_eq!(
            outcome,
            Inbound::Correlated {
                token: "unknown".to_string(),
                fulfilled: false
            }
        );
    }

    #[tokio::test]
    async fn test_reject_policy_produces_error_reply() {
        let mut handler = MockMessageHandler::new();
        handler.expect_handle().never();
        let d = dispatcher(EchoPolicy::Reject, handler);

        let outcome = d.dispatch_text(r#"{"echo":"abc","status":"ok"}"#).await;

        assert_eq!(
            outcome,
            Inbound::Rejected {
                token: "abc".to_string(),
                reply: echo_rejection()
            }
        );
    }

    #[tokio::test]
    async fn test_forward_policy_treats_echo_as_event() {
        let mut handler = MockMessageHandler::new();
        handler.expect_handle().times(1).returning(|_| Ok(()));
        let d = dispatcher(EchoPolicy::Forward, handler);

        let outcome = d.dispatch_text(r#"{"echo":"abc","sub_type":"player_join"}"#).await;

        assert_eq!(outcome, Inbound::Handled);
        assert_eq!(d.correlator().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_handler_error_is_contained() {
        let mut handler = MockMessageHandler::new();
        handler
            .expect_handle()
            .times(2)
            .returning(|_| Err(anyhow::anyhow!("business failure")));
        let d = dispatcher(EchoPolicy::Correlate, handler);

        assert_eq!(d.dispatch_text("{}").await, Inbound::HandlerFailed);
        // The dispatcher is still usable afterwards.
        assert_eq!(d.dispatch_text("{}").await, Inbound::HandlerFailed);
    }

    struct PanickingHandler;

    #[async_trait]
    impl MessageHandler for PanickingHandler {
        async fn handle(&self, _message: Value) -> anyhow::Result<()> {
            panic!("handler bug");
        }
    }

    #[tokio::test]
    async fn test_handler_panic_is_contained() {
        let d = InboundDispatcher::new("test", Correlator::new(), EchoPolicy::Correlate)
            .with_handler(Arc::new(PanickingHandler));

        assert_eq!(d.dispatch_text("{}").await, Inbound::HandlerFailed);
    }

    #[tokio::test]
    async fn test_no_handler_reports_unhandled() {
        let d = InboundDispatcher::new("test", Correlator::new(), EchoPolicy::Correlate);
        assert_eq!(d.dispatch_text(r#"{"a":1}"#).await, Inbound::Unhandled);
    }

    #[test]
    fn test_heartbeat_filter_requires_exact_string_match() {
        let f = HeartbeatFilter::onebot();
        assert!(f.matches(&json!({"post_type": "meta_event"})));
        assert!(!f.matches(&json!({"post_type": "message"})));
        assert!(!f.matches(&json!({"post_type": 1})));
        assert!(!f.matches(&json!({})));
    }
}
