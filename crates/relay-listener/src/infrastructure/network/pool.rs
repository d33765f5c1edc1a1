//! The listener's live connection pool and its send API.
//!
//! Every authenticated connection registers its [`Outbound`] handle here.
//! Senders never pick a connection themselves: [`ConnectionPool::send_any`]
//! rotates through the live set so traffic spreads across every gateway
//! instance that is connected.
//!
//! # Locking
//!
//! The connection set sits behind a `tokio::sync::Mutex` that is held only
//! while choosing a member.  The socket write happens after the lock is
//! released, so a slow peer never blocks selection for everyone else.  A
//! connection may close between selection and write; that surfaces as
//! [`ConnectionError::SendFailed`] and the reader task removes it.

use std::time::Duration;

use relay_core::dispatch::{EchoPolicy, HeartbeatFilter, InboundDispatcher};
use relay_core::protocol::{strip_echo, OutboundMessage, WireShape};
use relay_core::{ConnectionError, Correlator, Outbound, RequestError};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::connection_set::{ConnectionId, ConnectionSet};

/// Authenticated inbound connections plus the correlator for replies.
#[derive(Debug)]
pub struct ConnectionPool {
    connections: Mutex<ConnectionSet<Outbound>>,
    correlator: Correlator,
    echo_enabled: bool,
}

impl ConnectionPool {
    /// Creates an empty pool.  `echo_enabled` decides whether peers may use
    /// request/response correlation on this side.
    pub fn new(echo_enabled: bool) -> Self {
        Self {
            connections: Mutex::new(ConnectionSet::new()),
            correlator: Correlator::new(),
            echo_enabled,
        }
    }

    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    pub fn echo_enabled(&self) -> bool {
        self.echo_enabled
    }

    /// Builds the dispatcher every connection of this pool should use.
    ///
    /// Replies are correlated when echo is enabled and answered with an error
    /// otherwise; OneBot heartbeats are filtered.  Attach the business handler
    /// with [`InboundDispatcher::with_handler`].
    pub fn inbound_dispatcher(&self) -> InboundDispatcher {
        let policy = if self.echo_enabled {
            EchoPolicy::Correlate
        } else {
            EchoPolicy::Reject
        };
        InboundDispatcher::new("listener", self.correlator.clone(), policy)
            .with_heartbeat_filter(HeartbeatFilter::onebot())
    }

    /// Registers an authenticated connection and returns its id.
    pub async fn accept(&self, outbound: Outbound) -> ConnectionId {
        let id = Uuid::new_v4();
        let peer = outbound.peer().to_string();
        let mut connections = self.connections.lock().await;
        connections.add(id, outbound);
        info!("connection {peer} added to pool ({} active)", connections.len());
        id
    }

    /// Drops a connection from the pool.  Returns `false` if it was not a member.
    pub async fn remove(&self, id: ConnectionId) -> bool {
        let mut connections = self.connections.lock().await;
        match connections.remove(id) {
            Some(outbound) => {
                info!(
                    "connection {} removed from pool ({} remaining)",
                    outbound.peer(),
                    connections.len()
                );
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.connections.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.connections.lock().await.is_empty()
    }

    /// Sends `payload` on the next connection in rotation.
    ///
    /// # Errors
    ///
    /// - [`ConnectionError::NoActiveConnections`] when the pool is empty.
    /// - [`ConnectionError::SendFailed`] when the chosen connection rejects the write.
    pub async fn send_any(&self, payload: &Value) -> Result<(), ConnectionError> {
        let (_, outbound) = self
            .connections
            .lock()
            .await
            .next()
            .ok_or(ConnectionError::NoActiveConnections)?;

        outbound.send_json(payload).await.map_err(|e| {
            error!("send to {} failed: {e}", outbound.peer());
            ConnectionError::SendFailed {
                peer: outbound.peer().to_string(),
                reason: e.to_string(),
            }
        })?;

        if payload.get("echo").is_none() {
            debug!("notification sent to {}", outbound.peer());
        }
        Ok(())
    }

    /// Fire-and-forget send.  Any `echo` field is removed first so the message
    /// can never be mistaken for a correlated request.
    pub async fn notify(&self, mut payload: Value) -> bool {
        strip_echo(&mut payload);
        match self.send_any(&payload).await {
            Ok(()) => true,
            Err(e) => {
                warn!("notification not delivered: {e}");
                false
            }
        }
    }

    /// Sends `{"action", "params", "echo"}` and waits up to `timeout` for the reply.
    ///
    /// # Errors
    ///
    /// - [`RequestError::CorrelationDisabled`] when echo is disabled for the
    ///   listener (replies would be rejected, so the request could only time out).
    /// - [`RequestError::Connection`] when the request cannot be sent.
    /// - [`RequestError::Correlation`] when no reply arrives in time.
    pub async fn call_api(
        &self,
        action: &str,
        params: Value,
        timeout: Duration,
    ) -> Result<Value, RequestError> {
        if !self.echo_enabled {
            return Err(RequestError::CorrelationDisabled("listener".to_string()));
        }
        let pending = self.correlator.issue();
        let message = OutboundMessage::new(action, params).with_echo(pending.token());
        debug!("request {action} sent, echo {}", pending.token());

        // An early return here drops `pending`, which clears its slot.
        self.send_any(&message.to_value(WireShape::ONEBOT)).await?;

        pending.wait(timeout).await.map_err(|e| {
            error!("request {action} failed: {e}");
            RequestError::from(e)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::sink;
    use serde_json::json;
    use tokio::sync::mpsc;
    use tokio_tungstenite::tungstenite::{Error as WsError, Message};

    /// An `Outbound` that records every text frame into a channel.
    fn recording(peer: &str) -> (Outbound, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = sink::unfold(tx, |tx, msg: Message| async move {
            if let Message::Text(text) = msg {
                tx.send(text).map_err(|_| WsError::ConnectionClosed)?;
            }
            Ok::<_, WsError>(tx)
        });
        (Outbound::new(peer, sink), rx)
    }

    /// An `Outbound` whose every write fails.
    fn broken(peer: &str) -> Outbound {
        let sink = sink::unfold((), |(), _msg: Message| async move {
            Err::<(), _>(WsError::ConnectionClosed)
        });
        Outbound::new(peer, sink)
    }

    #[tokio::test]
    async fn test_send_any_on_empty_pool_fails() {
        let pool = ConnectionPool::new(true);
        let err = pool.send_any(&json!({})).await.unwrap_err();
        assert_eq!(err, ConnectionError::NoActiveConnections);
    }

    #[tokio::test]
    async fn test_send_any_rotates_over_members() {
        // Arrange
        let pool = ConnectionPool::new(true);
        let (a, mut rx_a) = recording("a");
        let (b, mut rx_b) = recording("b");
        pool.accept(a).await;
        pool.accept(b).await;

        // Act
        for n in 0..4 {
            pool.send_any(&json!({ "n": n })).await.unwrap();
        }

        // Assert
        assert_eq!(rx_a.recv().await.unwrap(), r#"{"n":0}"#);
        assert_eq!(rx_b.recv().await.unwrap(), r#"{"n":1}"#);
        assert_eq!(rx_a.recv().await.unwrap(), r#"{"n":2}"#);
        assert_eq!(rx_b.recv().await.unwrap(), r#"{"n":3}"#);
    }

    #[tokio::test]
    async fn test_send_failure_is_reported_with_peer() {
        let pool = ConnectionPool::new(true);
        pool.accept(broken("dead-peer")).await;

        let err = pool.send_any(&json!({})).await.unwrap_err();

        assert!(matches!(err, ConnectionError::SendFailed { ref peer, .. } if peer == "dead-peer"));
    }

    #[tokio::test]
    async fn test_notify_strips_echo_and_reports_success() {
        let pool = ConnectionPool::new(true);
        let (a, mut rx) = recording("a");
        pool.accept(a).await;

        let ok = pool
            .notify(json!({"action": "send_group_msg", "params": {}, "echo": "x"}))
            .await;

        assert!(ok);
        let sent: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        assert!(sent.get("echo").is_none());
    }

    #[tokio::test]
    async fn test_notify_returns_false_without_connections() {
        let pool = ConnectionPool::new(true);
        assert!(!pool.notify(json!({"action": "x"})).await);
    }

    #[tokio::test]
    async fn test_remove_drops_member() {
        let pool = ConnectionPool::new(true);
        let (a, _rx) = recording("a");
        let id = pool.accept(a).await;

        assert!(pool.remove(id).await);
        assert!(!pool.remove(id).await);
        assert!(pool.is_empty().await);
    }

    #[tokio::test]
    async fn test_call_api_send_failure_leaves_no_pending_slot() {
        let pool = ConnectionPool::new(true);

        let err = pool
            .call_api("get_status", json!({}), Duration::from_secs(1))
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            RequestError::Connection(ConnectionError::NoActiveConnections)
        ));
        assert_eq!(pool.correlator().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_call_api_resolves_when_reply_is_dispatched() {
        // Arrange
        let pool = std::sync::Arc::new(ConnectionPool::new(true));
        let (a, mut rx) = recording("a");
        pool.accept(a).await;
        let dispatcher = pool.inbound_dispatcher();

        // Act: answer the request as the gateway would.
        let caller = {
            let pool = std::sync::Arc::clone(&pool);
            tokio::spawn(async move {
                pool.call_api("get_login_info", json!({}), Duration::from_secs(5))
                    .await
            })
        };
        let request: Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
        let reply = json!({"status": "ok", "retcode": 0, "echo": request["echo"]});
        dispatcher.dispatch(reply).await;

        // Assert
        assert_eq!(request["action"], "get_login_info");
        let response = caller.await.unwrap().unwrap();
        assert_eq!(response["retcode"], 0);
        assert_eq!(pool.correlator().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_call_api_refused_when_echo_disabled() {
        let pool = ConnectionPool::new(false);
        let (a, _rx) = recording("a");
        pool.accept(a).await;

        let err = pool
            .call_api("x", json!({}), Duration::from_millis(10))
            .await
            .unwrap_err();

        assert!(matches!(err, RequestError::CorrelationDisabled(_)));
    }

    #[test]
    fn test_dispatcher_policy_follows_echo_switch() {
        assert_eq!(
            ConnectionPool::new(true).inbound_dispatcher().echo_policy(),
            EchoPolicy::Correlate
        );
        assert_eq!(
            ConnectionPool::new(false).inbound_dispatcher().echo_policy(),
            EchoPolicy::Reject
        );
    }
}
