//! WebSocket session driver shared by the listener and the dialer.
//!
//! A session owns the *read* half of a connection.  The write half is wrapped
//! in an [`Outbound`] handle that any task may clone and send through; sends
//! are serialized by a `tokio::sync::Mutex` so two frames never interleave.
//!
//! # Keepalive
//!
//! With a [`Keepalive`] configured, the driver sends a ping every `interval`
//! and declares the peer dead when nothing at all (data, pong, ping) has been
//! received for `interval + timeout`.  The deadline is tracked separately from
//! the ping ticker, so a `timeout` shorter than `interval` is honoured exactly.
//! A zero `interval` disables keepalive.

use std::fmt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, warn};

use crate::dispatch::{Inbound, InboundDispatcher};

type BoxedSink = Pin<Box<dyn Sink<Message, Error = WsError> + Send>>;

/// Cloneable, serialized write handle for one connection.
#[derive(Clone)]
pub struct Outbound {
    peer: Arc<str>,
    sink: Arc<Mutex<BoxedSink>>,
}

impl fmt::Debug for Outbound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Outbound").field("peer", &self.peer).finish()
    }
}

impl Outbound {
    pub fn new<S>(peer: impl Into<String>, sink: S) -> Self
    where
        S: Sink<Message, Error = WsError> + Send + 'static,
    {
        Self {
            peer: Arc::from(peer.into()),
            sink: Arc::new(Mutex::new(Box::pin(sink))),
        }
    }

    /// Remote identity used in log lines and errors.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    pub async fn send_text(&self, text: String) -> Result<(), WsError> {
        self.sink.lock().await.send(Message::Text(text)).await
    }

    pub async fn send_json(&self, value: &Value) -> Result<(), WsError> {
        self.send_text(value.to_string()).await
    }

    pub async fn ping(&self) -> Result<(), WsError> {
        self.sink.lock().await.send(Message::Ping(Vec::new())).await
    }

    /// Sends a close frame; the peer's acknowledgement ends the read loop.
    pub async fn close(&self, frame: Option<CloseFrame<'static>>) -> Result<(), WsError> {
        self.sink.lock().await.send(Message::Close(frame)).await
    }

    /// `true` if both handles write to the same connection.
    pub fn same_connection(&self, other: &Outbound) -> bool {
        Arc::ptr_eq(&self.sink, &other.sink)
    }
}

/// Ping cadence and liveness deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Keepalive {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Keepalive {
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Maximum silence tolerated before the connection is declared dead.
    pub fn deadline(&self) -> Duration {
        self.interval + self.timeout
    }

    /// `false` for a zero ping interval, which the driver treats as "no keepalive".
    pub fn is_enabled(&self) -> bool {
        !self.interval.is_zero()
    }
}

/// Why a session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEnd {
    /// The peer sent a close frame.
    ClosedByPeer { code: Option<u16>, reason: String },
    /// The stream ended without a close frame.
    StreamEnded,
    /// Reading failed (protocol violation, reset, oversize frame…).
    TransportError(String),
    /// Nothing was received within the keepalive deadline.
    KeepaliveTimeout,
    /// A ping or an error reply could not be written.
    SendFailed(String),
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEnd::ClosedByPeer {
                code: Some(code),
                reason,
            } => write!(f, "closed by peer (code {code}, reason {reason:?})"),
            SessionEnd::ClosedByPeer { code: None, .. } => write!(f, "closed by peer"),
            SessionEnd::StreamEnded => write!(f, "stream ended"),
            SessionEnd::TransportError(e) => write!(f, "transport error: {e}"),
            SessionEnd::KeepaliveTimeout => write!(f, "keepalive timeout"),
            SessionEnd::SendFailed(e) => write!(f, "send failed: {e}"),
        }
    }
}

/// Runs the receive loop until the connection ends.
///
/// Messages are dispatched inline, one at a time, so a connection's messages
/// reach the handler in arrival order.
pub async fn drive_session<St>(
    mut stream: St,
    outbound: &Outbound,
    dispatcher: &InboundDispatcher,
    keepalive: Option<Keepalive>,
) -> SessionEnd
where
    St: Stream<Item = Result<Message, WsError>> + Unpin,
{
    let keepalive = keepalive.filter(Keepalive::is_enabled);

    // Without keepalive the timers still exist but their branches are disabled.
    let period = keepalive.map_or(Duration::from_secs(3600), |k| k.interval);
    let deadline = keepalive.map_or(Duration::from_secs(3600), |k| k.deadline());
    let mut ticker = time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let silence = time::sleep(deadline);
    tokio::pin!(silence);

    loop {
        tokio::select! {
            biased;

            frame = stream.next() => {
                let Some(frame) = frame else {
                    return SessionEnd::StreamEnded;
                };
                silence.as_mut().reset(Instant::now() + deadline);
                let text = match frame {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Binary(bytes)) => match String::from_utf8(bytes) {
                        Ok(text) => text,
                        Err(_) => {
                            warn!("[{}] dropping non-UTF-8 binary frame from {}", dispatcher.label(), outbound.peer());
                            continue;
                        }
                    },
                    Ok(Message::Close(frame)) => {
                        return match frame {
                            Some(f) => SessionEnd::ClosedByPeer {
                                code: Some(u16::from(f.code)),
                                reason: f.reason.into_owned(),
                            },
                            None => SessionEnd::ClosedByPeer { code: None, reason: String::new() },
                        };
                    }
                    // Pongs are queued by tungstenite; pings/pongs only refresh liveness.
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Frame(_)) => continue,
                    Err(e) => return SessionEnd::TransportError(e.to_string()),
                };

                if let Inbound::Rejected { reply, .. } = dispatcher.dispatch_text(&text).await {
                    if let Err(e) = outbound.send_json(&reply).await {
                        return SessionEnd::SendFailed(e.to_string());
                    }
                }
            }

            () = &mut silence, if keepalive.is_some() => {
                return SessionEnd::KeepaliveTimeout;
            }

            _ = ticker.tick(), if keepalive.is_some() => {
                debug!("[{}] ping {}", dispatcher.label(), outbound.peer());
                if let Err(e) = outbound.ping().await {
                    return SessionEnd::SendFailed(e.to_string());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::correlation::Correlator;
    use crate::dispatch::{EchoPolicy, MessageHandler};
    use async_trait::async_trait;
    use futures_util::stream;
    use tokio::sync::mpsc;

    /// Forwards every handled message into a channel.
    struct Collect(mpsc::UnboundedSender<Value>);

    #[async_trait]
    impl MessageHandler for Collect {
        async fn handle(&self, message: Value) -> anyhow::Result<()> {
            let _ = self.0.send(message);
            Ok(())
        }
    }

    /// An `Outbound` whose writes land in an unbounded channel.
    fn recording_outbound() -> (Outbound, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel::<Message>();
        let sink = futures_util::sink::unfold(tx, |tx, msg: Message| async move {
            tx.send(msg).map_err(|_| WsError::ConnectionClosed)?;
            Ok::<_, WsError>(tx)
        });
        (Outbound::new("test-peer", sink), rx)
    }

    #[tokio::test]
    async fn test_text_and_binary_frames_reach_handler_in_order() {
        // Arrange
        let (tx, mut rx) = mpsc::unbounded_channel();
        let dispatcher = InboundDispatcher::new("t", Correlator::new(), EchoPolicy::Correlate)
            .with_handler(Arc::new(Collect(tx)));
        let (outbound, _written) = recording_outbound();
        let frames = stream::iter(vec![
            Ok(Message::Text(r#"{"n":1}"#.to_string())),
            Ok(Message::Binary(br#"{"n":2}"#.to_vec())),
            Ok(Message::Ping(Vec::new())),
            Ok(Message::Text(r#"{"n":3}"#.to_string())),
        ]);

        // Act
        let end = drive_session(frames, &outbound, &dispatcher, None).await;

        // Assert
        assert_eq!(end, SessionEnd::StreamEnded);
        for expected in 1..=3 {
            assert_eq!(rx.recv().await.unwrap()["n"], expected);
        }
    }

    #[tokio::test]
    async fn test_close_frame_ends_session_with_code() {
        let dispatcher = InboundDispatcher::new("t", Correlator::new(), EchoPolicy::Correlate);
        let (outbound, _written) = recording_outbound();
        let frames = stream::iter(vec![Ok(Message::Close(Some(CloseFrame {
            code: 4001.into(),
            reason: "Unauthorized".into(),
        })))]);

        let end = drive_session(frames, &outbound, &dispatcher, None).await;

        assert_eq!(
            end,
            SessionEnd::ClosedByPeer {
                code: Some(4001),
                reason: "Unauthorized".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_rejected_echo_gets_error_reply_on_same_connection() {
        // Arrange
        let dispatcher = InboundDispatcher::new("t", Correlator::new(), EchoPolicy::Reject);
        let (outbound, mut written) = recording_outbound();
        let frames = stream::iter(vec![Ok(Message::Text(r#"{"echo":"x"}"#.to_string()))]);

        // Act
        drive_session(frames, &outbound, &dispatcher, None).await;

        // Assert
        let reply = written.recv().await.unwrap();
        let Message::Text(text) = reply else {
            panic!("expected a text reply, got {reply:?}");
        };
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["retcode"], 400);
        assert_eq!(value["message"], "echo-response disabled on server");
    }

    #[tokio::test]
    async fn test_transport_error_ends_session() {
        let dispatcher = InboundDispatcher::new("t", Correlator::new(), EchoPolicy::Correlate);
        let (outbound, _written) = recording_outbound();
        let frames = stream::iter(vec![Err(WsError::ConnectionClosed)]);

        let end = drive_session(frames, &outbound, &dispatcher, None).await;

        assert!(matches!(end, SessionEnd::TransportError(_)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_peer_hits_keepalive_timeout() {
        // Arrange: a stream that never yields.
        let dispatcher = InboundDispatcher::new("t", Correlator::new(), EchoPolicy::Correlate);
        let (outbound, mut written) = recording_outbound();
        let keepalive = Keepalive::new(Duration::from_secs(20), Duration::from_secs(20));
        let start = Instant::now();

        // Act
        let end = drive_session(stream::pending(), &outbound, &dispatcher, Some(keepalive)).await;

        // Assert
        assert_eq!(end, SessionEnd::KeepaliveTimeout);
        assert!(start.elapsed() >= keepalive.deadline());
        assert!(matches!(written.recv().await, Some(Message::Ping(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_short_timeout_is_detected_before_next_ping() {
        // Arrange: the deadline (25 s) falls between two ping ticks (20 s, 40 s).
        let dispatcher = InboundDispatcher::new("t", Correlator::new(), EchoPolicy::Correlate);
        let (outbound, _written) = recording_outbound();
        let keepalive = Keepalive::new(Duration::from_secs(20), Duration::from_secs(5));
        let start = Instant::now();

        // Act
        let end = drive_session(stream::pending(), &outbound, &dispatcher, Some(keepalive)).await;

        // Assert
        assert_eq!(end, SessionEnd::KeepaliveTimeout);
        let elapsed = start.elapsed();
        assert!(elapsed >= keepalive.deadline());
        assert!(elapsed < keepalive.deadline() + Duration::from_secs(1), "declared dead at {elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_incoming_frames_push_the_deadline_back() {
        // Arrange: a frame every 10 s for 60 s, then silence.
        let dispatcher = InboundDispatcher::new("t", Correlator::new(), EchoPolicy::Correlate);
        let (outbound, _written) = recording_outbound();
        let keepalive = Keepalive::new(Duration::from_secs(20), Duration::from_secs(5));
        let chatter = stream::unfold(0u32, |n| async move {
            if n == 6 {
                return None;
            }
            time::sleep(Duration::from_secs(10)).await;
            Some((Ok::<_, WsError>(Message::Pong(Vec::new())), n + 1))
        })
        .chain(stream::pending());
        let start = Instant::now();

        // Act
        let end = drive_session(Box::pin(chatter), &outbound, &dispatcher, Some(keepalive)).await;

        // Assert: dead 25 s after the last frame at 60 s.
        assert_eq!(end, SessionEnd::KeepaliveTimeout);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(85) && elapsed < Duration::from_secs(86), "declared dead at {elapsed:?}");
    }

    #[tokio::test]
    async fn test_zero_interval_disables_keepalive() {
        let dispatcher = InboundDispatcher::new("t", Correlator::new(), EchoPolicy::Correlate);
        let (outbound, _written) = recording_outbound();
        let keepalive = Keepalive::new(Duration::ZERO, Duration::ZERO);
        assert!(!keepalive.is_enabled());

        let frames = stream::iter(vec![Ok(Message::Text(r#"{"n":1}"#.to_string()))]);
        let end = drive_session(frames, &outbound, &dispatcher, Some(keepalive)).await;

        assert_eq!(end, SessionEnd::StreamEnded);
    }

    #[test]
    fn test_session_end_display() {
        let end = SessionEnd::ClosedByPeer {
            code: Some(1000),
            reason: "bye".to_string(),
        };
        assert_eq!(end.to_string(), "closed by peer (code 1000, reason \"bye\")");
        assert_eq!(SessionEnd::KeepaliveTimeout.to_string(), "keepalive timeout");
    }
}
