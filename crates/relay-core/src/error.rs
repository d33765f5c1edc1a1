//! Error types shared by the listener and dialer send paths.
//!
//! The bridge distinguishes four failure families:
//!
//! - *transport* failures ([`ConnectionError`]) – no usable connection, or a
//!   write to the chosen connection failed;
//! - *protocol* failures ([`ProtocolError`]) – unknown template kind, missing
//!   template parameter, malformed payload;
//! - *correlation* failures ([`CorrelationError`]) – the reply did not arrive
//!   in time or the pending slot was cancelled;
//! - *business* failures – raised by a message handler and contained by the
//!   dispatcher, so they never show up here.
//!
//! [`RequestError`] is what a correlated request (`call_api`) returns: it wraps
//! whichever of the first three families failed so the caller can match on the
//! recovery path.

use thiserror::Error;

use crate::correlation::CorrelationError;
use crate::protocol::ProtocolError;

/// A send operation could not reach a peer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConnectionError {
    /// The listener pool has no live connection to choose from.
    #[error("no active connections")]
    NoActiveConnections,

    /// The dialer is not currently connected; outbound messages are never queued.
    #[error("channel not active")]
    ChannelNotActive,

    /// The chosen connection rejected the write (usually because it is closing).
    #[error("send to {peer} failed: {reason}")]
    SendFailed { peer: String, reason: String },
}

/// Failure of a correlated request/response round trip.
#[derive(Debug, Error)]
pub enum RequestError {
    /// The outbound message could not be rendered.
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The outbound message could not be sent.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// The reply never arrived (timeout) or the slot was cancelled.
    #[error(transparent)]
    Correlation(#[from] CorrelationError),

    /// Correlated requests are switched off for this channel.
    #[error("request/response correlation is disabled for {0}")]
    CorrelationDisabled(String),
}

impl RequestError {
    /// Returns `true` when the request failed because its deadline elapsed.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            RequestError::Correlation(CorrelationError::Timeout { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_connection_error_messages_are_distinct() {
        assert_eq!(
            ConnectionError::NoActiveConnections.to_string(),
            "no active connections"
        );
        assert_eq!(
            ConnectionError::ChannelNotActive.to_string(),
            "channel not active"
        );
    }

    #[test]
    fn test_send_failed_names_the_peer() {
        let err = ConnectionError::SendFailed {
            peer: "127.0.0.1:5000".to_string(),
            reason: "connection closed".to_string(),
        };
        assert!(err.to_string().contains("127.0.0.1:5000"));
    }

    #[test]
    fn test_request_error_is_timeout_only_for_timeouts() {
        // Arrange
        let timeout: RequestError = CorrelationError::Timeout {
            token: "t".to_string(),
            timeout: Duration::from_millis(10),
        }
        .into();
        let cancelled: RequestError = CorrelationError::Cancelled {
            token: "t".to_string(),
        }
        .into();
        let no_conn: RequestError = ConnectionError::NoActiveConnections.into();

        // Assert
        assert!(timeout.is_timeout());
        assert!(!cancelled.is_timeout());
        assert!(!no_conn.is_timeout());
    }

    #[test]
    fn test_request_error_wraps_protocol_error_transparently() {
        let err: RequestError = ProtocolError::UnknownKind("mc.nope".to_string()).into();
        assert_eq!(err.to_string(), "unknown template kind: mc.nope");
    }
}
