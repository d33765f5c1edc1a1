//! Request/response correlation over a fire-and-forget channel.
//!
//! Neither peer offers a native request/response primitive.  A request is made
//! correlated by attaching a random token as the message's `echo` field; the
//! peer copies it into its reply, and the receive loop hands that reply to
//! [`Correlator::resolve`], which wakes exactly one waiter.
//!
//! # Lifecycle of a pending slot
//!
//! ```text
//! issue() ──► pending ──► resolve()  ──► fulfilled   (waiter gets Ok(reply))
//!                 │
//!                 ├─────► deadline   ──► timed out   (waiter gets Err(Timeout))
//!                 │
//!                 └─────► cancel()   ──► cancelled   (waiter gets Err(Cancelled))
//! ```
//!
//! Exactly one of the three outcomes happens per token.  The slot is removed on
//! every exit path, including when the [`PendingResponse`] is dropped without
//! being awaited (for example because the caller's future was cancelled).
//!
//! # Locking
//!
//! The map sits behind a `std::sync::Mutex` that is never held across an
//! `.await`, which also lets [`Drop`] clean up synchronously.  A poisoned lock
//! is recovered rather than propagated: the map holds no invariant a panicking
//! holder could have broken half-way.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};
use uuid::Uuid;

/// Failure of a correlated wait.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CorrelationError {
    /// No reply arrived before the deadline.
    #[error("request {token} timed out after {timeout:?}")]
    Timeout { token: String, timeout: Duration },

    /// The slot was removed via [`Correlator::cancel`] before a reply arrived.
    #[error("request {token} was cancelled before a response arrived")]
    Cancelled { token: String },
}

type PendingMap = HashMap<String, oneshot::Sender<Value>>;

/// Token → pending response slot.  Cheap to clone; clones share the same map.
#[derive(Debug, Clone, Default)]
pub struct Correlator {
    pending: Arc<Mutex<PendingMap>>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fresh slot under a new UUID v4 token.
    pub fn issue(&self) -> PendingResponse {
        let (tx, rx) = oneshot::channel();
        let mut pending = self.lock();
        let mut token = Uuid::new_v4().to_string();
        while pending.contains_key(&token) {
            token = Uuid::new_v4().to_string();
        }
        pending.insert(token.clone(), tx);
        drop(pending);

        PendingResponse {
            token,
            rx,
            correlator: self.clone(),
        }
    }

    /// Hands `payload` to the waiter registered under `token`.
    ///
    /// Returns `false` (and logs) for unknown, already-resolved or expired
    /// tokens; a stale reply is not an error.
    pub fn resolve(&self, token: &str, payload: Value) -> bool {
        // The send happens under the lock so a concurrent timeout sees either
        // a live slot or an already-delivered value, never a gap between them.
        let mut pending = self.lock();
        let Some(tx) = pending.remove(token) else {
            drop(pending);
            warn!(token, "stale or unknown response, discarding");
            return false;
        };
        let delivered = tx.send(payload).is_ok();
        drop(pending);

        if delivered {
            debug!(token, "response correlated");
        } else {
            warn!(token, "response arrived after its waiter went away");
        }
        delivered
    }

    /// Removes a pending slot; its waiter observes [`CorrelationError::Cancelled`].
    pub fn cancel(&self, token: &str) -> bool {
        let removed = self.lock().remove(token).is_some();
        if removed {
            debug!(token, "pending request cancelled");
        }
        removed
    }

    pub fn is_pending(&self, token: &str) -> bool {
        self.lock().contains_key(token)
    }

    /// Number of requests still waiting for a reply.
    pub fn pending_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, PendingMap> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Handle returned by [`Correlator::issue`]; await it with [`wait`](Self::wait).
#[derive(Debug)]
pub struct PendingResponse {
    token: String,
    rx: oneshot::Receiver<Value>,
    correlator: Correlator,
}

impl PendingResponse {
    /// The token to place in the outgoing message's `echo` field.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Waits for the reply, for at most `timeout`.
    ///
    /// The slot is gone when this returns, whatever the outcome.
    pub async fn wait(mut self, timeout: Duration) -> Result<Value, CorrelationError> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(reply)) => Ok(reply),
            Ok(Err(_closed)) => Err(CorrelationError::Cancelled {
                token: self.token.clone(),
            }),
            Err(_elapsed) => {
                let still_pending = self.correlator.lock().remove(&self.token).is_some();
                if still_pending {
                    return Err(CorrelationError::Timeout {
                        token: self.token.clone(),
                        timeout,
                    });
                }
                // Resolved or cancelled right at the deadline.
                match self.rx.try_recv() {
                    Ok(reply) => Ok(reply),
                    Err(_) => Err(CorrelationError::Cancelled {
                        token: self.token.clone(),
                    }),
                }
            }
        }
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        self.correlator.lock().remove(&self.token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn test_issue_registers_unique_tokens() {
        let correlator = Correlator::new();
        let handles: Vec<_> = (0..100).map(|_| correlator.issue()).collect();
        let tokens: HashSet<&str> = handles.iter().map(|h| h.token()).collect();
        assert_eq!(tokens.len(), 100);
        assert_eq!(correlator.pending_count(), 100);
    }

    #[tokio::test]
    async fn test_resolve_wakes_the_waiter() {
        // Arrange
        let correlator = Correlator::new();
        let pending = correlator.issue();
        let token = pending.token().to_string();

        // Act
        assert!(correlator.resolve(&token, json!({"status": "ok"})));
        let reply = pending.wait(Duration::from_secs(1)).await;

        // Assert
        assert_eq!(reply, Ok(json!({"status": "ok"})));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[test]
    fn test_only_the_first_resolve_is_honoured() {
        let correlator = Correlator::new();
        let pending = correlator.issue();
        let token = pending.token().to_string();

        assert!(correlator.resolve(&token, json!(1)));
        assert!(!correlator.resolve(&token, json!(2)));
    }

    #[test]
    fn test_resolve_unknown_token_returns_false() {
        let correlator = Correlator::new();
        assert!(!correlator.resolve("never-issued", json!({})));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_times_out_no_earlier_than_deadline_and_cleans_up() {
        // Arrange
        let correlator = Correlator::new();
        let pending = correlator.issue();
        let start = tokio::time::Instant::now();

        // Act
        let result = pending.wait(Duration::from_millis(200)).await;

        // Assert
        assert!(matches!(result, Err(CorrelationError::Timeout { .. })));
        assert!(start.elapsed() >= Duration::from_millis(200));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_resolve_after_timeout_is_stale() {
        let correlator = Correlator::new();
        let pending = correlator.issue();
        let token = pending.token().to_string();

        let _ = pending.wait(Duration::from_millis(5)).await;

        assert!(!correlator.resolve(&token, json!({})));
    }

    #[tokio::test]
    async fn test_cancel_wakes_waiter_with_cancelled() {
        let correlator = Correlator::new();
        let pending = correlator.issue();
        let token = pending.token().to_string();

        assert!(correlator.cancel(&token));
        let result = pending.wait(Duration::from_secs(1)).await;

        assert_eq!(result, Err(CorrelationError::Cancelled { token }));
        assert!(!correlator.cancel("unknown"));
    }

    #[test]
    fn test_dropping_the_handle_removes_the_slot() {
        let correlator = Correlator::new();
        let pending = correlator.issue();
        let token = pending.token().to_string();
        assert!(correlator.is_pending(&token));

        drop(pending);

        assert!(!correlator.is_pending(&token));
        assert_eq!(correlator.pending_count(), 0);
    }

    #[tokio::test]
    async fn test_resolve_from_another_task() {
        let correlator = Correlator::new();
        let pending = correlator.issue();
        let token = pending.token().to_string();
        let resolver = correlator.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            resolver.resolve(&token, json!("late but in time"));
        });

        let reply = pending.wait(Duration::from_secs(2)).await.unwrap();
        assert_eq!(reply, json!("late but in time"));
    }
}
