//! Dialer connection state machine.
//!
//! ```text
//! Disconnected ──begin_attempt──▶ Connecting ──connected──▶ Connected
//!      ▲                              │                         │
//!      └────────── disconnected ──────┴─────────────────────────┘
//! ```
//!
//! There is no terminal state: the reconnect loop cycles for the life of the
//! process.  Attempts are numbered from 1 and the numbering restarts after every
//! successful connection.

use std::fmt;

use thiserror::Error;

/// Where the dialer currently is in its connect/reconnect cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialerState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for DialerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DialerState::Disconnected => "disconnected",
            DialerState::Connecting => "connecting",
            DialerState::Connected => "connected",
        };
        f.write_str(name)
    }
}

/// A transition was requested from a state that does not allow it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid dialer transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: DialerState,
    pub to: DialerState,
}

/// Tracks the dialer state plus attempt bookkeeping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStateMachine {
    state: DialerState,
    attempt: u32,
    consecutive_failures: u32,
}

impl Default for ConnectionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionStateMachine {
    pub fn new() -> Self {
        Self {
            state: DialerState::Disconnected,
            attempt: 0,
            consecutive_failures: 0,
        }
    }

    pub fn state(&self) -> DialerState {
        self.state
    }

    /// Number of the current (or most recent) attempt since the last success.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Attempts that ended before reaching `Connected`, since the last success.
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// `Disconnected → Connecting`.  Returns the new attempt number.
    pub fn begin_attempt(&mut self) -> Result<u32, InvalidTransition> {
        self.require(DialerState::Disconnected, DialerState::Connecting)?;
        self.state = DialerState::Connecting;
        self.attempt += 1;
        Ok(self.attempt)
    }

    /// `Connecting → Connected`.  Resets the attempt and failure counters.
    pub fn connected(&mut self) -> Result<(), InvalidTransition> {
        self.require(DialerState::Connecting, DialerState::Connected)?;
        self.state = DialerState::Connected;
        self.attempt = 0;
        self.consecutive_failures = 0;
        Ok(())
    }

    /// Any state `→ Disconnected`.  Returns the state that was left.
    ///
    /// Leaving `Connecting` counts as a failed attempt.
    pub fn disconnected(&mut self) -> DialerState {
        let previous = self.state;
        if previous == DialerState::Connecting {
            self.consecutive_failures += 1;
        }
        self.state = DialerState::Disconnected;
        previous
    }

    fn require(&self, from: DialerState, to: DialerState) -> Result<(), InvalidTransition> {
        if self.state == from {
            Ok(())
        } else {
            Err(InvalidTransition {
                from: self.state,
                to,
            })
        }
    }
}
