//! Outbound message envelope and the per-peer wire shape.
//!
//! Both peers speak JSON objects with three top-level keys: an action name, a
//! data object, and an optional correlation token.  They only disagree on the
//! names of the first two:
//!
//! ```text
//! game plugin   {"api":    "broadcast",      "data":   {...}, "echo": "<token>"}
//! chat gateway  {"action": "send_group_msg", "params": {...}, "echo": "<token>"}
//! ```

use serde_json::{Map, Value};

/// Top-level key carrying the correlation token in both directions.
pub const ECHO_FIELD: &str = "echo";

/// Names of the action and data keys for one peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WireShape {
    pub action_key: &'static str,
    pub data_key: &'static str,
}

impl WireShape {
    /// QueQiao game-server plugin: `{"api", "data"}`.
    pub const QUEQIAO: WireShape = WireShape {
        action_key: "api",
        data_key: "data",
    };

    /// OneBot v11 chat gateway: `{"action", "params"}`.
    pub const ONEBOT: WireShape = WireShape {
        action_key: "action",
        data_key: "params",
    };
}

/// A fully rendered message ready to be serialized through a [`WireShape`].
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundMessage {
    pub action: String,
    pub data: Value,
    pub echo: Option<String>,
}

impl OutboundMessage {
    pub fn new(action: impl Into<String>, data: Value) -> Self {
        Self {
            action: action.into(),
            data,
            echo: None,
        }
    }

    pub fn with_echo(mut self, token: impl Into<String>) -> Self {
        self.echo = Some(token.into());
        self
    }

    /// Builds the wire object; `echo` is omitted entirely when absent.
    pub fn to_value(&self, shape: WireShape) -> Value {
        let mut map = Map::with_capacity(3);
        map.insert(shape.action_key.to_string(), Value::String(self.action.clone()));
        map.insert(shape.data_key.to_string(), self.data.clone());
        if let Some(token) = &self.echo {
            map.insert(ECHO_FIELD.to_string(), Value::String(token.clone()));
        }
        Value::Object(map)
    }

    /// Compact JSON text; non-ASCII characters are emitted as UTF-8, not escaped.
    pub fn to_text(&self, shape: WireShape) -> String {
        self.to_value(shape).to_string()
    }
}

/// Reads a usable correlation token from an inbound message.
///
/// Non-empty strings and numbers count as tokens; `null`, `""`, `false`,
/// objects and arrays do not (those messages are ordinary events).
pub fn extract_echo(message: &Value) -> Option<String> {
    match message.get(ECHO_FIELD)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Removes the `echo` key from an object, returning what was there.
pub fn strip_echo(message: &mut Value) -> Option<Value> {
    message.as_object_mut()?.remove(ECHO_FIELD)
}
