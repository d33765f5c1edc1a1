//! The two business routers.
//!
//! - [`QqToMcRouter`] handles chat-gateway events and broadcasts qualifying
//!   group messages into the game.
//! - [`McToQqRouter`] handles game events and announces them in the chat group.
//!
//! Each router only sees the *other* side through an outbound trait
//! ([`GameOutbound`], [`ChatOutbound`]), so both are unit-tested with mocks.
//! Sends are fire-and-forget: a failed send is logged and the event is done.

use std::sync::Arc;

use async_trait::async_trait;
use relay_core::event::CanonicalField;
use relay_core::protocol::queqiao::BROADCAST;
use relay_core::protocol::Params;
use relay_core::{MessageHandler, Normalizer};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::format::{game_notice, group_broadcast, GameEventKind, SkipReason, DEFAULT_SERVER_NAME};
use crate::domain::ForwardingConfig;

/// Fire-and-forget sends towards the chat gateway.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChatOutbound: Send + Sync {
    /// Sends a raw OneBot action object; returns `false` if it was not delivered.
    async fn notify(&self, payload: Value) -> bool;
}

/// Fire-and-forget sends towards the game server.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GameOutbound: Send + Sync {
    /// Renders template `kind` with `params` and sends it; returns `false` on failure.
    async fn notify(&self, kind: &str, params: &Params) -> bool;
}

// ── Chat → game ───────────────────────────────────────────────────────────────

pub struct QqToMcRouter {
    target_group_id: i64,
    game: Arc<dyn GameOutbound>,
}

impl QqToMcRouter {
    pub fn new(target_group_id: i64, game: Arc<dyn GameOutbound>) -> Self {
        Self {
            target_group_id,
            game,
        }
    }
}

#[async_trait]
impl MessageHandler for QqToMcRouter {
    async fn handle(&self, message: Value) -> anyhow::Result<()> {
        let broadcast = match group_broadcast(&message, self.target_group_id) {
            Ok(broadcast) => broadcast,
            Err(SkipReason::NotGroupMessage) | Err(SkipReason::OtherGroup) => return Ok(()),
            Err(reason) => {
                debug!("[QQ -> MC] group message not forwarded: {reason:?}");
                return Ok(());
            }
        };

        info!(
            "[QQ -> MC] [{}] [{}] {}",
            broadcast.group, broadcast.sender, broadcast.content
        );
        if !self.game.notify(BROADCAST, &broadcast.to_params()).await {
            warn!("[QQ -> MC] broadcast not delivered (game server connection down?)");
        }
        Ok(())
    }
}

// ── Game → chat ───────────────────────────────────────────────────────────────

pub struct McToQqRouter {
    forwarding: ForwardingConfig,
    normalizer: Normalizer,
    chat: Arc<dyn ChatOutbound>,
}

impl McToQqRouter {
    pub fn new(forwarding: ForwardingConfig, normalizer: Normalizer, chat: Arc<dyn ChatOutbound>) -> Self {
        Self {
            forwarding,
            normalizer,
            chat,
        }
    }

    /// OneBot `send_group_msg` for the bridged group.
    fn group_message(&self, text: &str) -> Value {
        json!({
            "action": "send_group_msg",
            "params": {
                "group_id": self.forwarding.target_group_id,
                "message": text,
            }
        })
    }
}

#[async_trait]
impl MessageHandler for McToQqRouter {
    async fn handle(&self, message: Value) -> anyhow::Result<()> {
        let event = self.normalizer.normalize(&message);
        let Some(kind) = event
            .str(CanonicalField::EventName)
            .and_then(GameEventKind::from_event_name)
        else {
            debug!("[MC -> QQ] ignoring event {:?}", message.get("event_name"));
            return Ok(());
        };
        if !kind.is_enabled(&self.forwarding) {
            return Ok(());
        }
        let Some(text) = game_notice(kind, &event) else {
            return Ok(());
        };

        let server = event
            .non_empty_str(CanonicalField::ServerName)
            .unwrap_or(DEFAULT_SERVER_NAME);
        info!("[MC -> QQ] [{server}] {kind:?}: {text}");
        if !self.chat.notify(self.group_message(&text)).await {
            let preview: String = text.chars().take(30).collect();
            warn!("[MC -> QQ] sending to the chat group failed: {preview}...");
        }
        Ok(())
    }
}
