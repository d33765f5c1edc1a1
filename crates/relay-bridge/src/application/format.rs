//! Message selection and formatting for both directions.
//!
//! Everything here is pure: it inspects JSON or a [`CanonicalEvent`] and
//! returns what should be sent, or why nothing should be.  The routers in
//! [`super::router`] do the sending.

use relay_core::event::CanonicalField::{
    AchievementText, Command, DeathText, Message, PlayerNickname, ServerName,
};
use relay_core::protocol::Params;
use relay_core::CanonicalEvent;
use serde_json::Value;

use crate::domain::ForwardingConfig;

pub const UNKNOWN_CHAT_USER: &str = "未知QQ用户";
pub const DEFAULT_SERVER_NAME: &str = "MC";
pub const UNKNOWN_PLAYER: &str = "未知玩家";

// ── Chat → game ───────────────────────────────────────────────────────────────

/// Why a chat message is not forwarded to the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Not `post_type == "message"` with `message_type == "group"`.
    NotGroupMessage,
    /// A group other than the bridged one.
    OtherGroup,
    /// Contains a CQ code (image, face, reply, ...).
    RichText,
    /// Starts with an `http://` or `https://` link.
    Link,
    /// Nothing left after trimming whitespace.
    Empty,
}

/// The parameters of one `mc.broadcast`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupBroadcast {
    pub group: String,
    pub sender: String,
    pub content: String,
}

impl GroupBroadcast {
    pub fn to_params(&self) -> Params {
        let mut params = Params::new();
        params.insert("group".to_string(), Value::from(self.group.as_str()));
        params.insert("sender".to_string(), Value::from(self.sender.as_str()));
        params.insert("content".to_string(), Value::from(self.content.as_str()));
        params
    }
}

fn non_empty<'a>(value: Option<&'a Value>) -> Option<&'a str> {
    value.and_then(Value::as_str).filter(|s| !s.is_empty())
}

/// Decides whether a OneBot event becomes a game broadcast.
///
/// # Errors
///
/// Returns the [`SkipReason`] when the event must not be forwarded.
pub fn group_broadcast(event: &Value, target_group_id: i64) -> Result<GroupBroadcast, SkipReason> {
    let field = |name: &str| event.get(name).and_then(Value::as_str);
    if field("post_type") != Some("message") || field("message_type") != Some("group") {
        return Err(SkipReason::NotGroupMessage);
    }
    if event.get("group_id").and_then(Value::as_i64) != Some(target_group_id) {
        return Err(SkipReason::OtherGroup);
    }

    let group = match field("group_name").map(str::trim) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("群{target_group_id}"),
    };
    let sender_info = event.get("sender");
    let sender = non_empty(sender_info.and_then(|s| s.get("card")))
        .or_else(|| non_empty(sender_info.and_then(|s| s.get("nickname"))))
        .unwrap_or(UNKNOWN_CHAT_USER)
        .to_string();

    let raw = field("raw_message").unwrap_or("");
    if raw.contains("[CQ:") {
        return Err(SkipReason::RichText);
    }
    if raw.starts_with("http://") || raw.starts_with("https://") {
        return Err(SkipReason::Link);
    }
    let content = raw.trim();
    if content.is_empty() {
        return Err(SkipReason::Empty);
    }

    Ok(GroupBroadcast {
        group,
        sender,
        content: content.to_string(),
    })
}

// ── Game → chat ───────────────────────────────────────────────────────────────

/// Game events the bridge announces in the chat group, keyed by `event_name`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameEventKind {
    Chat,
    Join,
    Quit,
    Death,
    Achievement,
    Command,
}

impl GameEventKind {
    pub fn from_event_name(name: &str) -> Option<Self> {
        match name {
            "PlayerChatEvent" => Some(Self::Chat),
            "PlayerJoinEvent" => Some(Self::Join),
            "PlayerQuitEvent" => Some(Self::Quit),
            "PlayerDeathEvent" => Some(Self::Death),
            "PlayerAchievementEvent" => Some(Self::Achievement),
            "PlayerCommandEvent" => Some(Self::Command),
            _ => None,
        }
    }

    /// Whether this kind is switched on in `[forwarding]`.
    pub fn is_enabled(self, forwarding: &ForwardingConfig) -> bool {
        match self {
            Self::Chat => forwarding.mc_chat,
            Self::Join => forwarding.mc_join,
            Self::Quit => forwarding.mc_quit,
            Self::Death => forwarding.mc_death,
            Self::Achievement => forwarding.mc_achievement,
            Self::Command => forwarding.mc_command,
        }
    }
}

/// The chat line announcing `event`, or `None` when the event has nothing to say
/// (a chat event without text, an achievement without a name).
pub fn game_notice(kind: GameEventKind, event: &CanonicalEvent) -> Option<String> {
    let server = event.non_empty_str(ServerName).unwrap_or(DEFAULT_SERVER_NAME);
    let player = event.non_empty_str(PlayerNickname).unwrap_or(UNKNOWN_PLAYER);

    match kind {
        GameEventKind::Chat => event
            .non_empty_str(Message)
            .map(|text| format!("[{server}] <{player}> {text}")),
        GameEventKind::Join => Some(format!("[{server}] 🟢 欢迎 {player} 加入游戏!")),
        GameEventKind::Quit => Some(format!("[{server}] 🔴 {player} 离开了游戏。")),
        GameEventKind::Death => {
            let text = event
                .non_empty_str(DeathText)
                .map(str::to_string)
                .unwrap_or_else(|| format!("{player} 不幸去世了"));
            Some(format!("[{server}] ☠️ {text}"))
        }
        GameEventKind::Achievement => event
            .non_empty_str(AchievementText)
            .map(|text| format!("[{server}] 🎉 恭喜 {player} 达成了成就 [{text}]!")),
        GameEventKind::Command => {
            let command = event.str(Command).unwrap_or("");
            Some(format!("[{server}] ℹ️ {player} 执行了命令: /{command}"))
        }
    }
}
