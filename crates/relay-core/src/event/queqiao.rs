//! Field tables for QueQiao v2 events, discriminated by `sub_type`.
//!
//! Field coverage differs per server implementation (vanilla servers only send
//! `player.nickname`, Velocity only nickname/uuid/is_op, and so on); whatever
//! the raw event lacks simply normalizes to `null`.

use super::canonical::CanonicalField::{self, *};
use super::normalizer::{FieldMap, FieldPath, Normalizer};

/// Discriminator key used by QueQiao v2 events.
pub const DISCRIMINATOR: &str = "sub_type";

pub const PLAYER_CHAT: &str = "player_chat";
pub const PLAYER_COMMAND: &str = "player_command";
pub const PLAYER_DEATH: &str = "player_death";
pub const PLAYER_ACHIEVEMENT: &str = "player_achievement";
pub const PLAYER_JOIN: &str = "player_join";
pub const PLAYER_QUIT: &str = "player_quit";

type Entry = (CanonicalField, &'static [&'static str]);

const IDENTIFICATION: &[Entry] = &[
    (Event, &["sub_type"]),
    (Timestamp, &["timestamp"]),
    (PostType, &["post_type"]),
    (EventName, &["event_name"]),
    (SubType, &["sub_type"]),
];

const SERVER: &[Entry] = &[
    (ServerName, &["server_name"]),
    (ServerVersion, &["server_version"]),
    (ServerType, &["server_type"]),
];

const PLAYER_IDENTITY: &[Entry] = &[
    (PlayerNickname, &["player", "nickname"]),
    (PlayerUuid, &["player", "uuid"]),
    (PlayerIsOp, &["player", "is_op"]),
];

const PLAYER_DETAILS: &[Entry] = &[
    (PlayerAddress, &["player", "address"]),
    (PlayerHealth, &["player", "health"]),
    (PlayerMaxHealth, &["player", "max_health"]),
    (PlayerExperienceLevel, &["player", "experience_level"]),
    (PlayerExperienceProgress, &["player", "experience_progress"]),
    (PlayerTotalExperience, &["player", "total_experience"]),
    (PlayerWalkSpeed, &["player", "walk_speed"]),
    (PlayerX, &["player", "x"]),
    (PlayerY, &["player", "y"]),
    (PlayerZ, &["player", "z"]),
];

const CHAT_MESSAGE: &[Entry] = &[
    (MessageId, &["message_id"]),
    (RawMessage, &["raw_message"]),
    (Message, &["message"]),
];

const COMMAND_MESSAGE: &[Entry] = &[
    (MessageId, &["message_id"]),
    (RawMessage, &["raw_message"]),
    (Command, &["command"]),
];

const DEATH: &[Entry] = &[
    (ServerName, &["server_name"]),
    (PlayerNickname, &["player", "nickname"]),
    (DeathKey, &["death", "key"]),
    (DeathArgs, &["death", "args"]),
    (DeathText, &["death", "text"]),
];

const ACHIEVEMENT: &[Entry] = &[
    (ServerName, &["server_name"]),
    (PlayerNickname, &["player", "nickname"]),
    (AchievementKey, &["achievement", "key"]),
    (AchievementText, &["achievement", "text"]),
    (AchievementDisplayTitle, &["achievement", "display", "title"]),
    (
        AchievementDisplayDescription,
        &["achievement", "display", "description"],
    ),
    (AchievementDisplayFrame, &["achievement", "display", "frame"]),
];

fn table(blocks: &[&[Entry]]) -> FieldMap {
    blocks
        .iter()
        .flat_map(|block| block.iter())
        .map(|(field, path)| (*field, FieldPath::from(*path)))
        .collect()
}

/// A normalizer loaded with every QueQiao v2 player event table.
pub fn normalizer() -> Normalizer {
    let full_player: &[&[Entry]] = &[IDENTIFICATION, SERVER, PLAYER_IDENTITY, PLAYER_DETAILS];

    Normalizer::new(DISCRIMINATOR)
        .with_table(
            PLAYER_CHAT,
            table(&[
                IDENTIFICATION,
                SERVER,
                CHAT_MESSAGE,
                PLAYER_IDENTITY,
                PLAYER_DETAILS,
            ]),
        )
        .with_table(
            PLAYER_COMMAND,
            table(&[IDENTIFICATION, SERVER, COMMAND_MESSAGE, PLAYER_IDENTITY]),
        )
        .with_table(PLAYER_DEATH, table(&[IDENTIFICATION, DEATH]))
        .with_table(PLAYER_ACHIEVEMENT, table(&[IDENTIFICATION, ACHIEVEMENT]))
        .with_table(PLAYER_JOIN, table(full_player))
        .with_table(PLAYER_QUIT, table(full_player))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_all_player_events_are_known() {
        let n = normalizer();
        for sub_type in [
            PLAYER_CHAT,
            PLAYER_COMMAND,
            PLAYER_DEATH,
            PLAYER_ACHIEVEMENT,
            PLAYER_JOIN,
            PLAYER_QUIT,
        ] {
            assert!(n.knows(sub_type), "{sub_type} should have a table");
        }
        assert_eq!(n.discriminator(), "sub_type");
    }

    #[test]
    fn test_chat_event_maps_player_block() {
        // Arrange
        let raw = json!({
            "timestamp": 1700000000,
            "post_type": "message",
            "event_name": "PlayerChatEvent",
            "server_name": "Survival",
            "sub_type": "player_chat",
            "message_id": "m1",
            "raw_message": "hello",
            "message": "hello",
            "player": {"nickname": "Steve", "uuid": "u-1", "is_op": false, "x": 1.0}
        });

        // Act
        let event = normalizer().normalize(&raw);

        // Assert
        assert_eq!(event.str(Event), Some("player_chat"));
        assert_eq!(event.str(EventName), Some("PlayerChatEvent"));
        assert_eq!(event.str(Message), Some("hello"));
        assert_eq!(event.str(PlayerNickname), Some("Steve"));
        assert_eq!(event.get(PlayerIsOp), &json!(false));
        assert_eq!(event.get(PlayerX), &json!(1.0));
        assert!(event.is_null(PlayerY));
        assert!(event.is_null(Command));
    }

    #[test]
    fn test_death_event_without_death_block_nulls_only_death_fields() {
        let raw = json!({
            "sub_type": "player_death",
            "event_name": "PlayerDeathEvent",
            "server_name": "S",
            "player": {"nickname": "Alex"}
        });

        let event = normalizer().normalize(&raw);

        assert_eq!(event.str(PlayerNickname), Some("Alex"));
        assert_eq!(event.str(ServerName), Some("S"));
        assert!(event.is_null(DeathKey));
        assert!(event.is_null(DeathArgs));
        assert!(event.is_null(DeathText));
    }

    #[test]
    fn test_achievement_display_fields_follow_nested_path() {
        let raw = json!({
            "sub_type": "player_achievement",
            "achievement": {
                "key": "story/mine_stone",
                "text": "Stone Age",
                "display": {"title": "t", "frame": "task"}
            }
        });

        let event = normalizer().normalize(&raw);

        assert_eq!(event.str(AchievementText), Some("Stone Age"));
        assert_eq!(event.str(AchievementDisplayFrame), Some("task"));
        assert!(event.is_null(AchievementDisplayDescription));
    }

    #[test]
    fn test_command_table_does_not_map_player_position() {
        let raw = json!({
            "sub_type": "player_command",
            "command": "tp 0 0 0",
            "player": {"nickname": "Op", "x": 10.0}
        });

        let event = normalizer().normalize(&raw);

        assert_eq!(event.str(Command), Some("tp 0 0 0"));
        assert!(event.is_null(PlayerX));
    }
}
