//! The closed set of canonical event fields and the fixed-shape event record.
//!
//! Every [`CanonicalEvent`] carries every [`CanonicalField`]; a field the source
//! event did not provide is `null`.  Consumers can therefore read any field
//! without first asking which kind of event they are looking at.

use std::fmt;

use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

macro_rules! canonical_fields {
    ($($variant:ident => $name:literal,)+) => {
        /// A field of the canonical event record.
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum CanonicalField {
            $($variant,)+
        }

        impl CanonicalField {
            /// Every field, in declaration order.
            pub const ALL: &'static [CanonicalField] = &[$(CanonicalField::$variant,)+];

            /// The snake_case name used on the wire and in field tables.
            pub const fn as_str(self) -> &'static str {
                match self {
                    $(CanonicalField::$variant => $name,)+
                }
            }

            pub fn from_name(name: &str) -> Option<Self> {
                match name {
                    $($name => Some(CanonicalField::$variant),)+
                    _ => None,
                }
            }
        }
    };
}

canonical_fields! {
    // Identification
    Event => "event",
    Timestamp => "timestamp",
    PostType => "post_type",
    EventName => "event_name",
    SubType => "sub_type",
    // Server
    ServerName => "server_name",
    ServerVersion => "server_version",
    ServerType => "server_type",
    // Message
    MessageId => "message_id",
    RawMessage => "raw_message",
    Message => "message",
    Command => "command",
    // Player basics
    PlayerNickname => "player_nickname",
    PlayerUuid => "player_uuid",
    PlayerIsOp => "player_is_op",
    PlayerAddress => "player_address",
    // Player status
    PlayerHealth => "player_health",
    PlayerMaxHealth => "player_max_health",
    PlayerExperienceLevel => "player_experience_level",
    PlayerExperienceProgress => "player_experience_progress",
    PlayerTotalExperience => "player_total_experience",
    PlayerWalkSpeed => "player_walk_speed",
    // Player position
    PlayerX => "player_x",
    PlayerY => "player_y",
    PlayerZ => "player_z",
    // Death
    DeathKey => "death_key",
    DeathArgs => "death_args",
    DeathText => "death_text",
    // Achievement
    AchievementKey => "achievement_key",
    AchievementText => "achievement_text",
    AchievementDisplayTitle => "achievement_display_title",
    AchievementDisplayDescription => "achievement_display_description",
    AchievementDisplayFrame => "achievement_display_frame",
}

impl CanonicalField {
    /// Number of canonical fields.
    pub const COUNT: usize = Self::ALL.len();

    fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for CanonicalField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A normalized event: one value (possibly `null`) per [`CanonicalField`].
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalEvent {
    values: Vec<Value>,
}

impl CanonicalEvent {
    /// An event with every field `null`.
    pub fn empty() -> Self {
        Self {
            values: vec![Value::Null; CanonicalField::COUNT],
        }
    }

    /// Builds an event from `(field, value)` pairs; unlisted fields are `null`.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (CanonicalField, Value)>,
    {
        let mut event = Self::empty();
        for (field, value) in pairs {
            event.values[field.index()] = value;
        }
        event
    }

    pub fn get(&self, field: CanonicalField) -> &Value {
        &self.values[field.index()]
    }

    /// The field as a string slice, or `None` if it is null or not a string.
    pub fn str(&self, field: CanonicalField) -> Option<&str> {
        self.get(field).as_str()
    }

    /// Like [`str`](Self::str) but also treats `""` as absent.
    pub fn non_empty_str(&self, field: CanonicalField) -> Option<&str> {
        self.str(field).filter(|s| !s.is_empty())
    }

    pub fn is_null(&self, field: CanonicalField) -> bool {
        self.get(field).is_null()
    }

    /// `true` when every field is null (unknown discriminator).
    pub fn is_blank(&self) -> bool {
        self.values.iter().all(Value::is_null)
    }

    pub fn iter(&self) -> impl Iterator<Item = (CanonicalField, &Value)> {
        CanonicalField::ALL.iter().copied().zip(self.values.iter())
    }

    /// The event as a JSON object containing every field.
    pub fn to_json(&self) -> Value {
        let map: Map<String, Value> = self
            .iter()
            .map(|(field, value)| (field.as_str().to_string(), value.clone()))
            .collect();
        Value::Object(map)
    }
}

impl Default for CanonicalEvent {
    fn default() -> Self {
        Self::empty()
    }
}

impl Serialize for CanonicalEvent {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(CanonicalField::COUNT))?;
        for (field, value) in self.iter() {
            map.serialize_entry(field.as_str(), value)?;
        }
        map.end()
    }
}
