//! Channel records
//!
//! Channels are decoded into one variant per concrete shape; the
//! `ChannelInfo` trait exposes the accessors every shape shares.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::User;
use crate::error::{ModelError, ModelResult};
use crate::traits::{decode_with_serde, optional_snowflake, required_snowflake, FromData};
use crate::value_objects::Snowflake;

/// Channel type discriminator (`type` on the wire)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelType {
    GuildText,
    Dm,
    GuildVoice,
    GroupDm,
    GuildCategory,
    GuildAnnouncement,
    GuildStageVoice,
    GuildForum,
    Unknown(u8),
}

impl ChannelType {
    /// Get the wire value
    #[must_use]
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::GuildText => 0,
            Self::Dm => 1,
            Self::GuildVoice => 2,
            Self::GroupDm => 3,
            Self::GuildCategory => 4,
            Self::GuildAnnouncement => 5,
            Self::GuildStageVoice => 13,
            Self::GuildForum => 15,
            Self::Unknown(value) => value,
        }
    }
}

impl From<u8> for ChannelType {
    fn from(value: u8) -> Self {
        match value {
            0 => Self::GuildText,
            1 => Self::Dm,
            2 => Self::GuildVoice,
            3 => Self::GroupDm,
            4 => Self::GuildCategory,
            5 => Self::GuildAnnouncement,
            13 => Self::GuildStageVoice,
            15 => Self::GuildForum,
            other => Self::Unknown(other),
        }
    }
}

/// Accessors shared by every channel shape
pub trait ChannelInfo {
    fn id(&self) -> Snowflake;
    fn kind(&self) -> ChannelType;
    fn guild_id(&self) -> Option<Snowflake>;
    fn name(&self) -> Option<&str>;
}

/// Guild text, announcement or forum channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChannel {
    pub id: Snowflake,
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
    pub name: String,
    #[serde(default)]
    pub topic: Option<String>,
    #[serde(default)]
    pub position: i32,
    #[serde(default)]
    pub parent_id: Option<Snowflake>,
    #[serde(default)]
    pub nsfw: bool,
    #[serde(default)]
    pub last_message_id: Option<Snowflake>,
    #[serde(default)]
    pub rate_limit_per_user: u32,
}

/// Guild voice or stage channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoiceChannel {
    pub id: Snowflake,
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
    pub name: String,
    #[serde(default)]
    pub position: i32,
    #[serde(default)]
    pub parent_id: Option<Snowflake>,
    #[serde(default)]
    pub bitrate: u32,
    #[serde(default)]
    pub user_limit: u32,
}

/// Category grouping other guild channels
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryChannel {
    pub id: Snowflake,
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
    pub name: String,
    #[serde(default)]
    pub position: i32,
}

/// Direct or group message channel
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectChannel {
    pub id: Snowflake,
    #[serde(default)]
    pub recipients: Vec<User>,
    #[serde(default)]
    pub last_message_id: Option<Snowflake>,
    /// Only group channels have a name
    #[serde(default)]
    pub name: Option<String>,
}

/// Channel type this client does not model in detail
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtherChannel {
    pub id: Snowflake,
    pub kind: ChannelType,
    pub guild_id: Option<Snowflake>,
    pub name: Option<String>,
}

/// A decoded channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Channel {
    Text(TextChannel, ChannelType),
    Voice(VoiceChannel, ChannelType),
    Category(CategoryChannel),
    Direct(DirectChannel, ChannelType),
    Other(OtherChannel),
}

impl Channel {
    /// Attach the owning guild (GUILD_CREATE omits `guild_id` on nested channels)
    #[must_use]
    pub fn with_guild_id(mut self, guild: Snowflake) -> Self {
        match &mut self {
            Self::Text(c, _) => c.guild_id = Some(guild),
            Self::Voice(c, _) => c.guild_id = Some(guild),
            Self::Category(c) => c.guild_id = Some(guild),
            Self::Other(c) => c.guild_id = Some(guild),
            Self::Direct(..) => {}
        }
        self
    }

    /// Check if messages can be sent to this channel
    #[must_use]
    pub fn is_text_based(&self) -> bool {
        matches!(self, Self::Text(..) | Self::Direct(..))
    }

    /// Mention markup for this channel
    #[must_use]
    pub fn mention(&self) -> String {
        format!("<#{}>", self.id())
    }
}

impl ChannelInfo for Channel {
    fn id(&self) -> Snowflake {
        match self {
            Self::Text(c, _) => c.id,
            Self::Voice(c, _) => c.id,
            Self::Category(c) => c.id,
            Self::Direct(c, _) => c.id,
            Self::Other(c) => c.id,
        }
    }

    fn kind(&self) -> ChannelType {
        match self {
            Self::Text(_, kind) | Self::Voice(_, kind) | Self::Direct(_, kind) => *kind,
            Self::Category(_) => ChannelType::GuildCategory,
            Self::Other(c) => c.kind,
        }
    }

    fn guild_id(&self) -> Option<Snowflake> {
        match self {
            Self::Text(c, _) => c.guild_id,
            Self::Voice(c, _) => c.guild_id,
            Self::Category(c) => c.guild_id,
            Self::Direct(..) => None,
            Self::Other(c) => c.guild_id,
        }
    }

    fn name(&self) -> Option<&str> {
        match self {
            Self::Text(c, _) => Some(&c.name),
            Self::Voice(c, _) => Some(&c.name),
            Self::Category(c) => Some(&c.name),
            Self::Direct(c, _) => c.name.as_deref(),
            Self::Other(c) => c.name.as_deref(),
        }
    }
}

impl FromData for Channel {
    const RECORD: &'static str = "Channel";

    fn from_data(data: &Value) -> ModelResult<Self> {
        let raw_type = data
            .get("type")
            .ok_or(ModelError::MissingField {
                record: Self::RECORD,
                field: "type",
            })?
            .as_u64()
            .and_then(|t| u8::try_from(t).ok())
            .ok_or_else(|| ModelError::InvalidField {
                record: Self::RECORD,
                field: "type",
                reason: "expected a small unsigned integer".to_string(),
            })?;

        let kind = ChannelType::from(raw_type);
        let channel = match kind {
            ChannelType::GuildText | ChannelType::GuildAnnouncement | ChannelType::GuildForum => {
                Self::Text(decode_with_serde(Self::RECORD, data)?, kind)
            }
            ChannelType::GuildVoice | ChannelType::GuildStageVoice => {
                Self::Voice(decode_with_serde(Self::RECORD, data)?, kind)
            }
            ChannelType::GuildCategory => Self::Category(decode_with_serde(Self::RECORD, data)?),
            ChannelType::Dm | ChannelType::GroupDm => {
                Self::Direct(decode_with_serde(Self::RECORD, data)?, kind)
            }
            ChannelType::Unknown(_) => Self::Other(OtherChannel {
                id: required_snowflake(Self::RECORD, data, "id")?,
                kind,
                guild_id: optional_snowflake(Self::RECORD, data, "guild_id")?,
                name: data.get("name").and_then(Value::as_str).map(String::from),
            }),
        };
        Ok(channel)
    }
}
