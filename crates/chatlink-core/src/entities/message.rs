//! Message records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::User;
use crate::error::ModelResult;
use crate::traits::{decode_with_serde, FromData};
use crate::value_objects::Snowflake;

/// File attached to a message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: Snowflake,
    pub filename: String,
    pub size: u64,
    pub url: String,
    #[serde(default)]
    pub proxy_url: Option<String>,
    #[serde(default)]
    pub content_type: Option<String>,
}

/// A message in a channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Snowflake,
    pub channel_id: Snowflake,
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
    pub author: User,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub edited_timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tts: bool,
    #[serde(default)]
    pub mention_everyone: bool,
    #[serde(default)]
    pub mentions: Vec<User>,
    #[serde(default)]
    pub mention_roles: Vec<Snowflake>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    /// Embeds are passed through undecoded
    #[serde(default)]
    pub embeds: Vec<Value>,
    #[serde(default)]
    pub pinned: bool,
}

impl Message {
    /// Check if the message was written by a bot account
    #[must_use]
    pub fn is_from_bot(&self) -> bool {
        self.author.bot
    }

    /// Check if the message mentions a user
    #[must_use]
    pub fn mentions_user(&self, user_id: Snowflake) -> bool {
        self.mention_everyone || self.mentions.iter().any(|u| u.id == user_id)
    }
}

impl FromData for Message {
    const RECORD: &'static str = "Message";

    fn from_data(data: &Value) -> ModelResult<Self> {
        decode_with_serde(Self::RECORD, data)
    }
}

impl FromData for Attachment {
    const RECORD: &'static str = "Attachment";

    fn from_data(data: &Value) -> ModelResult<Self> {
        decode_with_serde(Self::RECORD, data)
    }
}
