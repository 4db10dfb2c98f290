//! Request and response bodies for the REST endpoints

use chatlink_core::{decode_with_serde, FromData, ModelResult, Snowflake};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::image::ImageData;
use crate::request::FileAttachment;

/// `GET /gateway/bot` response
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GatewayBot {
    pub url: String,
    pub shards: u32,
    pub session_start_limit: SessionStartLimit,
}

/// Identify quota for the bot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SessionStartLimit {
    pub total: u32,
    pub remaining: u32,
    /// Milliseconds until `remaining` resets
    pub reset_after: u64,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: u32,
}

fn default_max_concurrency() -> u32 {
    1
}

impl FromData for GatewayBot {
    const RECORD: &'static str = "GatewayBot";

    fn from_data(data: &Value) -> ModelResult<Self> {
        decode_with_serde(Self::RECORD, data)
    }
}

/// Body for creating a message
#[derive(Debug, Clone, Default, Serialize)]
pub struct CreateMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub tts: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_reference: Option<Value>,
    /// Sent as multipart parts, never inside the JSON payload
    #[serde(skip)]
    pub files: Vec<FileAttachment>,
}

impl CreateMessage {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn tts(mut self, tts: bool) -> Self {
        self.tts = tts;
        self
    }

    #[must_use]
    pub fn embed(mut self, embed: Value) -> Self {
        self.embeds.push(embed);
        self
    }

    #[must_use]
    pub fn file(mut self, file: FileAttachment) -> Self {
        self.files.push(file);
        self
    }

    /// Reply to an existing message
    #[must_use]
    pub fn reply_to(mut self, message_id: Snowflake) -> Self {
        self.message_reference = Some(json!({ "message_id": message_id }));
        self
    }

    /// A message needs content, an embed or a file
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.content.as_deref().map_or(true, str::is_empty)
            && self.embeds.is_empty()
            && self.files.is_empty()
    }
}

/// Body for editing a message; `None` fields are left unchanged
#[derive(Debug, Clone, Default, Serialize)]
pub struct EditMessage {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embeds: Option<Vec<Value>>,
}

impl EditMessage {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            embeds: None,
        }
    }
}

/// Body for `PATCH /users/@me`
#[derive(Debug, Clone, Default, Serialize)]
pub struct ModifyCurrentUser {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<ImageData>,
}
