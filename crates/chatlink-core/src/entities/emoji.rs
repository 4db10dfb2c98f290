//! Emoji and reaction records

use serde::{Serialize, Serializer};
use serde_json::{json, Value};

use crate::error::{ModelError, ModelResult};
use crate::traits::{optional_snowflake, required_snowflake, FromData};
use crate::value_objects::Snowflake;

/// An emoji as it appears in reactions and messages
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Emoji {
    /// Guild emoji uploaded by users
    Custom {
        id: Snowflake,
        /// Can be missing when the emoji was deleted
        name: Option<String>,
        animated: bool,
    },
    /// Standard unicode emoji
    Unicode { name: String },
}

impl Emoji {
    /// Encoding used in reaction routes (`name:id` or the raw character)
    #[must_use]
    pub fn route_component(&self) -> String {
        match self {
            Self::Custom { id, name, .. } => format!("{}:{id}", name.as_deref().unwrap_or("_")),
            Self::Unicode { name } => name.clone(),
        }
    }

    #[must_use]
    pub fn id(&self) -> Option<Snowflake> {
        match self {
            Self::Custom { id, .. } => Some(*id),
            Self::Unicode { .. } => None,
        }
    }
}

impl FromData for Emoji {
    const RECORD: &'static str = "Emoji";

    fn from_data(data: &Value) -> ModelResult<Self> {
        if !data.is_object() {
            return Err(ModelError::NotAnObject { record: Self::RECORD });
        }
        let name = data.get("name").and_then(Value::as_str).map(String::from);

        match optional_snowflake(Self::RECORD, data, "id")? {
            Some(id) => Ok(Self::Custom {
                id,
                name,
                animated: data.get("animated").and_then(Value::as_bool).unwrap_or(false),
            }),
            None => name
                .map(|name| Self::Unicode { name })
                .ok_or(ModelError::MissingField {
                    record: Self::RECORD,
                    field: "name",
                }),
        }
    }
}

impl Serialize for Emoji {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let value = match self {
            Self::Custom { id, name, animated } => {
                json!({"id": id, "name": name, "animated": animated})
            }
            Self::Unicode { name } => json!({"id": null, "name": name}),
        };
        value.serialize(serializer)
    }
}

/// A reaction add/remove event body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reaction {
    pub user_id: Snowflake,
    pub channel_id: Snowflake,
    pub message_id: Snowflake,
    pub guild_id: Option<Snowflake>,
    pub emoji: Emoji,
}

impl FromData for Reaction {
    const RECORD: &'static str = "Reaction";

    fn from_data(data: &Value) -> ModelResult<Self> {
        let emoji = data.get("emoji").ok_or(ModelError::MissingField {
            record: Self::RECORD,
            field: "emoji",
        })?;

        Ok(Self {
            user_id: required_snowflake(Self::RECORD, data, "user_id")?,
            channel_id: required_snowflake(Self::RECORD, data, "channel_id")?,
            message_id: required_snowflake(Self::RECORD, data, "message_id")?,
            guild_id: optional_snowflake(Self::RECORD, data, "guild_id")?,
            emoji: Emoji::from_data(emoji)?,
        })
    }
}
