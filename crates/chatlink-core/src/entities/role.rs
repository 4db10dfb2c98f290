//! Role record

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ModelResult;
use crate::traits::{decode_with_serde, FromData};
use crate::value_objects::{Permissions, Snowflake};

/// A guild role
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: Snowflake,
    pub name: String,
    #[serde(default)]
    pub color: u32,
    #[serde(default)]
    pub hoist: bool,
    pub position: i32,
    pub permissions: Permissions,
    #[serde(default)]
    pub managed: bool,
    #[serde(default)]
    pub mentionable: bool,
}

impl Role {
    /// The @everyone role shares its id with the guild
    #[must_use]
    pub fn is_everyone(&self, guild_id: Snowflake) -> bool {
        self.id == guild_id
    }
}

impl FromData for Role {
    const RECORD: &'static str = "Role";

    fn from_data(data: &Value) -> ModelResult<Self> {
        decode_with_serde(Self::RECORD, data)
    }
}
