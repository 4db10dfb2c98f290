//! Guild member record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::User;
use crate::error::ModelResult;
use crate::traits::{decode_with_serde, FromData};
use crate::value_objects::Snowflake;

/// A user's membership in one guild
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    /// Absent only in member objects embedded in MESSAGE_CREATE
    #[serde(default)]
    pub user: Option<User>,
    #[serde(default)]
    pub nick: Option<String>,
    #[serde(default)]
    pub roles: Vec<Snowflake>,
    pub joined_at: DateTime<Utc>,
    #[serde(default)]
    pub deaf: bool,
    #[serde(default)]
    pub mute: bool,
    /// Set on gateway member events, absent in REST responses
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
}

impl Member {
    /// Id of the member's user, when present
    #[must_use]
    pub fn user_id(&self) -> Option<Snowflake> {
        self.user.as_ref().map(|u| u.id)
    }

    /// Check if the member holds a role
    #[must_use]
    pub fn has_role(&self, role_id: Snowflake) -> bool {
        self.roles.contains(&role_id)
    }
}

impl FromData for Member {
    const RECORD: &'static str = "Member";

    fn from_data(data: &Value) -> ModelResult<Self> {
        decode_with_serde(Self::RECORD, data)
    }
}
