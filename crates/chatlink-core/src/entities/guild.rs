//! Guild records

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::entities::{Channel, Member, Role};
use crate::error::ModelResult;
use crate::traits::{decode_with_serde, FromData};
use crate::value_objects::Snowflake;

/// A guild (server)
///
/// `channels` and `members` are only populated from GUILD_CREATE payloads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guild {
    pub id: Snowflake,
    pub name: String,
    pub icon: Option<String>,
    pub owner_id: Snowflake,
    pub roles: Vec<Role>,
    pub member_count: Option<u64>,
    pub large: bool,
    pub channels: Vec<Channel>,
    pub members: Vec<Member>,
}

/// Scalar guild fields, decoded through serde
#[derive(Deserialize)]
struct GuildFields {
    id: Snowflake,
    name: String,
    #[serde(default)]
    icon: Option<String>,
    owner_id: Snowflake,
    #[serde(default)]
    roles: Vec<Role>,
    #[serde(default)]
    member_count: Option<u64>,
    #[serde(default)]
    large: bool,
}

impl Guild {
    /// Find a role by id
    #[must_use]
    pub fn role(&self, role_id: Snowflake) -> Option<&Role> {
        self.roles.iter().find(|r| r.id == role_id)
    }

    /// The @everyone role
    #[must_use]
    pub fn everyone_role(&self) -> Option<&Role> {
        self.role(self.id)
    }

    /// Copy of this guild without the GUILD_CREATE-only collections
    #[must_use]
    pub fn without_collections(&self) -> Self {
        Self {
            channels: Vec::new(),
            members: Vec::new(),
            ..self.clone()
        }
    }
}

impl FromData for Guild {
    const RECORD: &'static str = "Guild";

    fn from_data(data: &Value) -> ModelResult<Self> {
        let fields: GuildFields = decode_with_serde(Self::RECORD, data)?;

        let channels = data
            .get("channels")
            .and_then(Value::as_array)
            .map(|raw| {
                raw.iter()
                    .map(|c| Channel::from_data(c).map(|c| c.with_guild_id(fields.id)))
                    .collect::<ModelResult<Vec<_>>>()
            })
            .transpose()?
            .unwrap_or_default();

        let members = data
            .get("members")
            .and_then(Value::as_array)
            .map(|raw| raw.iter().map(Member::from_data).collect::<ModelResult<Vec<_>>>())
            .transpose()?
            .unwrap_or_default();

        Ok(Self {
            id: fields.id,
            name: fields.name,
            icon: fields.icon,
            owner_id: fields.owner_id,
            roles: fields.roles,
            member_count: fields.member_count,
            large: fields.large,
            channels,
            members,
        })
    }
}

/// Guild placeholder sent in READY and during outages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnavailableGuild {
    pub id: Snowflake,
    #[serde(default)]
    pub unavailable: bool,
}

impl FromData for UnavailableGuild {
    const RECORD: &'static str = "UnavailableGuild";

    fn from_data(data: &Value) -> ModelResult<Self> {
        decode_with_serde(Self::RECORD, data)
    }
}
