//! In-memory record cache
//!
//! Records are stored as `Arc<T>` and never mutated in place: an update
//! builds a new record and swaps the `Arc`, so readers holding the old one
//! keep a consistent snapshot.

use std::collections::VecDeque;
use std::sync::Arc;

use chatlink_common::CacheConfig;
use chatlink_core::traits::required_snowflake;
use chatlink_core::{
    decode_with_serde, Channel, ChannelInfo, FromData, Guild, Member, Message, ModelError, Role,
    Snowflake, UnavailableGuild, User,
};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;

use super::update::{CacheError, CacheKind, CacheUpdate};
use crate::events::EventType;
use crate::protocol::Ready;
use crate::router::DispatchContext;

/// Number of records per kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub guilds: usize,
    pub channels: usize,
    pub users: usize,
    pub members: usize,
    pub messages: usize,
}

/// Caches records seen on the gateway
pub struct CacheManager {
    config: CacheConfig,
    current_user: RwLock<Option<Arc<User>>>,
    guilds: DashMap<Snowflake, Arc<Guild>>,
    channels: DashMap<Snowflake, Arc<Channel>>,
    users: DashMap<Snowflake, Arc<User>>,
    /// Keyed by (guild, user)
    members: DashMap<(Snowflake, Snowflake), Arc<Member>>,
    messages: DashMap<Snowflake, Arc<Message>>,
    /// Message ids, oldest first
    message_order: Mutex<VecDeque<Snowflake>>,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl CacheManager {
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            config,
            current_user: RwLock::new(None),
            guilds: DashMap::new(),
            channels: DashMap::new(),
            users: DashMap::new(),
            members: DashMap::new(),
            messages: DashMap::new(),
            message_order: Mutex::new(VecDeque::new()),
        }
    }

    #[must_use]
    pub fn new_shared(config: CacheConfig) -> Arc<Self> {
        Arc::new(Self::new(config))
    }

    /// Apply one dispatch event
    pub fn apply(&self, ctx: &DispatchContext) -> Result<CacheUpdate, CacheError> {
        if !self.config.enabled {
            return Ok(CacheUpdate::Ignored);
        }
        let Some(event) = ctx.event_type() else {
            return Ok(CacheUpdate::Ignored);
        };
        let data = ctx.data();

        match event {
            EventType::Ready => {
                let ready: Ready = decode_with_serde("Ready", data)?;
                Ok(self.set_current_user(ready.user))
            }
            EventType::UserUpdate => Ok(self.set_current_user(User::from_data(data)?)),
            EventType::GuildCreate | EventType::GuildUpdate => self.upsert_guild(data),
            EventType::GuildDelete => self.remove_guild(data),
            EventType::GuildRoleCreate | EventType::GuildRoleUpdate => self.upsert_role(data),
            EventType::GuildRoleDelete => self.remove_role(data),
            EventType::ChannelCreate | EventType::ChannelUpdate => {
                if !self.config.channels {
                    return Ok(CacheUpdate::Ignored);
                }
                let channel = Channel::from_data(data)?;
                let id = channel.id();
                self.channels.insert(id, Arc::new(channel));
                Ok(CacheUpdate::Upserted {
                    kind: CacheKind::Channel,
                    id,
                })
            }
            EventType::ChannelDelete => {
                let id = required_snowflake("Channel", data, "id")?;
                self.channels.remove(&id);
                Ok(CacheUpdate::Removed {
                    kind: CacheKind::Channel,
                    id,
                })
            }
            EventType::GuildMemberAdd | EventType::GuildMemberUpdate => self.upsert_member(data),
            EventType::GuildMemberRemove => {
                let guild_id = required_snowflake("Member", data, "guild_id")?;
                let user = data
                    .get("user")
                    .ok_or(ModelError::MissingField { record: "Member", field: "user" })?;
                let user_id = required_snowflake("User", user, "id")?;
                self.members.remove(&(guild_id, user_id));
                Ok(CacheUpdate::Removed {
                    kind: CacheKind::Member,
                    id: user_id,
                })
            }
            EventType::MessageCreate => self.insert_message(data),
            EventType::MessageUpdate => self.update_message(data),
            EventType::MessageDelete => {
                let id = required_snowflake("Message", data, "id")?;
                if self.messages.remove(&id).is_some() {
                    self.message_order.lock().retain(|m| *m != id);
                }
                Ok(CacheUpdate::Removed {
                    kind: CacheKind::Message,
                    id,
                })
            }
            _ => Ok(CacheUpdate::Ignored),
        }
    }

    // Lookups

    #[must_use]
    pub fn current_user(&self) -> Option<Arc<User>> {
        self.current_user.read().clone()
    }

    #[must_use]
    pub fn guild(&self, id: Snowflake) -> Option<Arc<Guild>> {
        self.guilds.get(&id).map(|r| Arc::clone(r.value()))
    }

    #[must_use]
    pub fn channel(&self, id: Snowflake) -> Option<Arc<Channel>> {
        self.channels.get(&id).map(|r| Arc::clone(r.value()))
    }

    /// Cached channels of one guild, in no particular order
    #[must_use]
    pub fn guild_channels(&self, guild_id: Snowflake) -> Vec<Arc<Channel>> {
        self.channels
            .iter()
            .filter(|r| r.value().guild_id() == Some(guild_id))
            .map(|r| Arc::clone(r.value()))
            .collect()
    }

    #[must_use]
    pub fn user(&self, id: Snowflake) -> Option<Arc<User>> {
        self.users.get(&id).map(|r| Arc::clone(r.value()))
    }

    #[must_use]
    pub fn member(&self, guild_id: Snowflake, user_id: Snowflake) -> Option<Arc<Member>> {
        self.members
            .get(&(guild_id, user_id))
            .map(|r| Arc::clone(r.value()))
    }

    #[must_use]
    pub fn message(&self, id: Snowflake) -> Option<Arc<Message>> {
        self.messages.get(&id).map(|r| Arc::clone(r.value()))
    }

    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            guilds: self.guilds.len(),
            channels: self.channels.len(),
            users: self.users.len(),
            members: self.members.len(),
            messages: self.messages.len(),
        }
    }

    // Mutations

    fn set_current_user(&self, user: User) -> CacheUpdate {
        let id = user.id;
        let user = Arc::new(user);
        *self.current_user.write() = Some(Arc::clone(&user));
        if self.config.users {
            self.users.insert(id, user);
        }
        CacheUpdate::Upserted {
            kind: CacheKind::User,
            id,
        }
    }

    fn cache_user(&self, user: &User) {
        if self.config.users {
            self.users.insert(user.id, Arc::new(user.clone()));
        }
    }

    fn upsert_guild(&self, data: &Value) -> Result<CacheUpdate, CacheError> {
        let guild = Guild::from_data(data)?;
        let id = guild.id;

        if self.config.channels {
            for channel in &guild.channels {
                self.channels.insert(channel.id(), Arc::new(channel.clone()));
            }
        }
        if self.config.members {
            for member in &guild.members {
                self.store_member(id, member.clone());
            }
        }
        if !self.config.guilds {
            return Ok(CacheUpdate::Ignored);
        }

        self.guilds.insert(id, Arc::new(guild.without_collections()));
        Ok(CacheUpdate::Upserted {
            kind: CacheKind::Guild,
            id,
        })
    }

    fn remove_guild(&self, data: &Value) -> Result<CacheUpdate, CacheError> {
        let guild = UnavailableGuild::from_data(data)?;
        self.guilds.remove(&guild.id);

        // An outage keeps the guild's channels and members until it is back
        if !guild.unavailable {
            self.channels.retain(|_, c| c.guild_id() != Some(guild.id));
            self.members.retain(|(g, _), _| *g != guild.id);
        }
        Ok(CacheUpdate::Removed {
            kind: CacheKind::Guild,
            id: guild.id,
        })
    }

    /// Replace the guild with a copy whose roles were edited by `edit`
    fn edit_roles(
        &self,
        guild_id: Snowflake,
        edit: impl FnOnce(&mut Vec<Role>),
    ) -> Result<(), CacheError> {
        let mut entry = self
            .guilds
            .get_mut(&guild_id)
            .ok_or(CacheError::UnknownGuild(guild_id))?;
        let mut guild = Guild::clone(entry.value());
        edit(&mut guild.roles);
        *entry.value_mut() = Arc::new(guild);
        Ok(())
    }

    fn upsert_role(&self, data: &Value) -> Result<CacheUpdate, CacheError> {
        if !self.config.guilds {
            return Ok(CacheUpdate::Ignored);
        }
        let guild_id = required_snowflake("Role", data, "guild_id")?;
        let raw = data
            .get("role")
            .ok_or(ModelError::MissingField { record: "Role", field: "role" })?;
        let role: Role = decode_with_serde("Role", raw)?;
        let id = role.id;

        self.edit_roles(guild_id, |roles| match roles.iter_mut().find(|r| r.id == id) {
            Some(existing) => *existing = role,
            None => roles.push(role),
        })?;
        Ok(CacheUpdate::Upserted {
            kind: CacheKind::Role,
            id,
        })
    }

    fn remove_role(&self, data: &Value) -> Result<CacheUpdate, CacheError> {
        if !self.config.guilds {
            return Ok(CacheUpdate::Ignored);
        }
        let guild_id = required_snowflake("Role", data, "guild_id")?;
        let id = required_snowflake("Role", data, "role_id")?;
        self.edit_roles(guild_id, |roles| roles.retain(|r| r.id != id))?;
        Ok(CacheUpdate::Removed {
            kind: CacheKind::Role,
            id,
        })
    }

    fn store_member(&self, guild_id: Snowflake, mut member: Member) -> Option<Snowflake> {
        let user_id = member.user_id()?;
        if let Some(user) = &member.user {
            self.cache_user(user);
        }
        member.guild_id = Some(guild_id);
        self.members.insert((guild_id, user_id), Arc::new(member));
        Some(user_id)
    }

    fn upsert_member(&self, data: &Value) -> Result<CacheUpdate, CacheError> {
        if !self.config.members {
            return Ok(CacheUpdate::Ignored);
        }
        let guild_id = required_snowflake("Member", data, "guild_id")?;
        let member = Member::from_data(data)?;
        let user_id = self
            .store_member(guild_id, member)
            .ok_or(ModelError::MissingField { record: "Member", field: "user" })?;
        Ok(CacheUpdate::Upserted {
            kind: CacheKind::Member,
            id: user_id,
        })
    }

    fn insert_message(&self, data: &Value) -> Result<CacheUpdate, CacheError> {
        let message = Message::from_data(data)?;
        let id = message.id;
        self.cache_user(&message.author);

        if !self.config.messages || self.config.message_capacity == 0 {
            return Ok(CacheUpdate::Ignored);
        }

        if self.messages.insert(id, Arc::new(message)).is_none() {
            let mut order = self.message_order.lock();
            order.push_back(id);
            while order.len() > self.config.message_capacity {
                if let Some(oldest) = order.pop_front() {
                    self.messages.remove(&oldest);
                }
            }
        }
        Ok(CacheUpdate::Upserted {
            kind: CacheKind::Message,
            id,
        })
    }

    /// MESSAGE_UPDATE payloads may be partial: overlay them on the cached copy
    fn update_message(&self, data: &Value) -> Result<CacheUpdate, CacheError> {
        if !self.config.messages {
            return Ok(CacheUpdate::Ignored);
        }
        let id = required_snowflake("Message", data, "id")?;
        let Some(cached) = self.message(id) else {
            return Ok(CacheUpdate::Ignored);
        };

        let mut merged = serde_json::to_value(cached.as_ref())
            .map_err(|e| ModelError::InvalidData { record: "Message", reason: e.to_string() })?;
        if let (Some(target), Some(patch)) = (merged.as_object_mut(), data.as_object()) {
            for (key, value) in patch {
                target.insert(key.clone(), value.clone());
            }
        }
        let updated = Message::from_data(&merged)?;

        // Deleted concurrently: do not resurrect it
        if let Some(mut entry) = self.messages.get_mut(&id) {
            *entry.value_mut() = Arc::new(updated);
        }
        Ok(CacheUpdate::Upserted {
            kind: CacheKind::Message,
            id,
        })
    }
}
