//! Permission bitflags carried by roles and channel overwrites
//!
//! The platform sends permission sets as decimal strings.

use bitflags::bitflags;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

bitflags! {
    /// Permission flags as defined by the platform
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct Permissions: u64 {
        const CREATE_INSTANT_INVITE = 1 << 0;
        const KICK_MEMBERS          = 1 << 1;
        const BAN_MEMBERS           = 1 << 2;
        const ADMINISTRATOR         = 1 << 3;
        const MANAGE_CHANNELS       = 1 << 4;
        const MANAGE_GUILD          = 1 << 5;
        const ADD_REACTIONS         = 1 << 6;
        const VIEW_AUDIT_LOG        = 1 << 7;
        const VIEW_CHANNEL          = 1 << 10;
        const SEND_MESSAGES         = 1 << 11;
        const MANAGE_MESSAGES       = 1 << 13;
        const EMBED_LINKS           = 1 << 14;
        const ATTACH_FILES          = 1 << 15;
        const READ_MESSAGE_HISTORY  = 1 << 16;
        const MENTION_EVERYONE      = 1 << 17;
        const CONNECT               = 1 << 20;
        const SPEAK                 = 1 << 21;
        const MANAGE_ROLES          = 1 << 28;
        const MANAGE_WEBHOOKS       = 1 << 29;
    }
}

impl Permissions {
    /// Check if the permission set grants a permission
    ///
    /// Administrators bypass all permission checks.
    #[inline]
    pub fn has(&self, permission: Permissions) -> bool {
        self.contains(Permissions::ADMINISTRATOR) || self.contains(permission)
    }

    /// Combine permissions from multiple roles
    pub fn combine<I>(roles: I) -> Self
    where
        I: IntoIterator<Item = Permissions>,
    {
        roles.into_iter().fold(Permissions::empty(), |acc, p| acc | p)
    }

    /// Parse from the wire representation (decimal number, unknown bits kept)
    pub fn parse(s: &str) -> Result<Self, std::num::ParseIntError> {
        s.parse::<u64>().map(Permissions::from_bits_retain)
    }
}

impl Serialize for Permissions {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.bits().to_string())
    }
}

impl<'de> Deserialize<'de> for Permissions {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => Permissions::parse(&s).map_err(serde::de::Error::custom),
            Raw::Number(n) => Ok(Permissions::from_bits_retain(n)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_administrator_bypass() {
        let admin = Permissions::ADMINISTRATOR;
        assert!(admin.has(Permissions::BAN_MEMBERS));

        let member = Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES;
        assert!(member.has(Permissions::SEND_MESSAGES));
        assert!(!member.has(Permissions::MANAGE_MESSAGES));
    }

    #[test]
    fn test_combine() {
        let combined = Permissions::combine([Permissions::SPEAK, Permissions::CONNECT]);
        assert_eq!(combined, Permissions::SPEAK | Permissions::CONNECT);
    }

    #[test]
    fn test_string_wire_format() {
        let perms: Permissions = serde_json::from_str("\"3072\"").unwrap();
        assert_eq!(perms, Permissions::VIEW_CHANNEL | Permissions::SEND_MESSAGES);
        assert_eq!(serde_json::to_string(&perms).unwrap(), "\"3072\"");
    }

    #[test]
    fn test_unknown_bits_are_retained() {
        let perms = Permissions::parse(&(1u64 << 50).to_string()).unwrap();
        assert_eq!(perms.bits(), 1 << 50);
    }
}
