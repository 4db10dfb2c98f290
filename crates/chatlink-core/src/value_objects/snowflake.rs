//! Snowflake IDs
//!
//! Every platform record is keyed by a 64-bit snowflake whose top 42 bits are
//! a millisecond timestamp relative to [`Snowflake::EPOCH`]. The wire format
//! is a decimal string; integers are accepted when decoding.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Snowflake(u64);

impl Snowflake {
    /// 2015-01-01T00:00:00Z in Unix milliseconds
    pub const EPOCH: u64 = 1_420_070_400_000;

    const TIMESTAMP_SHIFT: u32 = 22;

    #[inline]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Zero never names a record
    #[inline]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Creation time in Unix milliseconds
    #[inline]
    pub const fn timestamp(self) -> u64 {
        (self.0 >> Self::TIMESTAMP_SHIFT) + Self::EPOCH
    }

    pub fn created_at(self) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(self.timestamp() as i64).unwrap_or_default()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("`{0}` is not a snowflake")]
pub struct SnowflakeParseError(pub String);

impl FromStr for Snowflake {
    type Err = SnowflakeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse()
            .map(Self)
            .map_err(|_| SnowflakeParseError(s.to_string()))
    }
}

impl fmt::Display for Snowflake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<u64> for Snowflake {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<Snowflake> for u64 {
    fn from(id: Snowflake) -> Self {
        id.0
    }
}

impl Serialize for Snowflake {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSnowflake {
    Number(u64),
    Text(String),
}

impl<'de> Deserialize<'de> for Snowflake {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match RawSnowflake::deserialize(deserializer)? {
            RawSnowflake::Number(id) => Ok(Self(id)),
            RawSnowflake::Text(text) => text.parse().map_err(de::Error::custom),
        }
    }
}
