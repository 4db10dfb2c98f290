//! # chatlink-core
//!
//! Data model for the chat platform: decoded records, value objects and the
//! `FromData` decoding boundary used by the gateway and REST layers.
//! This crate has no knowledge of transports, runtimes or rate limiting.

pub mod entities;
pub mod error;
pub mod traits;
pub mod value_objects;

// Re-export commonly used types at crate root
pub use entities::{
    Attachment, CategoryChannel, Channel, ChannelInfo, ChannelType, DirectChannel, Emoji, Guild,
    Member, Message, OtherChannel, Reaction, Role, TextChannel, UnavailableGuild, User,
    VoiceChannel,
};
pub use error::{ModelError, ModelResult};
pub use traits::{decode_with_serde, FromData};
pub use value_objects::{GatewayIntents, Permissions, Snowflake, SnowflakeParseError};
