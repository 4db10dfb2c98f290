//! Decoded records exposed to callers

mod channel;
mod emoji;
mod guild;
mod member;
mod message;
mod role;
mod user;

pub use channel::{
    CategoryChannel, Channel, ChannelInfo, ChannelType, DirectChannel, OtherChannel, TextChannel,
    VoiceChannel,
};
pub use emoji::{Emoji, Reaction};
pub use guild::{Guild, UnavailableGuild};
pub use member::Member;
pub use message::{Attachment, Message};
pub use role::Role;
pub use user::User;
