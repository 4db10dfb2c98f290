//! Value objects - immutable types shared by every record

mod intents;
mod permissions;
mod snowflake;

pub use intents::GatewayIntents;
pub use permissions::Permissions;
pub use snowflake::{Snowflake, SnowflakeParseError};
