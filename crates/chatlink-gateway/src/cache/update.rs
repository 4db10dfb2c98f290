//! Cache mutation results

use chatlink_core::{ModelError, Snowflake};
use thiserror::Error;

/// Record kinds held by the cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheKind {
    Guild,
    Role,
    Channel,
    User,
    Member,
    Message,
}

/// What applying one event changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheUpdate {
    /// The event is not cached, or its kind is disabled
    Ignored,
    /// A record was inserted or replaced
    Upserted { kind: CacheKind, id: Snowflake },
    /// A record was removed (or was already absent)
    Removed { kind: CacheKind, id: Snowflake },
}

/// Cache mutation failure; the event is still routed to listeners
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Undecodable payload: {0}")]
    Decode(#[from] ModelError),

    #[error("Guild {0} is not cached")]
    UnknownGuild(Snowflake),
}
