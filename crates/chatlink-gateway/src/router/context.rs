//! Per-event context handed to listeners

use std::sync::OnceLock;

use chatlink_core::traits::optional_snowflake;
use chatlink_core::{FromData, ModelResult, Snowflake};
use serde_json::Value;

use crate::events::EventType;

/// One accepted dispatch event
///
/// `guild_id` and `channel_id` are resolved from the payload on first access.
#[derive(Debug, Clone)]
pub struct DispatchContext {
    event: String,
    sequence: Option<u64>,
    data: Value,
    guild_id: OnceLock<Option<Snowflake>>,
    channel_id: OnceLock<Option<Snowflake>>,
}

impl DispatchContext {
    #[must_use]
    pub fn new(event: impl Into<String>, sequence: Option<u64>, data: Value) -> Self {
        Self {
            event: event.into(),
            sequence,
            data,
            guild_id: OnceLock::new(),
            channel_id: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }

    #[must_use]
    pub fn event_type(&self) -> Option<EventType> {
        EventType::from_name(&self.event)
    }

    #[must_use]
    pub fn sequence(&self) -> Option<u64> {
        self.sequence
    }

    /// Raw payload
    #[must_use]
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Guild the event belongs to, if any
    pub fn guild_id(&self) -> Option<Snowflake> {
        *self.guild_id.get_or_init(|| {
            let field = if self.event_type().is_some_and(EventType::is_guild_record) {
                "id"
            } else {
                "guild_id"
            };
            self.snowflake(field)
        })
    }

    /// Channel the event belongs to, if any
    pub fn channel_id(&self) -> Option<Snowflake> {
        *self.channel_id.get_or_init(|| {
            let field = if self.event_type().is_some_and(EventType::is_channel_record) {
                "id"
            } else {
                "channel_id"
            };
            self.snowflake(field)
        })
    }

    /// Decode the payload as a record
    pub fn decode<T: FromData>(&self) -> ModelResult<T> {
        T::from_data(&self.data)
    }

    fn snowflake(&self, field: &'static str) -> Option<Snowflake> {
        optional_snowflake("DispatchContext", &self.data, field)
            .ok()
            .flatten()
    }
}
