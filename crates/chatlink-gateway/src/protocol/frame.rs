//! Gateway frame format

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::payloads::{Identify, RequestGuildMembers, Resume, UpdatePresence};
use super::OpCode;

/// A single gateway frame
///
/// `s` and `t` are only present on dispatch frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayFrame {
    pub op: OpCode,

    /// Sequence number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub s: Option<u64>,

    /// Event name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub t: Option<String>,

    #[serde(default)]
    pub d: Value,
}

impl GatewayFrame {
    #[must_use]
    pub fn new(op: OpCode, d: Value) -> Self {
        Self { op, s: None, t: None, d }
    }

    fn with_payload<T: Serialize>(op: OpCode, payload: &T) -> Result<Self, serde_json::Error> {
        Ok(Self::new(op, serde_json::to_value(payload)?))
    }

    // Sent by the client

    /// Heartbeat carrying the last received sequence (`null` before the first dispatch)
    #[must_use]
    pub fn heartbeat(sequence: Option<u64>) -> Self {
        Self::new(OpCode::Heartbeat, sequence.map_or(Value::Null, Value::from))
    }

    pub fn identify(payload: &Identify) -> Result<Self, serde_json::Error> {
        Self::with_payload(OpCode::Identify, payload)
    }

    pub fn resume(payload: &Resume) -> Result<Self, serde_json::Error> {
        Self::with_payload(OpCode::Resume, payload)
    }

    pub fn presence_update(payload: &UpdatePresence) -> Result<Self, serde_json::Error> {
        Self::with_payload(OpCode::PresenceUpdate, payload)
    }

    pub fn request_guild_members(payload: &RequestGuildMembers) -> Result<Self, serde_json::Error> {
        Self::with_payload(OpCode::RequestGuildMembers, payload)
    }

    // Sent by the server

    #[must_use]
    pub fn dispatch(event: impl Into<String>, sequence: u64, data: Value) -> Self {
        Self {
            op: OpCode::Dispatch,
            s: Some(sequence),
            t: Some(event.into()),
            d: data,
        }
    }

    #[must_use]
    pub fn hello(heartbeat_interval: u64) -> Self {
        Self::new(
            OpCode::Hello,
            serde_json::json!({ "heartbeat_interval": heartbeat_interval }),
        )
    }

    #[must_use]
    pub fn heartbeat_ack() -> Self {
        Self::new(OpCode::HeartbeatAck, Value::Null)
    }

    #[must_use]
    pub fn reconnect() -> Self {
        Self::new(OpCode::Reconnect, Value::Null)
    }

    /// `resumable` tells the client whether RESUME may still succeed
    #[must_use]
    pub fn invalid_session(resumable: bool) -> Self {
        Self::new(OpCode::InvalidSession, Value::Bool(resumable))
    }

    // Accessors

    /// Decode the payload into a typed structure
    pub fn data_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        T::deserialize(&self.d)
    }

    #[must_use]
    pub fn event_name(&self) -> Option<&str> {
        self.t.as_deref()
    }
}

impl std::fmt::Display for GatewayFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.t, self.s) {
            (Some(t), Some(s)) => write!(f, "GatewayFrame(op={}, t={t}, s={s})", self.op),
            (Some(t), None) => write!(f, "GatewayFrame(op={}, t={t})", self.op),
            _ => write!(f, "GatewayFrame(op={})", self.op),
        }
    }
}
