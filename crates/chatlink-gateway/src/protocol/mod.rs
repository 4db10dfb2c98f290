//! Gateway protocol definitions
//!
//! Op codes, close codes, the frame format and the typed payloads.

mod close_codes;
mod frame;
mod opcodes;
mod payloads;

pub use close_codes::{close_action, CloseAction, CloseCode};
pub use frame::GatewayFrame;
pub use opcodes::OpCode;
pub use payloads::{
    Activity, ActivityType, Hello, Identify, IdentifyProperties, Ready, RequestGuildMembers,
    Resume, Status, UpdatePresence,
};
