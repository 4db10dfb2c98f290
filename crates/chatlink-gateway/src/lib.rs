//! # chatlink-gateway
//!
//! Gateway session for the chat platform: frame codec, session state
//! machine, heartbeat, event routing and record caches.

pub mod cache;
pub mod client;
pub mod codec;
pub mod error;
pub mod events;
pub mod protocol;
pub mod router;
pub mod session;
pub mod transport;

// Re-export commonly used types at crate root
pub use cache::{CacheManager, CacheUpdate};
pub use client::GatewayClient;
pub use codec::{DecodeError, FrameCodec};
pub use error::{GatewayError, GatewayResult};
pub use events::EventType;
pub use protocol::{CloseCode, GatewayFrame, OpCode};
pub use router::{DispatchContext, EventListener, EventRouter};
pub use session::{spawn_session, ConnectionStatus, SessionCommand, SessionHandle, SessionOptions};
pub use transport::{Connector, WsConnector};
