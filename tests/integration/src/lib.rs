//! Integration test utilities for chatlink
//!
//! Spins up in-process mock servers for the WebSocket gateway and the REST
//! API, so the real transports can be driven end to end.

pub mod fixtures;
pub mod helpers;

pub use fixtures::*;
pub use helpers::*;
