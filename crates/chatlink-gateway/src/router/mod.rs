//! Dispatch routing

mod context;
mod listener;

pub use context::DispatchContext;
pub use listener::{spawn_dispatcher, EventListener, EventRouter, ListenerResult};
