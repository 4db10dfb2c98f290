//! Dispatch events

mod event_types;

pub use event_types::EventType;
