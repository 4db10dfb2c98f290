//! Record caches fed by dispatch events

mod manager;
mod update;

pub use manager::{CacheManager, CacheStats};
pub use update::{CacheError, CacheKind, CacheUpdate};
