//! # chatlink-common
//!
//! Shared utilities: client configuration, the client-facing error taxonomy,
//! retry backoff and tracing setup.

pub mod backoff;
pub mod config;
pub mod error;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use backoff::Backoff;
pub use config::{CacheConfig, ClientConfig, ConfigError, Environment, GatewayConfig, RestConfig};
pub use error::{ClientError, ClientResult};
pub use telemetry::{try_init_tracing, try_init_tracing_with_config, TracingConfig, TracingError};
