//! Rate-limit bookkeeping: buckets, their registry, and the global limiter

mod bucket;
mod global;
pub mod headers;
mod registry;

pub use bucket::RateLimitBucket;
pub use global::GlobalLimiter;
pub use headers::{RateLimitHeaders, RateLimitedBody};
pub use registry::{BucketRegistry, SharedBucket, DEFAULT_BUCKET};
