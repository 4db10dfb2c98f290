//! # chatlink-http
//!
//! REST layer for the chat platform.
//!
//! Requests are grouped into rate-limit buckets discovered from response
//! headers. Each bucket drains a FIFO queue on its own worker task, and every
//! bucket passes through one shared global limiter. Callers receive a
//! [`TaskFuture`](chatlink_task::TaskFuture) per request.

pub mod client;
pub mod image;
pub mod payloads;
pub mod ratelimit;
pub mod request;
pub mod response;
pub mod route;
pub mod scheduler;
pub mod transport;

#[cfg(test)]
pub(crate) mod mock;

// Re-export commonly used types at crate root
pub use client::RestClient;
pub use image::ImageData;
pub use payloads::{CreateMessage, EditMessage, GatewayBot, ModifyCurrentUser, SessionStartLimit};
pub use request::{FileAttachment, QueuedRequest, RequestBody};
pub use response::{ApiErrorBody, HttpResponse};
pub use route::Route;
pub use scheduler::RequestScheduler;
pub use transport::{HttpTransport, ReqwestTransport};
