//! # chatlink-task
//!
//! Asynchronous work units used by every component that issues REST calls.
//!
//! - [`TaskFuture`]: write-once result cell with a progress counter and a
//!   single continuation
//! - [`Task`]: a unit of work that completes a `TaskFuture`
//! - [`ConditionedTask`]: a task gated on a [`Condition`]
//! - [`Gate`]: an open/closed condition

mod condition;
mod future;
mod task;

pub use condition::{Condition, ConditionedTask, Gate};
pub use future::{TaskFuture, TaskResult};
pub use task::Task;
