//! Schedulable unit of work

use std::future::Future;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::condition::{Condition, ConditionedTask};
use crate::future::{TaskFuture, TaskResult};

/// A unit of work that completes a [`TaskFuture`]
pub struct Task<T> {
    future: TaskFuture<T>,
    work: BoxFuture<'static, TaskResult<T>>,
}

impl<T: Send + 'static> Task<T> {
    /// Wrap `work`; nothing runs until the task is queued or completed here
    pub fn new<F>(work: F) -> Self
    where
        F: Future<Output = TaskResult<T>> + Send + 'static,
    {
        Self {
            future: TaskFuture::new(),
            work: work.boxed(),
        }
    }

    /// Handle to the result of this task
    #[must_use]
    pub fn future(&self) -> TaskFuture<T> {
        self.future.clone()
    }

    /// Schedule the work on the runtime
    pub fn queue(self) -> TaskFuture<T> {
        self.consume_and_queue(|_| {})
    }

    /// Hand the future to `on_create`, then schedule the work
    ///
    /// `on_create` always runs before the work can start, so a caller may
    /// register a continuation or store the handle without racing completion.
    pub fn consume_and_queue<F>(self, on_create: F) -> TaskFuture<T>
    where
        F: FnOnce(&TaskFuture<T>),
    {
        on_create(&self.future);
        let future = self.future.clone();
        tokio::spawn(self.run());
        future
    }

    /// Run the work on the current task and return its result
    pub async fn complete_here(self) -> TaskResult<T> {
        let future = self.future.clone();
        self.run().await;
        future.wait().await
    }

    /// Gate this task on `condition`
    pub fn with_condition<C: Condition + 'static>(self, condition: C) -> ConditionedTask<T, C> {
        ConditionedTask::new(self, condition)
    }

    pub(crate) async fn run(self) {
        if self.future.is_done() {
            tracing::trace!("skipping task completed before it ran");
            return;
        }
        let result = self.work.await;
        if !self.future.complete(result) {
            tracing::debug!("discarding result of a task cancelled while running");
        }
    }
}
