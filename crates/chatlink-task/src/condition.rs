//! Execution conditions and gated tasks

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::future::{TaskFuture, TaskResult};
use crate::task::Task;

/// Predicate plus a way to wait until it may have changed
///
/// `wait` may return spuriously; callers re-check.
#[async_trait]
pub trait Condition: Send + Sync {
    /// Check whether the gated work may run now
    fn check(&self) -> bool;

    /// Suspend until `check` is worth calling again
    async fn wait(&self);
}

#[async_trait]
impl<C: Condition + ?Sized> Condition for Arc<C> {
    fn check(&self) -> bool {
        (**self).check()
    }

    async fn wait(&self) {
        (**self).wait().await;
    }
}

/// A task that only executes once its condition holds
pub struct ConditionedTask<T, C> {
    task: Task<T>,
    condition: C,
}

impl<T, C> ConditionedTask<T, C>
where
    T: Send + 'static,
    C: Condition + 'static,
{
    pub(crate) fn new(task: Task<T>, condition: C) -> Self {
        Self { task, condition }
    }

    #[must_use]
    pub fn future(&self) -> TaskFuture<T> {
        self.task.future()
    }

    /// Wait for the condition, then execute on the current task
    ///
    /// If the future is cancelled while waiting the work never runs and
    /// `ClientError::Cancelled` is returned.
    pub async fn complete_here(self) -> TaskResult<T> {
        let Self { task, condition } = self;
        wait_for_condition(&task.future(), &condition).await;
        task.complete_here().await
    }

    /// Schedule on the runtime; the work starts once the condition holds
    pub fn queue(self) -> TaskFuture<T> {
        let Self { task, condition } = self;
        let future = task.future();
        let handle = future.clone();
        tokio::spawn(async move {
            wait_for_condition(&handle, &condition).await;
            task.run().await;
        });
        future
    }
}

/// Returns early when the future completes first (cancellation)
async fn wait_for_condition<T, C>(future: &TaskFuture<T>, condition: &C)
where
    T: Send + 'static,
    C: Condition,
{
    loop {
        if future.is_done() || condition.check() {
            return;
        }
        tokio::select! {
            () = condition.wait() => {}
            () = future.completed() => {}
        }
    }
}

/// Condition that holds while the gate is open
#[derive(Debug, Default)]
pub struct Gate {
    open: AtomicBool,
    notify: Notify,
}

impl Gate {
    #[must_use]
    pub fn new(open: bool) -> Self {
        Self {
            open: AtomicBool::new(open),
            notify: Notify::new(),
        }
    }

    /// Open the gate and wake every waiter
    pub fn open(&self) {
        self.open.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }

    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Wait until the gate is open
    pub async fn opened(&self) {
        loop {
            let notified = self.notify.notified();
            if self.is_open() {
                return;
            }
            notified.await;
        }
    }
}

#[async_trait]
impl Condition for Gate {
    fn check(&self) -> bool {
        self.is_open()
    }

    async fn wait(&self) {
        self.opened().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatlink_common::ClientError;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test(start_paused = true)]
    async fn test_conditioned_task_waits_for_gate() {
        let gate = Arc::new(Gate::new(false));
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&runs);
        let future = Task::new(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok("ran")
        })
        .with_condition(Arc::clone(&gate))
        .queue();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        assert!(!future.is_done());

        gate.open();
        assert_eq!(future.await.unwrap(), "ran");
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_complete_here_with_open_condition() {
        let result = Task::new(async { Ok(1) })
            .with_condition(Gate::new(true))
            .complete_here()
            .await;
        assert_eq!(result.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_waiting_skips_work() {
        let gate = Arc::new(Gate::new(false));
        let runs = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&runs);
        let conditioned = Task::new(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .with_condition(Arc::clone(&gate));
        let future = conditioned.future();

        let waiter = tokio::spawn(conditioned.complete_here());
        tokio::time::sleep(Duration::from_millis(100)).await;
        future.cancel();

        assert!(matches!(waiter.await.unwrap(), Err(ClientError::Cancelled)));
        gate.open();
        tokio::task::yield_now().await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_gate_close_and_reopen() {
        let gate = Gate::new(true);
        assert!(gate.check());
        gate.close();
        assert!(!gate.check());
        gate.open();
        gate.opened().await;
    }
}
