//! Write-once result handle
//!
//! A `TaskFuture` is completed exactly once. The result goes to exactly one
//! consumer: the registered continuation if there is one, otherwise the first
//! caller that awaits or takes it.

use std::future::IntoFuture;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use chatlink_common::ClientError;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::watch;

/// Result carried by a task future
pub type TaskResult<T> = Result<T, ClientError>;

type Continuation<T> = Box<dyn FnOnce(TaskResult<T>) + Send>;
type CancelHook = Box<dyn FnOnce() + Send>;

enum Slot<T> {
    Pending(Option<Continuation<T>>),
    Ready(TaskResult<T>),
    Consumed,
}

struct Inner<T> {
    slot: Mutex<Slot<T>>,
    done: watch::Sender<bool>,
    progress: AtomicU32,
    cancelled: AtomicBool,
    /// Propagates `cancel` to the future this one was mapped from
    upstream: Mutex<Option<CancelHook>>,
}

/// Asynchronous result handle
pub struct TaskFuture<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for TaskFuture<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> TaskFuture<T> {
    #[must_use]
    pub fn is_done(&self) -> bool {
        *self.inner.done.borrow()
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
    }

    /// Publish a progress value, e.g. the current attempt number
    pub fn set_progress(&self, progress: u32) {
        self.inner.progress.store(progress, Ordering::Release);
    }

    #[must_use]
    pub fn progress(&self) -> u32 {
        self.inner.progress.load(Ordering::Acquire)
    }
}

impl<T> std::fmt::Debug for TaskFuture<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskFuture")
            .field("done", &self.is_done())
            .field("cancelled", &self.is_cancelled())
            .field("progress", &self.progress())
            .finish()
    }
}

impl<T: Send + 'static> Default for TaskFuture<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send + 'static> TaskFuture<T> {
    /// Create a pending future
    #[must_use]
    pub fn new() -> Self {
        let (done, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                slot: Mutex::new(Slot::Pending(None)),
                done,
                progress: AtomicU32::new(0),
                cancelled: AtomicBool::new(false),
                upstream: Mutex::new(None),
            }),
        }
    }

    /// Create a future that is already completed
    #[must_use]
    pub fn ready(result: TaskResult<T>) -> Self {
        let future = Self::new();
        future.complete(result);
        future
    }

    /// Complete the future
    ///
    /// Returns `false` and drops `result` if the future was already completed.
    pub fn complete(&self, result: TaskResult<T>) -> bool {
        let mut slot = self.inner.slot.lock();
        let continuation = match &mut *slot {
            Slot::Pending(continuation) => continuation.take(),
            Slot::Ready(_) | Slot::Consumed => return false,
        };

        match continuation {
            Some(continuation) => {
                *slot = Slot::Consumed;
                drop(slot);
                self.inner.done.send_replace(true);
                continuation(result);
            }
            None => {
                *slot = Slot::Ready(result);
                drop(slot);
                self.inner.done.send_replace(true);
            }
        }
        true
    }

    /// Register the continuation that consumes the result
    ///
    /// Runs immediately if the result is already available. Returns `false`
    /// if a continuation is already registered or the result was consumed.
    pub fn on_complete<F>(&self, continuation: F) -> bool
    where
        F: FnOnce(TaskResult<T>) + Send + 'static,
    {
        let mut slot = self.inner.slot.lock();
        match std::mem::replace(&mut *slot, Slot::Consumed) {
            Slot::Pending(None) => {
                *slot = Slot::Pending(Some(Box::new(continuation)));
                true
            }
            Slot::Pending(Some(existing)) => {
                *slot = Slot::Pending(Some(existing));
                false
            }
            Slot::Ready(result) => {
                drop(slot);
                continuation(result);
                true
            }
            Slot::Consumed => false,
        }
    }

    /// Take the result if it is ready and has not been consumed
    pub fn try_take(&self) -> Option<TaskResult<T>> {
        let mut slot = self.inner.slot.lock();
        match std::mem::replace(&mut *slot, Slot::Consumed) {
            Slot::Ready(result) => Some(result),
            other => {
                *slot = other;
                None
            }
        }
    }

    /// Wait for completion and take the result
    pub async fn wait(self) -> TaskResult<T> {
        self.completed().await;
        self.try_take().unwrap_or_else(|| {
            Err(ClientError::internal(anyhow::anyhow!(
                "task result was already consumed"
            )))
        })
    }

    /// Wait for completion without consuming the result
    pub async fn completed(&self) {
        let mut done = self.inner.done.subscribe();
        // The sender lives in `inner`, so the channel cannot close while we hold `self`
        let _ = done.wait_for(|done| *done).await;
    }

    /// Cancel the future
    ///
    /// A pending future completes with `ClientError::Cancelled`; the cancel is
    /// forwarded to the future this one was mapped from. Returns `false` if
    /// the future had already completed.
    pub fn cancel(&self) -> bool {
        let completed = self.complete(Err(ClientError::Cancelled));
        if completed {
            self.inner.cancelled.store(true, Ordering::Release);
        }
        let upstream = self.inner.upstream.lock().take();
        if let Some(hook) = upstream {
            hook();
        }
        completed
    }

    /// Derive a future whose result is `f` applied to this future's value
    ///
    /// The continuation slot of `self` is used; cancelling the derived future
    /// cancels `self`.
    pub fn map<U, F>(&self, f: F) -> TaskFuture<U>
    where
        U: Send + 'static,
        F: FnOnce(T) -> TaskResult<U> + Send + 'static,
    {
        let mapped = TaskFuture::new();
        let target = mapped.clone();
        let registered = self.on_complete(move |result| {
            target.complete(result.and_then(f));
        });

        if registered {
            let source = self.clone();
            *mapped.inner.upstream.lock() = Some(Box::new(move || {
                source.cancel();
            }));
        } else {
            mapped.complete(Err(ClientError::internal(anyhow::anyhow!(
                "task future already has a consumer"
            ))));
        }
        mapped
    }
}

impl<T: Send + 'static> IntoFuture for TaskFuture<T> {
    type Output = TaskResult<T>;
    type IntoFuture = BoxFuture<'static, TaskResult<T>>;

    fn into_future(self) -> Self::IntoFuture {
        Box::pin(self.wait())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn test_complete_then_await() {
        let future = TaskFuture::new();
        assert!(!future.is_done());
        assert!(future.complete(Ok(7)));
        assert!(future.is_done());
        assert_eq!(future.await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_second_completion_is_ignored() {
        let future = TaskFuture::new();
        assert!(future.complete(Ok(1)));
        assert!(!future.complete(Ok(2)));
        assert!(!future.cancel());
        assert!(!future.is_cancelled());
        assert_eq!(future.wait().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_await_before_completion() {
        let future = TaskFuture::<&'static str>::new();
        let completer = future.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            completer.complete(Ok("done"));
        });
        assert_eq!(future.await.unwrap(), "done");
    }

    #[test]
    fn test_continuation_consumes_result() {
        let calls = Arc::new(AtomicUsize::new(0));
        let future = TaskFuture::new();

        let seen = Arc::clone(&calls);
        assert!(future.on_complete(move |result| {
            assert_eq!(result.unwrap(), 3);
            seen.fetch_add(1, Ordering::SeqCst);
        }));
        assert!(!future.on_complete(|_| {}));

        future.complete(Ok(3));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(future.try_take().is_none());
    }

    #[test]
    fn test_continuation_on_ready_future_runs_immediately() {
        let future = TaskFuture::ready(Ok(5));
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        future.on_complete(move |_| {
            seen.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel() {
        let future = TaskFuture::<u8>::new();
        assert!(future.cancel());
        assert!(future.is_cancelled());
        assert!(matches!(future.wait().await, Err(ClientError::Cancelled)));
    }

    #[tokio::test]
    async fn test_map() {
        let source = TaskFuture::new();
        let mapped = source.map(|n: u32| Ok(n.to_string()));
        source.complete(Ok(12));
        assert_eq!(mapped.await.unwrap(), "12");
    }

    #[tokio::test]
    async fn test_map_propagates_errors_and_cancel() {
        let source = TaskFuture::<u32>::new();
        let mapped = source.map(|n| Ok(n + 1));
        assert!(mapped.cancel());
        assert!(source.is_cancelled());
        assert!(matches!(mapped.wait().await, Err(ClientError::Cancelled)));

        let source = TaskFuture::<u32>::new();
        let mapped = source.map(|n| Ok(n + 1));
        source.complete(Err(ClientError::transport("reset")));
        assert!(matches!(mapped.wait().await, Err(ClientError::Transport(_))));
    }

    #[test]
    fn test_progress() {
        let future = TaskFuture::<()>::new();
        assert_eq!(future.progress(), 0);
        future.set_progress(3);
        assert_eq!(future.clone().progress(), 3);
    }

    #[test]
    fn test_debug_reports_state() {
        let future = TaskFuture::<String>::new();
        future.set_progress(2);
        assert_eq!(
            format!("{future:?}"),
            "TaskFuture { done: false, cancelled: false, progress: 2 }"
        );

        future.cancel();
        assert_eq!(
            format!("{future:?}"),
            "TaskFuture { done: true, cancelled: true, progress: 2 }"
        );
    }

    #[tokio::test]
    async fn test_result_taken_once() {
        let future = TaskFuture::ready(Ok(1));
        let other = future.clone();
        assert_eq!(future.wait().await.unwrap(), 1);
        assert!(matches!(other.wait().await, Err(ClientError::Internal(_))));
    }
}
