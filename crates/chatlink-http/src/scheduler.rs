//! Rate-limited request scheduler
//!
//! Every bucket key owns a FIFO queue drained by a single worker task. The
//! worker admits requests in submission order: it waits until the bucket and
//! the global limiter have room, takes a slot, and hands the send to a task of
//! its own. A bucket with `remaining = n` therefore has up to `n` requests in
//! flight, while different buckets proceed concurrently. Admission runs as a
//! [`ConditionedTask`] gated on bucket capacity and the global limiter.
//!
//! Outcomes:
//! - 2xx completes the request future with the response
//! - 429 blocks the bucket (or every bucket, for a global limit) and re-queues
//!   the request ahead of anything not yet admitted
//! - 5xx and transport failures re-queue after exponential backoff
//! - any other status completes with `ClientError::Http` immediately
//!
//! Requests queued before their route's bucket is known stay on the default
//! queue. Later requests to the same route follow them there until they
//! finish, so discovery never lets a newer request overtake an older one.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chatlink_common::{Backoff, ClientError, ClientResult, RestConfig};
use chatlink_task::{Condition, ConditionedTask, Task, TaskFuture};
use dashmap::DashMap;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::ratelimit::{
    BucketRegistry, GlobalLimiter, RateLimitHeaders, RateLimitedBody, SharedBucket, DEFAULT_BUCKET,
};
use crate::request::QueuedRequest;
use crate::response::HttpResponse;
use crate::transport::HttpTransport;

/// Fallback delay for a 429 that carries no retry hint
const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Cap on the 5xx/transport backoff relative to its base
const BACKOFF_CAP_FACTOR: u32 = 32;

struct Job {
    request: QueuedRequest,
    future: TaskFuture<HttpResponse>,
    backoff: Backoff,
    rate_limited: u32,
    /// Route key counted in `SchedulerInner::unresolved` until the job finishes
    unresolved: Option<String>,
}

/// What to do with a job after one attempt
enum Next {
    Done(ClientResult<HttpResponse>),
    Retry(Duration),
}

struct BucketQueue {
    id: u64,
    tx: mpsc::UnboundedSender<Job>,
}

struct SchedulerInner {
    transport: Arc<dyn HttpTransport>,
    registry: BucketRegistry,
    global: Arc<GlobalLimiter>,
    queues: DashMap<String, BucketQueue>,
    /// Route key -> unfinished jobs on the default queue
    unresolved: DashMap<String, usize>,
    next_queue_id: AtomicU64,
    config: RestConfig,
}

/// Queues requests per bucket and executes them within the rate limits
#[derive(Clone)]
pub struct RequestScheduler {
    inner: Arc<SchedulerInner>,
}

impl std::fmt::Debug for RequestScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestScheduler")
            .field("buckets", &self.inner.registry.len())
            .field("active_queues", &self.inner.queues.len())
            .finish_non_exhaustive()
    }
}

impl RequestScheduler {
    pub fn new(transport: Arc<dyn HttpTransport>, config: RestConfig) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                transport,
                registry: BucketRegistry::new(config.max_buckets),
                global: Arc::new(GlobalLimiter::new(config.global_requests_per_second)),
                queues: DashMap::new(),
                unresolved: DashMap::new(),
                next_queue_id: AtomicU64::new(0),
                config,
            }),
        }
    }

    /// Queue a request behind earlier requests to the same bucket
    ///
    /// The returned future completes with the response, or with the error
    /// that ended the request. Cancelling it before the request is reached
    /// skips the request entirely.
    pub fn submit(&self, request: QueuedRequest) -> TaskFuture<HttpResponse> {
        let future = TaskFuture::new();
        let route_key = request.route.key();
        let mut key = self.inner.registry.bucket_key(&request.route);
        if key != DEFAULT_BUCKET && self.inner.unresolved.contains_key(&route_key) {
            key = DEFAULT_BUCKET.to_string();
        }

        tracing::debug!(
            request_id = %request.request_id,
            route = %route_key,
            bucket = %key,
            "Request queued"
        );

        let unresolved = (key == DEFAULT_BUCKET).then(|| {
            *self.inner.unresolved.entry(route_key.clone()).or_insert(0) += 1;
            route_key
        });
        let base = self.inner.config.backoff_base();
        let mut job = Job {
            request,
            future: future.clone(),
            backoff: Backoff::new(base, base * BACKOFF_CAP_FACTOR),
            rate_limited: 0,
            unresolved,
        };
        loop {
            let (id, tx) = {
                let queue = self
                    .inner
                    .queues
                    .entry(key.clone())
                    .or_insert_with(|| self.inner.spawn_worker(key.clone()));
                (queue.id, queue.tx.clone())
            };

            match tx.send(job) {
                Ok(()) => break,
                // The worker went idle between lookup and send; start a new one
                Err(mpsc::error::SendError(returned)) => {
                    job = returned;
                    self.inner.queues.remove_if(&key, |_, queue| queue.id == id);
                }
            }
        }
        future
    }

    #[must_use]
    pub fn registry(&self) -> &BucketRegistry {
        &self.inner.registry
    }

    #[must_use]
    pub fn global(&self) -> &GlobalLimiter {
        &self.inner.global
    }

    /// Number of bucket queues with a live worker
    #[must_use]
    pub fn active_queues(&self) -> usize {
        self.inner.queues.len()
    }
}

impl SchedulerInner {
    fn spawn_worker(self: &Arc<Self>, key: String) -> BucketQueue {
        let id = self.next_queue_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(Arc::clone(self).run_worker(key, id, rx));
        BucketQueue { id, tx }
    }

    async fn run_worker(self: Arc<Self>, key: String, id: u64, mut rx: mpsc::UnboundedReceiver<Job>) {
        tracing::debug!(bucket = %key, "Bucket worker started");
        let idle = self.config.worker_idle();
        let (requeue, mut retries) = mpsc::unbounded_channel();
        let mut in_flight = JoinSet::new();
        let mut closed = false;

        loop {
            if closed && in_flight.is_empty() {
                match retries.try_recv() {
                    Ok(job) => {
                        self.dispatch(job, &mut in_flight, &requeue).await;
                        continue;
                    }
                    Err(_) => break,
                }
            }

            let job = tokio::select! {
                biased;
                Some(job) = retries.recv() => job,
                Some(joined) = in_flight.join_next() => {
                    if let Err(err) = joined {
                        tracing::error!(bucket = %key, error = %err, "Request task failed");
                    }
                    continue;
                }
                received = rx.recv(), if !closed => match received {
                    Some(job) => job,
                    None => {
                        closed = true;
                        continue;
                    }
                },
                () = tokio::time::sleep(idle), if !closed && in_flight.is_empty() => {
                    // Unregister first so new submissions start a fresh worker,
                    // then finish whatever was already queued here.
                    self.queues.remove_if(&key, |_, queue| queue.id == id);
                    rx.close();
                    continue;
                }
            };
            self.dispatch(job, &mut in_flight, &requeue).await;
        }

        tracing::debug!(bucket = %key, "Bucket worker stopped");
    }

    /// Admit the job, then hand its send to `in_flight`
    async fn dispatch(
        self: &Arc<Self>,
        mut job: Job,
        in_flight: &mut JoinSet<()>,
        requeue: &mpsc::UnboundedSender<Job>,
    ) {
        if job.future.is_done() {
            tracing::debug!(request_id = %job.request.request_id, "Skipping cancelled request");
            self.release(&mut job);
            return;
        }

        job.request.attempt += 1;
        job.future.set_progress(job.request.attempt);

        match self.admit(&job).await {
            Ok(bucket) => {
                tracing::trace!(
                    request_id = %job.request.request_id,
                    attempt = job.request.attempt,
                    route = %job.request.route,
                    bucket = %bucket.lock().key(),
                    "Sending request"
                );
                in_flight.spawn(Arc::clone(self).send(job, requeue.clone()));
            }
            Err(err) => self.finish(job, Err(err)),
        }
    }

    /// Wait until the request may be sent and take a slot from its bucket
    ///
    /// The bucket is resolved again after every wait, so a request queued
    /// before discovery draws from the discovered bucket.
    async fn admit(self: &Arc<Self>, job: &Job) -> ClientResult<SharedBucket> {
        loop {
            let condition = BucketCondition {
                bucket: self.registry.resolve(&job.request.route),
                global: Arc::clone(&self.global),
                request: job.future.clone(),
            };
            let inner = Arc::clone(self);
            let route = job.request.route.clone();
            let request = job.future.clone();

            let task: ConditionedTask<Option<SharedBucket>, BucketCondition> = Task::new(async move {
                if request.is_done() {
                    return Err(ClientError::Cancelled);
                }
                inner.global.acquire().await;
                let now = Instant::now();
                if inner.global.is_blocked(now) {
                    return Ok(None);
                }
                let bucket = inner.registry.resolve(&route);
                let reserved = bucket.lock().try_reserve(now);
                Ok(reserved.then_some(bucket))
            })
            .with_condition(condition);

            if let Some(bucket) = task.complete_here().await? {
                return Ok(bucket);
            }
        }
    }

    /// Send one attempt, then settle the job or re-queue it
    async fn send(self: Arc<Self>, mut job: Job, requeue: mpsc::UnboundedSender<Job>) {
        let sent = AssertUnwindSafe(self.transport.execute(&job.request))
            .catch_unwind()
            .await;
        let result = sent.unwrap_or_else(|_| {
            Err(ClientError::internal(anyhow::anyhow!("HTTP transport panicked")))
        });

        match self.outcome(&mut job, result) {
            Next::Done(result) => self.finish(job, result),
            Next::Retry(delay) => {
                if !delay.is_zero() {
                    tokio::select! {
                        () = tokio::time::sleep(delay) => {}
                        () = job.future.completed() => {}
                    }
                }
                if let Err(mpsc::error::SendError(job)) = requeue.send(job) {
                    self.finish(
                        job,
                        Err(ClientError::internal(anyhow::anyhow!("bucket worker stopped"))),
                    );
                }
            }
        }
    }

    /// Apply the rate-limit state of one attempt and decide what comes next
    fn outcome(&self, job: &mut Job, result: ClientResult<HttpResponse>) -> Next {
        let request = &job.request;
        let response = match result {
            Ok(response) => response,
            Err(err) if err.is_retryable() => {
                if job.backoff.attempt() >= self.config.max_retries {
                    return Next::Done(Err(err));
                }
                let delay = job.backoff.next_delay();
                tracing::warn!(
                    request_id = %request.request_id,
                    error = %err,
                    delay_ms = delay.as_millis() as u64,
                    "Transport failure, retrying"
                );
                return Next::Retry(delay);
            }
            Err(err) => return Next::Done(Err(err)),
        };

        let now = Instant::now();
        let headers = RateLimitHeaders::parse(&response.headers);
        let bucket = self.registry.update(&request.route, &headers, now);

        match response.status {
            429 => {
                job.rate_limited += 1;
                let body = RateLimitedBody::parse(&response.body);
                let retry_after = body
                    .as_ref()
                    .map(RateLimitedBody::retry_after)
                    .or(headers.retry_after)
                    .unwrap_or(DEFAULT_RETRY_AFTER);
                let global = headers.global || body.is_some_and(|b| b.global);

                if global {
                    tracing::warn!(
                        request_id = %request.request_id,
                        retry_after_ms = retry_after.as_millis() as u64,
                        "Global rate limit hit"
                    );
                    self.global.block_for(retry_after);
                } else {
                    let mut bucket = bucket.lock();
                    tracing::warn!(
                        request_id = %request.request_id,
                        bucket = %bucket.key(),
                        scope = headers.scope.as_deref().unwrap_or("user"),
                        retry_after_ms = retry_after.as_millis() as u64,
                        "Bucket rate limit hit"
                    );
                    bucket.block_for(now, retry_after);
                }

                if job.rate_limited > self.config.max_rate_limit_retries {
                    return Next::Done(Err(ClientError::RateLimitExceeded {
                        route: request.route.key(),
                        attempts: job.rate_limited,
                    }));
                }
                Next::Retry(Duration::ZERO)
            }
            status if status >= 500 => {
                if job.backoff.attempt() >= self.config.max_retries {
                    return Next::Done(Err(response.into_error()));
                }
                let delay = job.backoff.next_delay();
                tracing::warn!(
                    request_id = %request.request_id,
                    status,
                    delay_ms = delay.as_millis() as u64,
                    "Server error, retrying"
                );
                Next::Retry(delay)
            }
            _ if response.is_success() => Next::Done(Ok(response)),
            _ => Next::Done(Err(response.into_error())),
        }
    }

    fn finish(&self, mut job: Job, result: ClientResult<HttpResponse>) {
        self.release(&mut job);
        match &result {
            Ok(response) => tracing::debug!(
                request_id = %job.request.request_id,
                status = response.status,
                attempt = job.request.attempt,
                "Request completed"
            ),
            Err(err) if !err.is_cancelled() => tracing::warn!(
                request_id = %job.request.request_id,
                route = %job.request.route.key(),
                attempt = job.request.attempt,
                error = %err,
                "Request failed"
            ),
            Err(_) => {}
        }

        if !job.future.complete(result) {
            tracing::debug!(request_id = %job.request.request_id, "Discarding result of cancelled request");
        }
    }

    fn release(&self, job: &mut Job) {
        let Some(route) = job.unresolved.take() else {
            return;
        };
        if let Some(mut count) = self.unresolved.get_mut(&route) {
            *count = count.saturating_sub(1);
        }
        self.unresolved.remove_if(&route, |_, count| *count == 0);
    }
}

/// Holds while the bucket has capacity and no global block is active
///
/// Also holds once the request is cancelled, so the gated task can observe it.
struct BucketCondition {
    bucket: SharedBucket,
    global: Arc<GlobalLimiter>,
    request: TaskFuture<HttpResponse>,
}

#[async_trait]
impl Condition for BucketCondition {
    fn check(&self) -> bool {
        if self.request.is_done() {
            return true;
        }
        let now = Instant::now();
        self.bucket.lock().has_capacity(now) && !self.global.is_blocked(now)
    }

    async fn wait(&self) {
        let now = Instant::now();
        let bucket_wait = self.bucket.lock().wait_time(now);
        let delay = bucket_wait
            .max(self.global.blocked_for(now))
            .unwrap_or(Duration::from_millis(5));

        tokio::select! {
            () = tokio::time::sleep(delay) => {}
            () = self.request.completed() => {}
        }
    }
}
