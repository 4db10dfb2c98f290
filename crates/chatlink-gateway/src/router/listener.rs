//! Event router
//!
//! Listeners are registered per event name before the session starts and
//! run in registration order, named listeners first, then catch-all ones.
//! A failing or panicking listener is logged and the rest still run.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::DispatchContext;
use crate::cache::{CacheManager, CacheUpdate};

/// Result of a listener invocation
pub type ListenerResult = anyhow::Result<()>;

/// Asynchronous event listener
#[async_trait]
pub trait EventListener: Send + Sync {
    async fn on_event(&self, ctx: &DispatchContext) -> ListenerResult;
}

type SyncListener = Box<dyn Fn(&DispatchContext) -> ListenerResult + Send + Sync>;

enum Listener {
    Sync(SyncListener),
    Async(Arc<dyn EventListener>),
}

impl Listener {
    async fn invoke(&self, ctx: &DispatchContext) -> Result<ListenerResult, ()> {
        match self {
            Self::Sync(f) => std::panic::catch_unwind(AssertUnwindSafe(|| f(ctx))).map_err(|_| ()),
            Self::Async(listener) => AssertUnwindSafe(listener.on_event(ctx))
                .catch_unwind()
                .await
                .map_err(|_| ()),
        }
    }
}

/// Routes dispatch events to listeners
#[derive(Default)]
pub struct EventRouter {
    listeners: HashMap<String, Vec<Listener>>,
    catch_all: Vec<Listener>,
    cache: Option<Arc<CacheManager>>,
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRouter")
            .field("events", &self.listeners.len())
            .field("catch_all", &self.catch_all.len())
            .field("cache", &self.cache.is_some())
            .finish()
    }
}

impl EventRouter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply every event to `cache` before listeners see it
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<CacheManager>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn cache(&self) -> Option<&Arc<CacheManager>> {
        self.cache.as_ref()
    }

    /// Register a closure for one event
    pub fn on<F>(&mut self, event: impl Into<String>, listener: F) -> &mut Self
    where
        F: Fn(&DispatchContext) -> ListenerResult + Send + Sync + 'static,
    {
        self.listeners
            .entry(event.into())
            .or_default()
            .push(Listener::Sync(Box::new(listener)));
        self
    }

    /// Register an async listener for one event
    pub fn on_event(&mut self, event: impl Into<String>, listener: Arc<dyn EventListener>) -> &mut Self {
        self.listeners
            .entry(event.into())
            .or_default()
            .push(Listener::Async(listener));
        self
    }

    /// Register a closure for every event
    pub fn on_any<F>(&mut self, listener: F) -> &mut Self
    where
        F: Fn(&DispatchContext) -> ListenerResult + Send + Sync + 'static,
    {
        self.catch_all.push(Listener::Sync(Box::new(listener)));
        self
    }

    /// Register an async listener for every event
    pub fn on_any_event(&mut self, listener: Arc<dyn EventListener>) -> &mut Self {
        self.catch_all.push(Listener::Async(listener));
        self
    }

    /// Number of listeners that would receive `event`
    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners.get(event).map_or(0, Vec::len) + self.catch_all.len()
    }

    /// Update the cache, then run the listeners for one event
    ///
    /// Returns how many listeners completed successfully.
    pub async fn route(&self, ctx: &DispatchContext) -> usize {
        if let Some(cache) = &self.cache {
            match cache.apply(ctx) {
                Ok(CacheUpdate::Ignored) => {}
                Ok(update) => tracing::trace!(event = %ctx.event(), ?update, "Cache updated"),
                Err(e) => tracing::warn!(
                    event = %ctx.event(),
                    seq = ?ctx.sequence(),
                    error = %e,
                    "Cache update skipped"
                ),
            }
        }

        let named = self.listeners.get(ctx.event()).into_iter().flatten();
        let mut succeeded = 0;
        for (index, listener) in named.chain(self.catch_all.iter()).enumerate() {
            match listener.invoke(ctx).await {
                Ok(Ok(())) => succeeded += 1,
                Ok(Err(e)) => tracing::warn!(
                    event = %ctx.event(),
                    seq = ?ctx.sequence(),
                    listener = index,
                    error = %e,
                    "Listener failed"
                ),
                Err(()) => tracing::error!(
                    event = %ctx.event(),
                    seq = ?ctx.sequence(),
                    listener = index,
                    "Listener panicked"
                ),
            }
        }
        succeeded
    }
}

/// Run the router on its own task, fed in frame order
pub fn spawn_dispatcher(
    router: Arc<EventRouter>,
    mut events: mpsc::UnboundedReceiver<DispatchContext>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(ctx) = events.recv().await {
            router.route(&ctx).await;
        }
        tracing::debug!("Dispatch task finished");
    })
}
