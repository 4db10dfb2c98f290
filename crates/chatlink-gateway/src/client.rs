//! Gateway client
//!
//! Ties a session to an [`EventRouter`] running on its own dispatch task.

use std::sync::Arc;

use chatlink_common::ClientConfig;
use chatlink_http::RestClient;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::cache::CacheManager;
use crate::error::GatewayResult;
use crate::router::{spawn_dispatcher, EventRouter};
use crate::session::{spawn_session, SessionHandle, SessionOptions};
use crate::transport::{Connector, WsConnector};

/// A running session plus its dispatch task
#[derive(Debug)]
pub struct GatewayClient {
    session: SessionHandle,
    dispatcher: JoinHandle<()>,
    router: Arc<EventRouter>,
}

impl GatewayClient {
    /// Start a session on `connector`, routing events through `router`
    pub fn start(options: SessionOptions, connector: Arc<dyn Connector>, router: EventRouter) -> Self {
        let router = Arc::new(router);
        let (tx, rx) = mpsc::unbounded_channel();
        let dispatcher = spawn_dispatcher(Arc::clone(&router), rx);
        let session = spawn_session(options, connector, tx);

        Self {
            session,
            dispatcher,
            router,
        }
    }

    /// Start a WebSocket session against `url`
    pub fn connect(config: &ClientConfig, url: impl Into<String>, router: EventRouter) -> Self {
        Self::start(SessionOptions::from_config(config, url), Arc::new(WsConnector), router)
    }

    /// Start a WebSocket session, asking the REST API for the gateway URL
    /// unless the configuration pins one
    pub async fn connect_with_rest(
        config: &ClientConfig,
        rest: &RestClient,
        router: EventRouter,
    ) -> GatewayResult<Self> {
        let url = match &config.gateway.url {
            Some(url) => url.clone(),
            None => {
                let gateway = rest.get_gateway_bot().await?;
                tracing::info!(
                    url = %gateway.url,
                    shards = gateway.shards,
                    remaining = gateway.session_start_limit.remaining,
                    "Gateway discovered"
                );
                gateway.url
            }
        };
        Ok(Self::connect(config, url, router))
    }

    pub fn session(&self) -> &SessionHandle {
        &self.session
    }

    pub fn router(&self) -> &Arc<EventRouter> {
        &self.router
    }

    pub fn cache(&self) -> Option<&Arc<CacheManager>> {
        self.router.cache()
    }

    /// Close the session and wait for queued events to be routed
    pub async fn shutdown(self) -> GatewayResult<()> {
        self.session.shutdown();
        self.join().await
    }

    /// Wait for the session to stop on its own
    pub async fn join(self) -> GatewayResult<()> {
        let result = self.session.join().await;
        if let Err(e) = self.dispatcher.await {
            tracing::error!(error = %e, "Dispatch task failed");
        }
        result
    }
}
