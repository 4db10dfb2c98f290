//! Gateway session
//!
//! One actor task owns the [`SessionState`] and the connection. Callers talk
//! to it through a [`SessionHandle`]; the heartbeat task reports back with
//! [`SessionSignal`]s.

mod actor;
mod heartbeat;
mod state;

pub use state::{ConnectionStatus, HeartbeatHandle, SessionState};

use std::sync::Arc;
use std::time::Duration;

use chatlink_common::{ClientConfig, ClientError, GatewayConfig};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::error::{GatewayError, GatewayResult};
use crate::protocol::{Identify, IdentifyProperties, RequestGuildMembers, UpdatePresence};
use crate::router::DispatchContext;
use crate::transport::Connector;
use actor::SessionActor;

/// Requests from the handle to the session actor
#[derive(Debug, Clone)]
pub enum SessionCommand {
    UpdatePresence(UpdatePresence),
    RequestGuildMembers(RequestGuildMembers),
    /// Drop the connection and resume on a new one
    Reconnect,
    /// Close with 1000 and stop
    Shutdown,
}

impl SessionCommand {
    fn name(&self) -> &'static str {
        match self {
            Self::UpdatePresence(_) => "update_presence",
            Self::RequestGuildMembers(_) => "request_guild_members",
            Self::Reconnect => "reconnect",
            Self::Shutdown => "shutdown",
        }
    }
}

/// Reports from helper tasks, tagged with the connection they belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionSignal {
    /// A heartbeat went unacknowledged
    Zombied { generation: u64 },
}

/// Everything needed to open and identify a session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub token: String,
    /// Gateway base URL, without query parameters
    pub url: String,
    pub gateway: GatewayConfig,
    pub properties: IdentifyProperties,
    /// Presence sent with IDENTIFY
    pub presence: Option<UpdatePresence>,
}

impl SessionOptions {
    pub fn new(token: impl Into<String>, url: impl Into<String>, gateway: GatewayConfig) -> Self {
        Self {
            token: token.into(),
            url: url.into(),
            gateway,
            properties: IdentifyProperties::default(),
            presence: None,
        }
    }

    pub fn from_config(config: &ClientConfig, url: impl Into<String>) -> Self {
        Self::new(config.token.clone(), url, config.gateway.clone())
    }

    pub fn with_presence(mut self, presence: UpdatePresence) -> Self {
        self.presence = Some(presence);
        self
    }

    fn identify(&self) -> Identify {
        Identify {
            token: self.token.clone(),
            properties: self.properties.clone(),
            compress: false,
            large_threshold: self.gateway.large_threshold,
            shard: self.gateway.shard,
            presence: self.presence.clone(),
            intents: self.gateway.intents,
        }
    }
}

/// Start a session actor
///
/// Accepted dispatch events are sent to `dispatch` in frame order.
pub fn spawn_session(
    options: SessionOptions,
    connector: Arc<dyn Connector>,
    dispatch: mpsc::UnboundedSender<DispatchContext>,
) -> SessionHandle {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (status_tx, status_rx) = watch::channel(ConnectionStatus::Disconnected);
    let heartbeat = HeartbeatHandle::new();

    let actor = SessionActor::new(
        options,
        connector,
        heartbeat.clone(),
        command_rx,
        dispatch,
        status_tx,
    );
    let task = tokio::spawn(actor.run());

    SessionHandle {
        commands: command_tx,
        status: status_rx,
        heartbeat,
        task,
    }
}

/// Control surface of a running session
///
/// Dropping every handle shuts the session down.
#[derive(Debug)]
pub struct SessionHandle {
    commands: mpsc::UnboundedSender<SessionCommand>,
    status: watch::Receiver<ConnectionStatus>,
    heartbeat: HeartbeatHandle,
    task: JoinHandle<GatewayResult<()>>,
}

impl SessionHandle {
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Watch status transitions
    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.clone()
    }

    /// Round trip of the last acknowledged heartbeat
    #[must_use]
    pub fn latency(&self) -> Option<Duration> {
        self.heartbeat.latency()
    }

    pub fn update_presence(&self, presence: UpdatePresence) -> GatewayResult<()> {
        self.send(SessionCommand::UpdatePresence(presence))
    }

    pub fn request_guild_members(&self, request: RequestGuildMembers) -> GatewayResult<()> {
        self.send(SessionCommand::RequestGuildMembers(request))
    }

    pub fn reconnect(&self) -> GatewayResult<()> {
        self.send(SessionCommand::Reconnect)
    }

    /// Ask the session to close; a no-op if it already stopped
    pub fn shutdown(&self) {
        let _ = self.commands.send(SessionCommand::Shutdown);
    }

    /// Wait until the session is connected
    pub async fn wait_ready(&self) -> GatewayResult<()> {
        let mut status = self.status.clone();
        status
            .wait_for(|status| *status == ConnectionStatus::Connected)
            .await
            .map(|_| ())
            .map_err(|_| GatewayError::SessionStopped)
    }

    /// Wait until the session task has stopped, without consuming the handle
    pub async fn stopped(&self) {
        let mut status = self.status.clone();
        while status.changed().await.is_ok() {}
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the session to stop
    ///
    /// Returns the fatal error that ended it, if any.
    pub async fn join(self) -> GatewayResult<()> {
        let Self { commands, task, .. } = self;
        let result = task.await;
        drop(commands);
        result.map_err(|e| GatewayError::Client(ClientError::internal(e)))?
    }

    fn send(&self, command: SessionCommand) -> GatewayResult<()> {
        self.commands
            .send(command)
            .map_err(|_| GatewayError::SessionStopped)
    }
}
