//! Session actor
//!
//! Connects, identifies or resumes, and then reads frames one at a time.
//! Every reconnect decision is made here, so at most one connection attempt
//! is ever in flight.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use chatlink_common::Backoff;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use rand::Rng;
use serde_json::Value;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use super::heartbeat::spawn_heartbeat;
use super::state::{ConnectionStatus, HeartbeatHandle, SessionState};
use super::{SessionCommand, SessionOptions, SessionSignal};
use crate::codec::FrameCodec;
use crate::error::{GatewayError, GatewayResult};
use crate::events::EventType;
use crate::protocol::{close_action, CloseAction, CloseCode, GatewayFrame, Hello, OpCode, Ready};
use crate::router::DispatchContext;
use crate::transport::{Connection, Connector, TransportEvent, TransportMessage, TransportSender};

/// Close code that ends the session on the server
const NORMAL_CLOSE: u16 = 1000;

/// Close code that keeps the session resumable
const RESUMABLE_CLOSE: u16 = 4000;

/// Bounds of the wait before identifying after a non-resumable INVALID_SESSION
const INVALID_SESSION_WAIT_MS: (u64, u64) = (1_000, 5_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReconnectDelay {
    Immediate,
    Backoff,
    Randomized,
}

#[derive(Debug)]
enum Outcome {
    Shutdown,
    Fatal(GatewayError),
    Reconnect {
        invalidate: bool,
        delay: ReconnectDelay,
    },
}

pub(super) struct SessionActor {
    options: SessionOptions,
    connector: Arc<dyn Connector>,
    state: SessionState,
    heartbeat: HeartbeatHandle,
    heartbeat_task: Option<JoinHandle<()>>,
    codec: FrameCodec,
    limiter: DefaultDirectRateLimiter,
    backoff: Backoff,
    generation: u64,
    commands: mpsc::UnboundedReceiver<SessionCommand>,
    signals: mpsc::UnboundedReceiver<SessionSignal>,
    signal_tx: mpsc::UnboundedSender<SessionSignal>,
    dispatch: mpsc::UnboundedSender<DispatchContext>,
    status: watch::Sender<ConnectionStatus>,
}

impl SessionActor {
    pub(super) fn new(
        options: SessionOptions,
        connector: Arc<dyn Connector>,
        heartbeat: HeartbeatHandle,
        commands: mpsc::UnboundedReceiver<SessionCommand>,
        dispatch: mpsc::UnboundedSender<DispatchContext>,
        status: watch::Sender<ConnectionStatus>,
    ) -> Self {
        let per_minute =
            NonZeroU32::new(options.gateway.outbound_per_minute).unwrap_or(NonZeroU32::MIN);
        let backoff = Backoff::new(
            options.gateway.reconnect_base(),
            options.gateway.reconnect_max(),
        );
        let (signal_tx, signals) = mpsc::unbounded_channel();

        Self {
            options,
            connector,
            state: SessionState::new(),
            heartbeat,
            heartbeat_task: None,
            codec: FrameCodec::new(),
            limiter: RateLimiter::direct(Quota::per_minute(per_minute)),
            backoff,
            generation: 0,
            commands,
            signals,
            signal_tx,
            dispatch,
            status,
        }
    }

    pub(super) async fn run(mut self) -> GatewayResult<()> {
        let result = loop {
            let url = self.next_url();
            self.set_status(ConnectionStatus::Connecting);
            tracing::info!(
                url = %url,
                resume = self.state.can_resume(),
                "Connecting to gateway"
            );

            let connection = match self.connector.connect(&url).await {
                Ok(connection) => connection,
                Err(e) => {
                    let delay = self.backoff.next_delay();
                    tracing::warn!(
                        error = %e,
                        attempt = self.backoff.attempt(),
                        delay_ms = delay.as_millis() as u64,
                        "Gateway connect failed"
                    );
                    self.set_status(ConnectionStatus::Reconnecting);
                    if self.pause(delay).await {
                        break Ok(());
                    }
                    continue;
                }
            };

            self.generation += 1;
            self.codec.reset();
            self.heartbeat.reset();

            let outcome = self.drive(connection).await;
            self.stop_heartbeat();

            match outcome {
                Outcome::Shutdown => break Ok(()),
                Outcome::Fatal(e) => break Err(e),
                Outcome::Reconnect { invalidate, delay } => {
                    if invalidate {
                        self.state.clear_resume();
                        self.heartbeat.clear_sequence();
                        self.set_status(ConnectionStatus::Disconnected);
                    }
                    let wait = match delay {
                        ReconnectDelay::Immediate => Duration::ZERO,
                        ReconnectDelay::Backoff => self.backoff.next_delay(),
                        ReconnectDelay::Randomized => {
                            let (low, high) = INVALID_SESSION_WAIT_MS;
                            Duration::from_millis(rand::thread_rng().gen_range(low..=high))
                        }
                    };
                    tracing::debug!(
                        invalidate,
                        wait_ms = wait.as_millis() as u64,
                        "Reconnecting"
                    );
                    if self.pause(wait).await {
                        break Ok(());
                    }
                }
            }
        };

        self.set_status(ConnectionStatus::Disconnected);
        match &result {
            Ok(()) => tracing::info!(session_id = ?self.state.session_id(), "Session stopped"),
            Err(e) => tracing::error!(error = %e, "Session ended"),
        }
        result
    }

    /// URL for the next connection; gives up on resuming once attempts run out
    fn next_url(&mut self) -> String {
        if self.state.can_resume()
            && !self
                .state
                .try_resume_attempt(self.options.gateway.max_resume_attempts)
        {
            tracing::warn!(
                session_id = ?self.state.session_id(),
                "Resume attempts exhausted, identifying"
            );
            self.state.clear_resume();
            self.heartbeat.clear_sequence();
        }

        let base = if self.state.can_resume() {
            self.state
                .resume_gateway_url()
                .unwrap_or(self.options.url.as_str())
        } else {
            self.options.url.as_str()
        };
        self.options.gateway.connect_url(base)
    }

    /// Sleep between connections; returns `true` if shutdown was requested
    async fn pause(&mut self, delay: Duration) -> bool {
        let sleep = tokio::time::sleep(delay);
        tokio::pin!(sleep);

        loop {
            tokio::select! {
                () = &mut sleep => return false,
                command = self.commands.recv() => match command {
                    None | Some(SessionCommand::Shutdown) => return true,
                    Some(SessionCommand::Reconnect) => {}
                    Some(other) => tracing::warn!(
                        command = other.name(),
                        status = %self.state.status(),
                        "Session not connected, command dropped"
                    ),
                },
            }
        }
    }

    /// Run one connection until it has to be replaced or the session ends
    async fn drive(&mut self, connection: Connection) -> Outcome {
        let Connection { sender, mut events } = connection;

        loop {
            tokio::select! {
                event = events.recv() => {
                    let outcome = match event {
                        Some(TransportEvent::Message(message)) => self.on_message(message, &sender).await,
                        Some(TransportEvent::Closed { code, reason }) => self.on_close(code, reason, &sender),
                        Some(TransportEvent::Error(error)) => {
                            tracing::warn!(error = %error, "Gateway transport error");
                            self.reconnect(&sender, false, ReconnectDelay::Backoff)
                        }
                        None => {
                            tracing::warn!("Gateway transport ended");
                            self.reconnect(&sender, false, ReconnectDelay::Backoff)
                        }
                    };
                    if let Some(outcome) = outcome {
                        return outcome;
                    }
                }
                Some(signal) = self.signals.recv() => {
                    let SessionSignal::Zombied { generation } = signal;
                    if generation != self.generation {
                        tracing::debug!(generation, current = self.generation, "Ignoring signal from an old connection");
                        continue;
                    }
                    if let Some(outcome) = self.reconnect(&sender, false, ReconnectDelay::Backoff) {
                        return outcome;
                    }
                }
                command = self.commands.recv() => {
                    if let Some(outcome) = self.on_command(command, &sender).await {
                        return outcome;
                    }
                }
            }
        }
    }

    async fn on_message(&mut self, message: TransportMessage, sender: &TransportSender) -> Option<Outcome> {
        match self.codec.decode(message) {
            Ok(Some(frame)) => self.on_frame(frame, sender).await,
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, "Discarding undecodable frame");
                None
            }
        }
    }

    async fn on_frame(&mut self, frame: GatewayFrame, sender: &TransportSender) -> Option<Outcome> {
        tracing::trace!(op = %frame.op, seq = ?frame.s, event = ?frame.t, "Frame received");

        match frame.op {
            OpCode::Hello => self.on_hello(&frame, sender).await,
            OpCode::Dispatch => {
                self.on_dispatch(frame);
                None
            }
            OpCode::HeartbeatAck => {
                self.heartbeat.ack();
                tracing::trace!(latency = ?self.heartbeat.latency(), "Heartbeat acknowledged");
                None
            }
            OpCode::Heartbeat => {
                self.send_heartbeat(sender);
                None
            }
            OpCode::Reconnect => {
                tracing::info!("Server requested reconnect");
                self.reconnect(sender, false, ReconnectDelay::Immediate)
            }
            OpCode::InvalidSession => {
                let resumable = frame.d.as_bool().unwrap_or(false);
                tracing::warn!(
                    resumable,
                    session_id = ?self.state.session_id(),
                    "Session invalidated"
                );
                if resumable {
                    self.reconnect(sender, false, ReconnectDelay::Backoff)
                } else {
                    self.reconnect(sender, true, ReconnectDelay::Randomized)
                }
            }
            op => {
                tracing::debug!(op = %op, "Ignoring unexpected opcode");
                None
            }
        }
    }

    async fn on_hello(&mut self, frame: &GatewayFrame, sender: &TransportSender) -> Option<Outcome> {
        let hello = match frame.data_as::<Hello>() {
            Ok(hello) if hello.heartbeat_interval > 0 => hello,
            Ok(_) => {
                tracing::warn!("HELLO with a zero heartbeat interval");
                return self.reconnect(sender, false, ReconnectDelay::Backoff);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Malformed HELLO");
                return self.reconnect(sender, false, ReconnectDelay::Backoff);
            }
        };

        self.heartbeat
            .set_interval(Duration::from_millis(hello.heartbeat_interval));
        self.stop_heartbeat();
        self.heartbeat_task = Some(spawn_heartbeat(
            self.heartbeat.clone(),
            sender.clone(),
            self.signal_tx.clone(),
            self.generation,
        ));

        let frame = if let Some(resume) = self.state.resume_payload(&self.options.token) {
            self.set_status(ConnectionStatus::Resuming);
            tracing::info!(session_id = %resume.session_id, seq = resume.seq, "Resuming session");
            GatewayFrame::resume(&resume)
        } else {
            self.set_status(ConnectionStatus::Identifying);
            tracing::info!(
                intents = self.options.gateway.intents.bits(),
                shard = ?self.options.gateway.shard,
                "Identifying"
            );
            GatewayFrame::identify(&self.options.identify())
        };

        match frame {
            Ok(frame) => {
                self.send_limited(sender, &frame).await;
                None
            }
            Err(e) => Some(Outcome::Fatal(GatewayError::Encode(e))),
        }
    }

    fn on_dispatch(&mut self, frame: GatewayFrame) {
        let GatewayFrame { s, t, d, .. } = frame;
        let Some(event) = t else {
            tracing::warn!(seq = ?s, "Dispatch without an event name");
            return;
        };

        if let Some(seq) = s {
            if !self.state.accept_sequence(seq) {
                tracing::debug!(
                    event = %event,
                    seq,
                    last = ?self.state.last_sequence(),
                    "Dropping stale dispatch"
                );
                return;
            }
            self.heartbeat.set_sequence(seq);
        }

        match EventType::from_name(&event) {
            Some(EventType::Ready) => self.on_ready(&d),
            Some(EventType::Resumed) => {
                self.state.on_resumed();
                self.backoff.reset();
                self.publish_status();
                tracing::info!(
                    session_id = ?self.state.session_id(),
                    seq = ?self.state.last_sequence(),
                    "Session resumed"
                );
            }
            _ => {}
        }

        if self.dispatch.send(DispatchContext::new(event, s, d)).is_err() {
            tracing::trace!(seq = ?s, "No dispatcher attached, event dropped");
        }
    }

    fn on_ready(&mut self, data: &Value) {
        match serde_json::from_value::<Ready>(data.clone()) {
            Ok(ready) => {
                tracing::info!(
                    session_id = %ready.session_id,
                    user = %ready.user.username,
                    guilds = ready.guilds.len(),
                    "Session ready"
                );
                self.state.on_ready(ready.session_id, ready.resume_gateway_url);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Malformed READY, session cannot be resumed");
                self.state.set_status(ConnectionStatus::Connected);
            }
        }
        self.backoff.reset();
        self.publish_status();
    }

    fn on_close(&mut self, code: Option<u16>, reason: String, sender: &TransportSender) -> Option<Outcome> {
        match close_action(code) {
            CloseAction::Fatal => {
                let code = code.unwrap_or_default();
                let reason = if reason.is_empty() {
                    CloseCode::from_u16(code)
                        .map(|c| c.description().to_string())
                        .unwrap_or_default()
                } else {
                    reason
                };
                tracing::error!(code, reason = %reason, "Gateway closed with a fatal code");
                Some(Outcome::Fatal(GatewayError::FatalClose { code, reason }))
            }
            CloseAction::Reidentify => {
                tracing::warn!(code = ?code, reason = %reason, "Gateway closed, session invalidated");
                self.reconnect(sender, true, ReconnectDelay::Backoff)
            }
            CloseAction::Resume => {
                tracing::info!(code = ?code, reason = %reason, "Gateway closed");
                self.reconnect(sender, false, ReconnectDelay::Backoff)
            }
        }
    }

    async fn on_command(
        &mut self,
        command: Option<SessionCommand>,
        sender: &TransportSender,
    ) -> Option<Outcome> {
        let command = match command {
            None | Some(SessionCommand::Shutdown) => {
                tracing::info!("Shutting down session");
                sender.close(NORMAL_CLOSE);
                return Some(Outcome::Shutdown);
            }
            Some(SessionCommand::Reconnect) => {
                tracing::info!("Reconnect requested");
                return self.reconnect(sender, false, ReconnectDelay::Immediate);
            }
            Some(command) => command,
        };

        if self.state.status() != ConnectionStatus::Connected {
            tracing::warn!(
                command = command.name(),
                status = %self.state.status(),
                "Session not connected, command dropped"
            );
            return None;
        }

        let frame = match &command {
            SessionCommand::UpdatePresence(presence) => GatewayFrame::presence_update(presence),
            SessionCommand::RequestGuildMembers(request) => GatewayFrame::request_guild_members(request),
            SessionCommand::Reconnect | SessionCommand::Shutdown => return None,
        };
        match frame {
            Ok(frame) => self.send_limited(sender, &frame).await,
            Err(e) => tracing::warn!(command = command.name(), error = %e, "Failed to encode command"),
        }
        None
    }

    /// Leave a live connection
    ///
    /// Returns `None` when a reconnect is already under way.
    fn reconnect(
        &mut self,
        sender: &TransportSender,
        invalidate: bool,
        delay: ReconnectDelay,
    ) -> Option<Outcome> {
        if !self.state.begin_reconnect() {
            tracing::debug!(status = %self.state.status(), "Reconnect already in progress");
            return None;
        }
        self.publish_status();
        sender.close(if invalidate { NORMAL_CLOSE } else { RESUMABLE_CLOSE });
        Some(Outcome::Reconnect { invalidate, delay })
    }

    /// Answer a server heartbeat request; not counted against the send limit
    fn send_heartbeat(&self, sender: &TransportSender) {
        let frame = GatewayFrame::heartbeat(self.heartbeat.sequence());
        match FrameCodec::encode(&frame) {
            Ok(text) => {
                if let Err(e) = sender.send_text(text) {
                    tracing::debug!(error = %e, "Heartbeat not sent");
                }
            }
            Err(e) => tracing::error!(error = %e, "Failed to encode heartbeat"),
        }
    }

    async fn send_limited(&self, sender: &TransportSender, frame: &GatewayFrame) {
        self.limiter.until_ready().await;
        match FrameCodec::encode(frame) {
            Ok(text) => {
                if let Err(e) = sender.send_text(text) {
                    tracing::debug!(op = %frame.op, error = %e, "Frame not sent");
                }
            }
            Err(e) => tracing::error!(op = %frame.op, error = %e, "Failed to encode frame"),
        }
    }

    fn stop_heartbeat(&mut self) {
        if let Some(task) = self.heartbeat_task.take() {
            task.abort();
        }
    }

    fn set_status(&mut self, status: ConnectionStatus) {
        self.state.set_status(status);
        self.publish_status();
    }

    fn publish_status(&self) {
        self.status.send_replace(self.state.status());
    }
}
