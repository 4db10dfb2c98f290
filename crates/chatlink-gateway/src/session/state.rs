//! Session state
//!
//! [`SessionState`] is owned by the session actor. The heartbeat fields live
//! in [`HeartbeatHandle`] so the heartbeat task can read and write them
//! without a round trip through the actor.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::protocol::Resume;

/// Connection lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    Disconnected,
    Connecting,
    Identifying,
    Resuming,
    Connected,
    Reconnecting,
}

impl ConnectionStatus {
    /// A connection is open or being opened
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(
            self,
            Self::Connecting | Self::Identifying | Self::Resuming | Self::Connected
        )
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Identifying => "identifying",
            Self::Resuming => "resuming",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resume token and connection status
#[derive(Debug, Clone)]
pub struct SessionState {
    session_id: Option<String>,
    last_sequence: Option<u64>,
    resume_gateway_url: Option<String>,
    status: ConnectionStatus,
    resume_attempts: u32,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    #[must_use]
    pub fn new() -> Self {
        Self {
            session_id: None,
            last_sequence: None,
            resume_gateway_url: None,
            status: ConnectionStatus::Disconnected,
            resume_attempts: 0,
        }
    }

    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    #[must_use]
    pub fn last_sequence(&self) -> Option<u64> {
        self.last_sequence
    }

    #[must_use]
    pub fn resume_gateway_url(&self) -> Option<&str> {
        self.resume_gateway_url.as_deref()
    }

    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn set_status(&mut self, status: ConnectionStatus) {
        self.status = status;
    }

    #[must_use]
    pub fn resume_attempts(&self) -> u32 {
        self.resume_attempts
    }

    /// Record a dispatch sequence
    ///
    /// Returns `false` for a sequence at or below the current one; such
    /// frames are duplicates or replays and must not be routed.
    pub fn accept_sequence(&mut self, seq: u64) -> bool {
        match self.last_sequence {
            Some(last) if seq <= last => false,
            _ => {
                self.last_sequence = Some(seq);
                true
            }
        }
    }

    /// Store the identifiers from READY
    pub fn on_ready(&mut self, session_id: String, resume_gateway_url: Option<String>) {
        self.session_id = Some(session_id);
        self.resume_gateway_url = resume_gateway_url;
        self.resume_attempts = 0;
        self.status = ConnectionStatus::Connected;
    }

    pub fn on_resumed(&mut self) {
        self.resume_attempts = 0;
        self.status = ConnectionStatus::Connected;
    }

    /// Both halves of the resume token are known
    #[must_use]
    pub fn can_resume(&self) -> bool {
        self.session_id.is_some() && self.last_sequence.is_some()
    }

    /// RESUME payload for this session, if it can be resumed
    #[must_use]
    pub fn resume_payload(&self, token: &str) -> Option<Resume> {
        match (&self.session_id, self.last_sequence) {
            (Some(session_id), Some(seq)) => Some(Resume {
                token: token.to_string(),
                session_id: session_id.clone(),
                seq,
            }),
            _ => None,
        }
    }

    /// Count a resume attempt; `false` once `max` attempts were made
    pub fn try_resume_attempt(&mut self, max: u32) -> bool {
        if self.resume_attempts >= max {
            return false;
        }
        self.resume_attempts += 1;
        true
    }

    /// Forget the session; the next connection identifies from scratch
    pub fn clear_resume(&mut self) {
        self.session_id = None;
        self.last_sequence = None;
        self.resume_gateway_url = None;
        self.resume_attempts = 0;
    }

    /// Move a live connection to `Reconnecting`
    ///
    /// Returns `false` when a reconnect is already under way or the session
    /// is down, so racing triggers collapse into one.
    pub fn begin_reconnect(&mut self) -> bool {
        if !self.status.is_live() {
            return false;
        }
        self.status = ConnectionStatus::Reconnecting;
        true
    }
}

const NO_SEQUENCE: u64 = u64::MAX;

#[derive(Debug)]
struct HeartbeatShared {
    interval_ms: AtomicU64,
    acked: AtomicBool,
    sequence: AtomicU64,
    last_sent: Mutex<Option<Instant>>,
    last_ack: Mutex<Option<Instant>>,
    latency: Mutex<Option<Duration>>,
}

/// Heartbeat fields shared between the actor and the heartbeat task
#[derive(Debug, Clone)]
pub struct HeartbeatHandle {
    inner: Arc<HeartbeatShared>,
}

impl Default for HeartbeatHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl HeartbeatHandle {
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(HeartbeatShared {
                interval_ms: AtomicU64::new(0),
                acked: AtomicBool::new(true),
                sequence: AtomicU64::new(NO_SEQUENCE),
                last_sent: Mutex::new(None),
                last_ack: Mutex::new(None),
                latency: Mutex::new(None),
            }),
        }
    }

    /// Prepare for a new connection
    pub fn reset(&self) {
        self.inner.acked.store(true, Ordering::SeqCst);
        *self.inner.last_sent.lock() = None;
        *self.inner.last_ack.lock() = None;
    }

    pub fn set_interval(&self, interval: Duration) {
        let ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self.inner.interval_ms.store(ms, Ordering::SeqCst);
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.inner.interval_ms.load(Ordering::SeqCst))
    }

    pub fn set_sequence(&self, seq: u64) {
        self.inner.sequence.store(seq, Ordering::SeqCst);
    }

    pub fn clear_sequence(&self) {
        self.inner.sequence.store(NO_SEQUENCE, Ordering::SeqCst);
    }

    /// Sequence carried by the next heartbeat
    #[must_use]
    pub fn sequence(&self) -> Option<u64> {
        match self.inner.sequence.load(Ordering::SeqCst) {
            NO_SEQUENCE => None,
            seq => Some(seq),
        }
    }

    /// Record a heartbeat going out; the ack flag is cleared
    pub fn mark_sent(&self) {
        self.inner.acked.store(false, Ordering::SeqCst);
        *self.inner.last_sent.lock() = Some(Instant::now());
    }

    /// Record an acknowledgement and the round trip it closes
    pub fn ack(&self) {
        let now = Instant::now();
        self.inner.acked.store(true, Ordering::SeqCst);
        *self.inner.last_ack.lock() = Some(now);
        if let Some(sent) = self.last_sent() {
            *self.inner.latency.lock() = Some(now.saturating_duration_since(sent));
        }
    }

    /// The last heartbeat has been acknowledged (or none was sent)
    #[must_use]
    pub fn is_acked(&self) -> bool {
        self.inner.acked.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn last_sent(&self) -> Option<Instant> {
        *self.inner.last_sent.lock()
    }

    #[must_use]
    pub fn last_ack(&self) -> Option<Instant> {
        *self.inner.last_ack.lock()
    }

    /// Round trip of the last acknowledged heartbeat
    #[must_use]
    pub fn latency(&self) -> Option<Duration> {
        *self.inner.latency.lock()
    }
}
