//! WebSocket transport
//!
//! A connection is a pair of channels: the session writes [`Outbound`]
//! messages and reads [`TransportEvent`]s. Reader and writer tasks own the
//! socket halves, so the heartbeat can write without waiting on the session.

mod ws;

pub use ws::WsConnector;

use async_trait::async_trait;
use chatlink_common::ClientError;
use tokio::sync::mpsc;

/// Data message received from the socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportMessage {
    Text(String),
    Binary(Vec<u8>),
}

/// Everything the reader task reports
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Message(TransportMessage),
    /// The peer closed the connection (or the stream ended)
    Closed { code: Option<u16>, reason: String },
    /// Socket error; the connection is unusable
    Error(String),
}

/// Message for the writer task
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    /// Send a close frame and stop writing
    Close(u16),
}

/// Sending half of a connection, cheap to clone
#[derive(Debug, Clone)]
pub struct TransportSender {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl TransportSender {
    #[must_use]
    pub fn new(tx: mpsc::UnboundedSender<Outbound>) -> Self {
        Self { tx }
    }

    /// Queue a text message; fails once the writer has stopped
    pub fn send_text(&self, text: String) -> Result<(), ClientError> {
        self.tx
            .send(Outbound::Text(text))
            .map_err(|_| ClientError::transport("connection writer has stopped"))
    }

    /// Ask the writer to close the socket; a no-op if already closed
    pub fn close(&self, code: u16) {
        let _ = self.tx.send(Outbound::Close(code));
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// An open gateway connection
#[derive(Debug)]
pub struct Connection {
    pub sender: TransportSender,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Opens gateway connections
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Connection, ClientError>;
}
