//! tokio-tungstenite connector

use async_trait::async_trait;
use chatlink_common::ClientError;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode as WsCloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;

use super::{Connection, Connector, Outbound, TransportEvent, TransportMessage, TransportSender};

/// Connects over `ws://` or `wss://` (rustls)
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self, url: &str) -> Result<Connection, ClientError> {
        let (socket, _) = tokio_tungstenite::connect_async(url)
            .await
            .map_err(ClientError::transport)?;
        tracing::debug!(url = %url, "WebSocket connected");

        let (mut sink, mut stream) = socket.split();
        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outbound>();
        let (ev_tx, ev_rx) = mpsc::unbounded_channel::<TransportEvent>();

        // Writer: drains outbound messages until a close or a send failure
        tokio::spawn(async move {
            while let Some(outbound) = out_rx.recv().await {
                match outbound {
                    Outbound::Text(text) => {
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            tracing::debug!(error = %e, "WebSocket write failed");
                            break;
                        }
                    }
                    Outbound::Close(code) => {
                        let frame = CloseFrame {
                            code: WsCloseCode::from(code),
                            reason: "".into(),
                        };
                        let _ = sink.send(Message::Close(Some(frame))).await;
                        break;
                    }
                }
            }
            let _ = sink.close().await;
        });

        // Reader: forwards data messages and reports how the stream ended
        tokio::spawn(async move {
            let ended = loop {
                let event = match stream.next().await {
                    Some(Ok(Message::Text(text))) => {
                        TransportEvent::Message(TransportMessage::Text(text))
                    }
                    Some(Ok(Message::Binary(data))) => {
                        TransportEvent::Message(TransportMessage::Binary(data))
                    }
                    Some(Ok(Message::Close(frame))) => {
                        break TransportEvent::Closed {
                            code: frame.as_ref().map(|f| u16::from(f.code)),
                            reason: frame.map(|f| f.reason.into_owned()).unwrap_or_default(),
                        };
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => break TransportEvent::Error(e.to_string()),
                    None => {
                        break TransportEvent::Closed {
                            code: None,
                            reason: "stream ended".to_string(),
                        }
                    }
                };
                if ev_tx.send(event).is_err() {
                    return;
                }
            };
            let _ = ev_tx.send(ended);
        });

        Ok(Connection {
            sender: TransportSender::new(out_tx),
            events: ev_rx,
        })
    }
}
