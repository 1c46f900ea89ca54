//! WebSocket connection to the leader's order-event feed.
//!
//! A thin wrapper: connect, read text frames, parse as JSON. Reconnection,
//! heartbeat tracking, and gap handling live in [`crate::stream`] — this
//! module only owns the socket.

use crate::errors::{ReplicationError, Result};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;

/// An open connection to the leader order-event stream.
pub struct BrokerEventStream {
    socket: tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>,
}

impl BrokerEventStream {
    pub async fn connect(url: &str, access_token: &str) -> Result<Self> {
        let request = format!("{url}?token={access_token}");
        let (socket, _response) = tokio_tungstenite::connect_async(request)
            .await
            .map_err(|e| ReplicationError::stream(format!("websocket connect failed: {e}")))?;
        Ok(Self { socket })
    }

    /// Read the next event payload, or `Ok(None)` on a clean stream close.
    pub async fn next_event(&mut self) -> Result<Option<Value>> {
        loop {
            match self.socket.next().await {
                Some(Ok(Message::Text(text))) => {
                    let value: Value = serde_json::from_str(&text)
                        .map_err(|e| ReplicationError::stream(format!("malformed event payload: {e}")))?;
                    return Ok(Some(value));
                }
                Some(Ok(Message::Ping(payload))) => {
                    self.socket
                        .send(Message::Pong(payload))
                        .await
                        .map_err(|e| ReplicationError::stream(format!("pong failed: {e}")))?;
                }
                Some(Ok(Message::Close(_))) | None => return Ok(None),
                Some(Ok(_)) => continue,
                Some(Err(e)) => return Err(ReplicationError::stream(format!("websocket read failed: {e}"))),
            }
        }
    }

    pub async fn close(&mut self) -> Result<()> {
        self.socket
            .close(None)
            .await
            .map_err(|e| ReplicationError::stream(format!("websocket close failed: {e}")))
    }
}
