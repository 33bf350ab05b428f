//! WebSocket links via `tokio-tungstenite`.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, instrument, trace};
use url::Url;

use crate::error::TransportError;
use crate::{Connector, Link, LinkMessage, TransportResult};

/// Connects to `ws://` and `wss://` endpoints.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    #[instrument(name = "websocket_connect", skip(self), fields(endpoint = %endpoint))]
    async fn connect(&self, endpoint: &Url) -> TransportResult<Box<dyn Link>> {
        let (stream, response) = connect_async(endpoint.as_str())
            .await
            .map_err(|e| TransportError::ConnectionFailed(e.to_string()))?;

        debug!(status = %response.status(), "WebSocket handshake complete");

        Ok(Box::new(WebSocketLink { stream }))
    }

    fn name(&self) -> &'static str {
        "websocket"
    }
}

struct WebSocketLink {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl Link for WebSocketLink {
    async fn send(&mut self, payload: Bytes) -> TransportResult<()> {
        self.stream.send(Message::Binary(payload.to_vec())).await?;
        Ok(())
    }

    async fn recv(&mut self) -> Option<TransportResult<LinkMessage>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(LinkMessage::Text(text))),
                Ok(Message::Binary(data)) => return Some(Ok(LinkMessage::Binary(Bytes::from(data)))),
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "Remote sent close");
                    return None;
                }
                // Pongs are queued by tungstenite itself.
                Ok(message) => trace!(len = message.len(), "Control frame"),
                Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => return None,
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) -> TransportResult<()> {
        match self.stream.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed | WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
