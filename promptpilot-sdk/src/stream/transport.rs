use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::PilotError;

/// One open, text-framed, bidirectional connection
#[async_trait]
pub trait StreamTransport: Send {
    async fn send_text(&mut self, text: String) -> Result<(), PilotError>;

    /// Next text frame; `None` once the peer has closed.
    ///
    /// Must be cancel-safe: the controller polls it inside `select!`.
    async fn next_text(&mut self) -> Option<Result<String, PilotError>>;

    async fn close(&mut self) -> Result<(), PilotError>;
}

/// Opens transports; the URL already carries the auth token
#[async_trait]
pub trait StreamConnector: Send + Sync {
    async fn connect(&self, url: &Url) -> Result<Box<dyn StreamTransport>, PilotError>;
}

/// WebSocket connector backed by tokio-tungstenite
#[derive(Debug, Default, Clone)]
pub struct WsConnector;

#[async_trait]
impl StreamConnector for WsConnector {
    async fn connect(&self, url: &Url) -> Result<Box<dyn StreamTransport>, PilotError> {
        let (ws, _response) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| PilotError::connection(format!("WebSocket connect failed: {e}")))?;

        tracing::info!(host = url.host_str().unwrap_or("unknown"), "WebSocket connected");
        Ok(Box::new(WsTransport { ws }))
    }
}

struct WsTransport {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl StreamTransport for WsTransport {
    async fn send_text(&mut self, text: String) -> Result<(), PilotError> {
        self.ws
            .send(Message::Text(text.into()))
            .await
            .map_err(|e| PilotError::connection(format!("WebSocket send failed: {e}")))
    }

    async fn next_text(&mut self) -> Option<Result<String, PilotError>> {
        // Pings are answered by tungstenite itself while reading
        while let Some(msg) = self.ws.next().await {
            match msg {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(Message::Binary(data)) => {
                    return Some(Ok(String::from_utf8_lossy(&data).into_owned()))
                }
                Ok(Message::Close(frame)) => {
                    tracing::debug!(?frame, "WebSocket close frame received");
                    return None;
                }
                Ok(_) => continue,
                Err(e) => {
                    return Some(Err(PilotError::connection(format!(
                        "WebSocket read error: {e}"
                    ))))
                }
            }
        }
        None
    }

    async fn close(&mut self) -> Result<(), PilotError> {
        match self.ws.close(None).await {
            Ok(()) => Ok(()),
            // Already closed by either side
            Err(tokio_tungstenite::tungstenite::Error::ConnectionClosed)
            | Err(tokio_tungstenite::tungstenite::Error::AlreadyClosed) => Ok(()),
            Err(e) => Err(PilotError::connection(format!("WebSocket close failed: {e}"))),
        }
    }
}
