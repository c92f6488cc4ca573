//! WebSocket transport backed by `tokio-tungstenite`.
//!
//! [`WebSocketConnector`] is what [`MusicAssistantClient::new`] uses to open a
//! fresh [`WebSocketTransport`] on every (re)connect. Both `ws://` and `wss://`
//! endpoints work; TLS is handled by
//! [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream).
//!
//! Only available with the `transport-websocket` feature (on by default).
//!
//! [`MusicAssistantClient::new`]: crate::MusicAssistantClient::new

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{debug, info, warn};

use crate::error::MusicAssistantError;
use crate::transport::{Connector, Transport};

/// The underlying WebSocket stream.
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] over one WebSocket connection.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) is cancel-safe: dropping its future never loses
/// a frame, so it can sit in a `tokio::select!` branch.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
}

impl WebSocketTransport {
    /// Open a WebSocket connection to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`MusicAssistantError::Io`] if the URL is invalid or the
    /// handshake fails. An underlying I/O error keeps its
    /// [`ErrorKind`](std::io::ErrorKind); anything else maps to
    /// [`ErrorKind::Other`](std::io::ErrorKind::Other).
    pub async fn connect(url: &str) -> Result<Self, MusicAssistantError> {
        debug!(%url, "opening websocket");

        let (stream, _response) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            let kind = match &e {
                tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
                _ => std::io::ErrorKind::Other,
            };
            MusicAssistantError::Io(std::io::Error::new(kind, e))
        })?;

        info!(%url, "websocket connection established");
        Ok(Self::from_stream(stream))
    }

    /// Wrap an already established stream, e.g. one opened with custom
    /// headers or TLS settings.
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
        }
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), MusicAssistantError> {
        if self.closed {
            return Err(MusicAssistantError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| MusicAssistantError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, MusicAssistantError>> {
        loop {
            let msg = match self.stream.next().await? {
                Ok(msg) => msg,
                Err(e) => return Some(Err(MusicAssistantError::TransportReceive(e.to_string()))),
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(frame) => {
                    debug!(?frame, "received websocket close frame");
                    return None;
                }
                // tungstenite answers pings itself.
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Binary(_) => warn!("skipping binary websocket frame"),
                Message::Frame(_) => {}
            }
        }
    }

    async fn close(&mut self) -> Result<(), MusicAssistantError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| MusicAssistantError::TransportSend(e.to_string()))
    }
}

/// Opens a [`WebSocketTransport`] per connection attempt.
///
/// Without a timeout an unreachable host can stall a connection attempt for
/// as long as the OS keeps the TCP handshake alive.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector {
    /// Upper bound for one connection attempt, handshake included.
    pub connect_timeout: Option<Duration>,
}

impl WebSocketConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail connection attempts that take longer than `timeout`.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, MusicAssistantError> {
        let transport = match self.connect_timeout {
            Some(timeout) => tokio::time::timeout(timeout, WebSocketTransport::connect(url))
                .await
                .map_err(|_| MusicAssistantError::Timeout)??,
            None => WebSocketTransport::connect(url).await?,
        };
        Ok(Box::new(transport))
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    #[test]
    fn websocket_transport_is_send() {
        fn assert_send<T: Send>() {}
        assert_send::<WebSocketTransport>();
    }

    #[tokio::test]
    async fn connect_fails_with_invalid_url() {
        let err = WebSocketTransport::connect("not-a-valid-url")
            .await
            .unwrap_err();
        assert!(matches!(err, MusicAssistantError::Io(_)));
    }

    #[tokio::test]
    async fn connector_times_out_on_unroutable_host() {
        let connector = WebSocketConnector::new().with_connect_timeout(Duration::from_millis(50));
        let err = connector.connect("ws://192.0.2.1:1/ws").await.err().unwrap();
        assert!(matches!(err, MusicAssistantError::Timeout));
    }

    /// Accepts one websocket connection and runs `handler` on it.
    async fn start_mock_server<F, Fut>(handler: F) -> String
    where
        F: FnOnce(tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>) -> Fut
            + Send
            + 'static,
        Fut: std::future::Future<Output = ()> + Send,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            handler(ws).await;
        });

        format!("ws://{addr}/ws")
    }

    #[tokio::test]
    async fn connector_yields_server_info_then_close() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Text(r#"{"server_version":"2.0.0"}"#.into()))
                .await
                .unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketConnector::new().connect(&url).await.unwrap();
        let first = transport.recv().await.unwrap().unwrap();
        assert!(first.contains("server_version"));
        assert!(transport.recv().await.is_none());
    }

    #[tokio::test]
    async fn command_round_trip_skips_binary_frames() {
        let url = start_mock_server(|mut ws| async move {
            if let Some(Ok(Message::Text(command))) = ws.next().await {
                ws.send(Message::Binary(vec![0xDE, 0xAD].into()))
                    .await
                    .unwrap();
                let reply = command.as_str().replace("\"command\":\"ping\",", "");
                ws.send(Message::Text(reply.into())).await.unwrap();
            }
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport
            .send(r#"{"command":"ping","message_id":1}"#.to_string())
            .await
            .unwrap();
        let reply = transport.recv().await.unwrap().unwrap();
        assert_eq!(reply, r#"{"message_id":1}"#);
    }

    #[tokio::test]
    async fn send_after_close_returns_transport_closed() {
        let url =
            start_mock_server(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} })
                .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();

        let err = transport.send("{}".to_string()).await.unwrap_err();
        assert!(matches!(err, MusicAssistantError::TransportClosed));
    }
}
