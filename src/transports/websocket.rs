//! WebSocket channel to a Mopidy server using `tokio-tungstenite`.
//!
//! [`WebSocketTransport`] carries JSON-RPC text frames and remembers the
//! close frame the server sent, so the session can report the close code and
//! reason. [`WebSocketConnector`] opens a fresh transport for every
//! (re)connection attempt. Both `ws://` and `wss://` URLs are accepted, TLS
//! is handled by [`MaybeTlsStream`](tokio_tungstenite::MaybeTlsStream).
//!
//! # Feature gate
//!
//! This module is only available when the `transport-websocket` feature is enabled
//! (it is enabled by default).
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), mopidy_client::MopidyError> {
//! use mopidy_client::{Transport, WebSocketTransport};
//!
//! let mut transport = WebSocketTransport::connect("ws://localhost:6680/mopidy/ws").await?;
//! transport
//!     .send(r#"{"jsonrpc":"2.0","id":0,"method":"core.get_version"}"#.to_string())
//!     .await?;
//!
//! if let Some(Ok(reply)) = transport.recv().await {
//!     println!("server said: {reply}");
//! }
//!
//! transport.close().await?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio_tungstenite::tungstenite::protocol::Message;

use crate::error::MopidyError;
use crate::transport::{CloseInfo, Connector, Transport};

/// The underlying WebSocket stream.
///
/// Public so callers can wrap a stream they set up themselves via
/// [`WebSocketTransport::from_stream`].
pub type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

/// A [`Transport`] backed by a WebSocket connection.
///
/// For custom TLS, proxies or headers, connect the stream yourself and use
/// [`WebSocketTransport::from_stream`].
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) is cancel-safe: dropping its future before it
/// completes loses no frames, so it can be polled inside `tokio::select!`.
#[derive(Debug)]
pub struct WebSocketTransport {
    stream: WsStream,
    closed: bool,
    close_info: Option<CloseInfo>,
}

impl WebSocketTransport {
    /// Open a WebSocket connection to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`MopidyError::Io`] if the URL is invalid or the connection
    /// cannot be established. The [`ErrorKind`](std::io::ErrorKind) of an
    /// underlying I/O error is preserved, anything else maps to
    /// [`ErrorKind::Other`](std::io::ErrorKind::Other).
    pub async fn connect(url: &str) -> Result<Self, MopidyError> {
        tracing::debug!(url = %url, "connecting to Mopidy WebSocket");

        let (stream, _response) = tokio_tungstenite::connect_async(url).await.map_err(|e| {
            let kind = match &e {
                tokio_tungstenite::tungstenite::Error::Io(io) => io.kind(),
                _ => std::io::ErrorKind::Other,
            };
            MopidyError::Io(std::io::Error::new(kind, e))
        })?;

        tracing::info!(url = %url, "WebSocket connection established");

        Ok(Self::from_stream(stream))
    }

    /// Wrap an already-established WebSocket stream.
    pub fn from_stream(stream: WsStream) -> Self {
        Self {
            stream,
            closed: false,
            close_info: None,
        }
    }

    /// Like [`connect`](Self::connect), but gives up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`MopidyError::Timeout`] if the deadline elapses, or any
    /// error that [`connect`](Self::connect) may return.
    pub async fn connect_with_timeout(url: &str, timeout: Duration) -> Result<Self, MopidyError> {
        tokio::time::timeout(timeout, Self::connect(url))
            .await
            .map_err(|_| MopidyError::Timeout)?
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn send(&mut self, message: String) -> Result<(), MopidyError> {
        if self.closed {
            return Err(MopidyError::TransportClosed);
        }
        self.stream
            .send(Message::Text(message.into()))
            .await
            .map_err(|e| MopidyError::TransportSend(e.to_string()))
    }

    async fn recv(&mut self) -> Option<Result<String, MopidyError>> {
        loop {
            let msg = match self.stream.next().await {
                Some(Ok(msg)) => msg,
                Some(Err(e)) => {
                    return Some(Err(MopidyError::TransportReceive(e.to_string())));
                }
                None => return None,
            };

            match msg {
                Message::Text(text) => return Some(Ok(text.to_string())),
                Message::Close(frame) => {
                    tracing::debug!(?frame, "received WebSocket close frame");
                    self.close_info = Some(match frame {
                        Some(frame) => {
                            CloseInfo::new(Some(frame.code.into()), frame.reason.as_str(), true)
                        }
                        None => CloseInfo::new(None, "", true),
                    });
                    return None;
                }
                Message::Ping(_) => {
                    // tungstenite queues the pong itself.
                    tracing::trace!("received WebSocket ping");
                }
                Message::Pong(_) => {
                    tracing::trace!("received WebSocket pong");
                }
                Message::Binary(_) => {
                    tracing::warn!("received unexpected binary WebSocket frame, skipping");
                }
                Message::Frame(_) => {
                    // Never produced by the read half.
                    tracing::debug!("received raw WebSocket frame, skipping");
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), MopidyError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.stream
            .close(None)
            .await
            .map_err(|e| MopidyError::TransportSend(e.to_string()))
    }

    fn close_info(&self) -> Option<CloseInfo> {
        self.close_info.clone()
    }
}

/// Opens a [`WebSocketTransport`] for each connection attempt.
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector {
    timeout: Option<Duration>,
}

impl WebSocketConnector {
    /// Connector without a connect timeout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Abandon an attempt that has not completed after `timeout`.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, MopidyError> {
        let transport = match self.timeout {
            Some(timeout) => WebSocketTransport::connect_with_timeout(url, timeout).await?,
            None => WebSocketTransport::connect(url).await?,
        };
        Ok(Box::new(transport))
    }
}

#[cfg(test)]
#[cfg(feature = "transport-websocket")]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
    use tokio_tungstenite::tungstenite::protocol::CloseFrame;

    #[test]
    fn websocket_transport_is_send_and_debug() {
        fn assert_send_debug<T: Send + std::fmt::Debug>() {}
        assert_send_debug::<WebSocketTransport>();
    }

    #[tokio::test]
    async fn connect_fails_with_invalid_url() {
        let err = WebSocketTransport::connect("not-a-valid-url")
            .await
            .unwrap_err();
        assert!(matches!(err, MopidyError::Io(_)));
    }

    #[tokio::test]
    async fn connector_fails_with_unreachable_host() {
        let Err(err) = WebSocketConnector::new()
            .connect("ws://127.0.0.1:1/mopidy/ws")
            .await
        else {
            panic!("connected to a closed port");
        };
        assert!(matches!(err, MopidyError::Io(_)));
    }

    #[tokio::test]
    async fn connector_times_out_when_handshake_stalls() {
        // Accepts the TCP connection but never answers the upgrade request.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(tcp);
        });

        let Err(err) = WebSocketConnector::new()
            .with_timeout(Duration::from_millis(50))
            .connect(&format!("ws://{addr}/mopidy/ws"))
            .await
        else {
            panic!("handshake completed against a silent server");
        };
        assert!(matches!(err, MopidyError::Timeout));
        server.abort();
    }

    // ── Mock server ──────────────────────────────────────────────────────

    /// Accept one WebSocket connection, run `handler` on it and return the
    /// URL to connect to.
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

        format!("ws://{addr}/mopidy/ws")
    }

    #[tokio::test]
    async fn recv_receives_text_frames_and_skips_binary() {
        let url = start_mock_server(|mut ws| async move {
            ws.send(Message::Text("first".into())).await.unwrap();
            ws.send(Message::Binary(vec![0xDE, 0xAD].into()))
                .await
                .unwrap();
            ws.send(Message::Text("second".into())).await.unwrap();
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), "first");
        assert_eq!(transport.recv().await.unwrap().unwrap(), "second");
    }

    #[tokio::test]
    async fn close_frame_is_recorded() {
        let url = start_mock_server(|mut ws| async move {
            ws.close(Some(CloseFrame {
                code: CloseCode::Away,
                reason: "server stopping".into(),
            }))
            .await
            .unwrap();
        })
        .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        assert!(transport.close_info().is_none());
        assert!(transport.recv().await.is_none());

        let close = transport.close_info().unwrap();
        assert_eq!(close.code, Some(1001));
        assert_eq!(close.reason, "server stopping");
        assert!(close.was_clean);
    }

    #[tokio::test]
    async fn send_after_close_returns_transport_closed() {
        let url =
            start_mock_server(|mut ws| async move { while let Some(Ok(_)) = ws.next().await {} })
                .await;

        let mut transport = WebSocketTransport::connect(&url).await.unwrap();
        transport.close().await.unwrap();
        transport.close().await.unwrap();

        let err = transport.send("late".to_string()).await.unwrap_err();
        assert!(matches!(err, MopidyError::TransportClosed));
    }

    #[tokio::test]
    async fn connector_round_trip() {
        let url = start_mock_server(|mut ws| async move {
            if let Some(Ok(Message::Text(text))) = ws.next().await {
                ws.send(Message::Text(text)).await.unwrap();
            }
            ws.close(None).await.unwrap();
        })
        .await;

        let mut transport = WebSocketConnector::new().connect(&url).await.unwrap();
        transport.send("echo".to_string()).await.unwrap();
        assert_eq!(transport.recv().await.unwrap().unwrap(), "echo");
    }
}
