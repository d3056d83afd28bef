//! Transport abstraction for the Mopidy WebSocket API.
//!
//! The [`Transport`] trait defines one bidirectional text message channel
//! between the client and the server. Every message is a complete JSON
//! document, so transport implementations handle framing internally.
//!
//! # Connection Setup
//!
//! The session re-establishes its channel after every close, so connection
//! setup lives behind a second trait, [`Connector`], which is a transport
//! factory injected into the session at construction time. A connector for
//! real WebSockets ships behind the `transport-websocket` feature.
//!
//! # Implementing a Custom Transport
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use mopidy_client::error::MopidyError;
//! use mopidy_client::transport::{Connector, Transport};
//!
//! struct MyTransport { /* ... */ }
//!
//! #[async_trait]
//! impl Transport for MyTransport {
//!     async fn send(&mut self, message: String) -> Result<(), MopidyError> {
//!         todo!()
//!     }
//!
//!     async fn recv(&mut self) -> Option<Result<String, MopidyError>> {
//!         // Return None when the connection is closed
//!         todo!()
//!     }
//!
//!     async fn close(&mut self) -> Result<(), MopidyError> {
//!         todo!()
//!     }
//! }
//!
//! struct MyConnector;
//!
//! #[async_trait]
//! impl Connector for MyConnector {
//!     async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, MopidyError> {
//!         Ok(Box::new(MyTransport { /* ... */ }))
//!     }
//! }
//! ```

use std::fmt;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::MopidyError;

/// Close code used when the client closes the channel itself.
pub const CLOSE_NORMAL: u16 = 1000;

/// Close code used when the channel went away without a close frame.
pub const CLOSE_ABNORMAL: u16 = 1006;

/// Readiness of the session's current channel.
///
/// Mirrors the four WebSocket ready states. A session without any channel
/// reports [`ReadyState::Closed`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ReadyState {
    /// A connection attempt is in flight.
    Connecting = 0,
    /// The channel is open and calls can be sent.
    Open = 1,
    /// The channel is being shut down.
    Closing = 2,
    /// There is no usable channel.
    Closed = 3,
}

impl ReadyState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Connecting,
            1 => Self::Open,
            2 => Self::Closing,
            _ => Self::Closed,
        }
    }

    /// The connection error a call made in this state fails with, or `None`
    /// when the channel is open.
    pub(crate) fn unusable_reason(self) -> Option<&'static str> {
        match self {
            Self::Connecting => Some("WebSocket is still connecting"),
            Self::Open => None,
            Self::Closing => Some("WebSocket is closing"),
            Self::Closed => Some("WebSocket is closed"),
        }
    }
}

/// Describes why a channel closed.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CloseInfo {
    /// WebSocket close code, if the peer (or the client) supplied one.
    pub code: Option<u16>,
    /// Close reason text. Empty when none was given.
    pub reason: String,
    /// Whether the close handshake completed.
    pub was_clean: bool,
}

impl CloseInfo {
    /// Create a new close description.
    pub fn new(code: Option<u16>, reason: impl Into<String>, was_clean: bool) -> Self {
        Self {
            code,
            reason: reason.into(),
            was_clean,
        }
    }

    pub(crate) fn client_closed() -> Self {
        Self::new(Some(CLOSE_NORMAL), "client closed", true)
    }

    pub(crate) fn abnormal(reason: impl Into<String>) -> Self {
        Self::new(Some(CLOSE_ABNORMAL), reason, false)
    }
}

impl fmt::Display for CloseInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Some(code) if self.reason.is_empty() => write!(f, "code {code}"),
            Some(code) => write!(f, "code {code}: {}", self.reason),
            None if self.reason.is_empty() => f.write_str("connection closed"),
            None => f.write_str(&self.reason),
        }
    }
}

/// A bidirectional text message transport for the Mopidy JSON-RPC API.
///
/// Each call to [`send`](Transport::send) transmits one complete JSON message.
/// Each call to [`recv`](Transport::recv) returns one complete JSON message.
///
/// # Object Safety
///
/// The session stores its channel as `Box<dyn Transport>`, so this trait is
/// object-safe.
///
/// # Cancel Safety
///
/// The [`recv`](Transport::recv) method **MUST** be cancel-safe because it is
/// used inside `tokio::select!`. Channel-based implementations (e.g. wrapping
/// `mpsc::Receiver`) are naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send a JSON text message to the server.
    ///
    /// # Errors
    ///
    /// Returns [`MopidyError::TransportSend`] if the message could not be sent.
    async fn send(&mut self, message: String) -> Result<(), MopidyError>;

    /// Receive the next JSON text message from the server.
    ///
    /// Returns:
    /// - `Some(Ok(text))` — a complete message was received
    /// - `Some(Err(e))` — a transport error occurred
    /// - `None` — the connection was closed by the server
    async fn recv(&mut self) -> Option<Result<String, MopidyError>>;

    /// Close the transport connection gracefully.
    ///
    /// # Errors
    ///
    /// Returns an error if the graceful shutdown fails. Implementations should
    /// still release resources even if the close handshake fails.
    async fn close(&mut self) -> Result<(), MopidyError>;

    /// The close frame observed by [`recv`](Transport::recv), if any.
    fn close_info(&self) -> Option<CloseInfo> {
        None
    }
}

/// Factory for new [`Transport`] instances.
///
/// The session calls [`connect`](Connector::connect) for the initial
/// connection and for every reconnection attempt.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    /// Open a new channel to `url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel cannot be established. The session
    /// reports the failure as `websocket:error` followed by `websocket:close`.
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, MopidyError>;
}

/// A [`Connector`] that hands out one pre-built transport.
///
/// The first [`connect`](Connector::connect) returns the wrapped transport and
/// ignores the URL. Every later attempt fails, since a closed channel cannot
/// be reopened.
pub struct PrebuiltConnector {
    transport: Mutex<Option<Box<dyn Transport>>>,
}

impl PrebuiltConnector {
    /// Wrap an already-connected transport.
    pub fn new(transport: impl Transport) -> Self {
        Self {
            transport: Mutex::new(Some(Box::new(transport))),
        }
    }
}

impl fmt::Debug for PrebuiltConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrebuiltConnector").finish_non_exhaustive()
    }
}

#[async_trait]
impl Connector for PrebuiltConnector {
    async fn connect(&self, _url: &str) -> Result<Box<dyn Transport>, MopidyError> {
        self.transport
            .lock()
            .await
            .take()
            .ok_or_else(|| MopidyError::connection("pre-built transport was already used"))
    }
}
