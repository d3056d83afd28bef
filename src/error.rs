//! Error types for the Mopidy client.

use thiserror::Error;

use crate::transport::CloseInfo;

/// Errors that can occur when using the Mopidy client.
///
/// Per-call failures (connection state, server errors, malformed responses,
/// bad argument shapes) only ever surface through the outcome of the call that
/// caused them. None of them tear down the session.
#[derive(Debug, Error)]
pub enum MopidyError {
    /// The transport was unusable when a call was made, or it closed while
    /// the call was outstanding.
    #[error("{message}")]
    Connection {
        /// `"WebSocket is still connecting"`, `"WebSocket is closing"`,
        /// `"WebSocket is closed"` or `"WebSocket closed"`.
        message: String,
        /// The close event that failed an outstanding call, if any.
        close: Option<CloseInfo>,
    },

    /// The server answered a call with a JSON-RPC error object.
    #[error("{message}")]
    Server {
        /// JSON-RPC error code.
        code: i64,
        /// Human-readable message from the server.
        message: String,
        /// Optional extra payload attached by the server.
        data: Option<serde_json::Value>,
    },

    /// The server answered a call with neither `result` nor `error`.
    #[error("Response without 'result' or 'error' received")]
    MalformedResponse {
        /// The raw response object.
        response: serde_json::Value,
    },

    /// A materialized method was invoked with more than one argument.
    #[error("Expected zero arguments, a single array, or a single object.")]
    InvalidArguments,

    /// A materialized method was invoked with a single argument that is
    /// neither an array nor an object.
    #[error("Expected an array or an object.")]
    InvalidArgumentType,

    /// A catalog entry maps to a client path already taken by another method.
    #[error("cannot attach '{method}': '{path}' is already a {existing}")]
    ApiConflict {
        /// Fully dotted wire name of the skipped method.
        method: String,
        /// Client-side path at which the conflict occurred.
        path: String,
        /// What already occupies the path (`"method"` or `"namespace"`).
        existing: &'static str,
    },

    /// Failed to serialize or deserialize a protocol message.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Failed to send a message through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a message from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was already closed.
    #[error("transport connection closed")]
    TransportClosed,

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl MopidyError {
    pub(crate) fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            close: None,
        }
    }

    pub(crate) fn closed_with(close: CloseInfo) -> Self {
        Self::Connection {
            message: "WebSocket closed".into(),
            close: Some(close),
        }
    }

    /// Returns `true` for [`MopidyError::Connection`].
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }

    /// The JSON-RPC error code, if this is a [`MopidyError::Server`].
    pub fn server_code(&self) -> Option<i64> {
        match self {
            Self::Server { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// The close event carried by a [`MopidyError::Connection`], if any.
    pub fn close_info(&self) -> Option<&CloseInfo> {
        match self {
            Self::Connection { close, .. } => close.as_ref(),
            _ => None,
        }
    }
}

/// A specialized [`Result`] type for Mopidy client operations.
pub type Result<T> = std::result::Result<T, MopidyError>;
