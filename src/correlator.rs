//! Request/response correlation.
//!
//! Every outbound call gets an identifier from a process-wide counter and a
//! [`ResponseFuture`] for its outcome. The session loop keeps the sending
//! half of each outstanding call in a [`RequestTable`] until a response with
//! the same `id` arrives or the channel closes.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::task::{Context, Poll};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tokio::sync::oneshot;

use crate::error::{MopidyError, Result};
use crate::log::LogSink;
use crate::protocol::{RequestId, RpcErrorObject};
use crate::transport::CloseInfo;

/// Shared by every session in the process, so identifiers never repeat even
/// across sessions.
static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(0);

/// Allocate the next call identifier. The first identifier is 0.
pub(crate) fn next_request_id() -> RequestId {
    NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed)
}

/// Sending half of an outstanding call.
pub(crate) type Responder = oneshot::Sender<Result<Value>>;

/// Outcome of feeding one response to [`RequestTable::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Resolution {
    /// The call was fulfilled with `result`.
    Fulfilled,
    /// The call was rejected with the server's error.
    ServerError,
    /// The call was rejected because the response had neither member.
    Malformed,
    /// No outstanding call has this identifier.
    Unexpected,
}

/// Outstanding calls keyed by identifier.
#[derive(Debug, Default)]
pub(crate) struct RequestTable {
    pending: HashMap<RequestId, Responder>,
}

impl RequestTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, id: RequestId, responder: Responder) {
        self.pending.insert(id, responder);
    }

    pub(crate) fn remove(&mut self, id: RequestId) -> Option<Responder> {
        self.pending.remove(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Settle the call a response belongs to.
    ///
    /// `response` is the whole inbound object, `id` included.
    pub(crate) fn resolve(&mut self, response: Map<String, Value>, sink: &dyn LogSink) -> Resolution {
        let responder = response
            .get("id")
            .and_then(Value::as_u64)
            .and_then(|id| self.pending.remove(&id));
        let Some(responder) = responder else {
            sink.warn(&format!(
                "Unexpected response received. Message was: {}",
                Value::Object(response)
            ));
            return Resolution::Unexpected;
        };

        let (outcome, resolution) = if let Some(result) = response.get("result") {
            (Ok(result.clone()), Resolution::Fulfilled)
        } else if let Some(error) = response.get("error") {
            sink.warn(&format!("Server returned error: {error}"));
            let error = serde_json::from_value::<RpcErrorObject>(error.clone()).unwrap_or_else(|_| {
                RpcErrorObject {
                    message: error.to_string(),
                    ..RpcErrorObject::default()
                }
            });
            (Err(MopidyError::from(error)), Resolution::ServerError)
        } else {
            let response = Value::Object(response);
            sink.warn(&format!(
                "Response without 'result' or 'error' received. Message was: {response}"
            ));
            (
                Err(MopidyError::MalformedResponse { response }),
                Resolution::Malformed,
            )
        };

        // The caller may have dropped its future; nothing left to notify.
        let _ = responder.send(outcome);
        resolution
    }

    /// Fail every outstanding call because the channel closed.
    pub(crate) fn reject_all(&mut self, close: &CloseInfo) -> usize {
        let count = self.pending.len();
        for (_, responder) in self.pending.drain() {
            let _ = responder.send(Err(MopidyError::closed_with(close.clone())));
        }
        count
    }
}

enum Inner {
    Rejected(Option<MopidyError>),
    Waiting {
        id: RequestId,
        rx: oneshot::Receiver<Result<Value>>,
    },
}

/// Outcome of a remote call.
///
/// Resolves to the response's `result`, or to the error that failed the call.
/// Calls that could not be sent at all (channel not open, invalid arguments)
/// are rejected before any I/O and resolve immediately.
#[must_use = "the outcome of a call is only observed by awaiting it"]
pub struct ResponseFuture {
    inner: Inner,
}

impl ResponseFuture {
    pub(crate) fn rejected(error: MopidyError) -> Self {
        Self {
            inner: Inner::Rejected(Some(error)),
        }
    }

    pub(crate) fn waiting(id: RequestId, rx: oneshot::Receiver<Result<Value>>) -> Self {
        Self {
            inner: Inner::Waiting { id, rx },
        }
    }

    /// Identifier of the call, or `None` if it was rejected before sending.
    pub fn request_id(&self) -> Option<RequestId> {
        match &self.inner {
            Inner::Rejected(_) => None,
            Inner::Waiting { id, .. } => Some(*id),
        }
    }

    /// Returns `true` if the call was rejected before sending.
    pub fn is_rejected(&self) -> bool {
        matches!(self.inner, Inner::Rejected(_))
    }

    /// Await the result and deserialize it into `T`.
    ///
    /// # Errors
    ///
    /// Any error the call fails with, or [`MopidyError::Serialization`] if
    /// the result does not fit `T`.
    pub async fn json<T: DeserializeOwned>(self) -> Result<T> {
        let value = self.await?;
        Ok(serde_json::from_value(value)?)
    }
}

impl Future for ResponseFuture {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match &mut self.inner {
            Inner::Rejected(error) => Poll::Ready(Err(error
                .take()
                .unwrap_or_else(|| MopidyError::connection("WebSocket is closed")))),
            Inner::Waiting { rx, .. } => Pin::new(rx).poll(cx).map(|outcome| {
                // The session loop went away without settling the call.
                outcome.unwrap_or_else(|_| Err(MopidyError::connection("WebSocket is closed")))
            }),
        }
    }
}

impl std::fmt::Debug for ResponseFuture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseFuture")
            .field("request_id", &self.request_id())
            .field("rejected", &self.is_rejected())
            .finish()
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
    use serde_json::json;
    use std::sync::Mutex as StdMutex;
    use tokio_test::{assert_pending, assert_ready, task};

    #[derive(Default)]
    struct RecordingSink {
        warnings: StdMutex<Vec<String>>,
    }

    impl LogSink for RecordingSink {
        fn log(&self, _message: &str) {}
        fn warn(&self, message: &str) {
            self.warnings.lock().unwrap().push(message.to_string());
        }
        fn error(&self, _message: &str) {}
    }

    fn object(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            other => panic!("expected object, got {other}"),
        }
    }

    fn track(table: &mut RequestTable) -> (RequestId, ResponseFuture) {
        let id = next_request_id();
        let (tx, rx) = oneshot::channel();
        table.insert(id, tx);
        (id, ResponseFuture::waiting(id, rx))
    }

    #[test]
    fn identifiers_are_strictly_increasing() {
        let ids: Vec<RequestId> = (0..100).map(|_| next_request_id()).collect();
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[tokio::test]
    async fn result_fulfills_call_with_exact_value() {
        let mut table = RequestTable::new();
        let sink = RecordingSink::default();
        let (id, future) = track(&mut table);

        let result = json!({"uri": "local:track:1", "length": 4000});
        let resolution = table.resolve(
            object(json!({"jsonrpc": "2.0", "id": id, "result": result.clone()})),
            &sink,
        );

        assert_eq!(resolution, Resolution::Fulfilled);
        assert_eq!(future.await.unwrap(), result);
        assert!(table.is_empty());
        assert!(sink.warnings.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn null_result_still_fulfills() {
        let mut table = RequestTable::new();
        let (id, future) = track(&mut table);

        table.resolve(object(json!({"id": id, "result": null})), &RecordingSink::default());
        assert_eq!(future.await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn error_rejects_with_server_error() {
        let mut table = RequestTable::new();
        let sink = RecordingSink::default();
        let (id, future) = track(&mut table);

        let resolution = table.resolve(
            object(json!({
                "jsonrpc": "2.0",
                "id": id,
                "error": {"code": -32601, "message": "Method not found", "data": {"x": 1}}
            })),
            &sink,
        );

        assert_eq!(resolution, Resolution::ServerError);
        match future.await.unwrap_err() {
            MopidyError::Server {
                code,
                message,
                data,
            } => {
                assert_eq!(code, -32601);
                assert_eq!(message, "Method not found");
                assert_eq!(data, Some(json!({"x": 1})));
            }
            other => panic!("expected server error, got {other:?}"),
        }
        let warnings = sink.warnings.lock().unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("Server returned error:"));
    }

    #[tokio::test]
    async fn response_without_result_or_error_is_malformed() {
        let mut table = RequestTable::new();
        let sink = RecordingSink::default();
        let (id, future) = track(&mut table);

        let resolution = table.resolve(object(json!({"jsonrpc": "2.0", "id": id})), &sink);

        assert_eq!(resolution, Resolution::Malformed);
        match future.await.unwrap_err() {
            MopidyError::MalformedResponse { response } => {
                assert_eq!(response["id"], json!(id));
            }
            other => panic!("expected malformed response, got {other:?}"),
        }
        assert!(sink.warnings.lock().unwrap()[0]
            .starts_with("Response without 'result' or 'error' received."));
    }

    #[test]
    fn unknown_id_is_logged_and_ignored() {
        let mut table = RequestTable::new();
        let sink = RecordingSink::default();
        let (_id, _future) = track(&mut table);

        let resolution = table.resolve(object(json!({"id": u64::MAX, "result": 1})), &sink);

        assert_eq!(resolution, Resolution::Unexpected);
        assert_eq!(table.len(), 1);
        assert!(sink.warnings.lock().unwrap()[0].starts_with("Unexpected response received."));
    }

    #[test]
    fn non_integer_id_is_unexpected() {
        let mut table = RequestTable::new();
        let resolution = table.resolve(
            object(json!({"id": "abc", "result": 1})),
            &RecordingSink::default(),
        );
        assert_eq!(resolution, Resolution::Unexpected);
    }

    #[tokio::test]
    async fn reject_all_fails_every_call_with_close_event() {
        let mut table = RequestTable::new();
        let (_, first) = track(&mut table);
        let (_, second) = track(&mut table);
        let close = CloseInfo::new(Some(1006), "gone", false);

        assert_eq!(table.reject_all(&close), 2);
        assert!(table.is_empty());

        for future in [first, second] {
            let err = future.await.unwrap_err();
            assert_eq!(err.to_string(), "WebSocket closed");
            assert_eq!(err.close_info(), Some(&close));
        }
    }

    #[test]
    fn rejected_future_is_ready_immediately() {
        let mut future = task::spawn(ResponseFuture::rejected(MopidyError::connection(
            "WebSocket is closing",
        )));
        let err = assert_ready!(future.poll()).unwrap_err();
        assert_eq!(err.to_string(), "WebSocket is closing");
    }

    #[test]
    fn waiting_future_is_pending_until_resolved() {
        let mut table = RequestTable::new();
        let (id, future) = track(&mut table);
        let mut future = task::spawn(future);
        assert_pending!(future.poll());

        table.resolve(object(json!({"id": id, "result": 5})), &RecordingSink::default());
        assert!(future.is_woken());
        assert_eq!(assert_ready!(future.poll()).unwrap(), json!(5));
    }

    #[tokio::test]
    async fn dropped_responder_reads_as_closed() {
        let mut table = RequestTable::new();
        let (id, future) = track(&mut table);
        drop(table.remove(id));
        assert!(future.await.unwrap_err().is_connection_error());
    }

    #[tokio::test]
    async fn json_deserializes_result() {
        let mut table = RequestTable::new();
        let (id, future) = track(&mut table);
        table.resolve(
            object(json!({"id": id, "result": [1, 2, 3]})),
            &RecordingSink::default(),
        );
        let values: Vec<u32> = future.json().await.unwrap();
        assert_eq!(values, vec![1, 2, 3]);
    }
}
