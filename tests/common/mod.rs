#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing,
    dead_code
)]
//! Shared test utilities for Mopidy client integration tests.
//!
//! [`MockConnector`] plays a Mopidy server: every accepted connection yields
//! a [`MockServer`] through which a test reads the client's requests, replies
//! to them, pushes events and closes the channel.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use mopidy_client::{CloseInfo, Connector, LogSink, MopidyError, Transport};
use serde_json::{json, Value};
use tokio::sync::mpsc;
use tokio::time::Instant;

// ── MockTransport ───────────────────────────────────────────────────

/// What the mock server pushes down a channel.
#[derive(Debug)]
pub enum Frame {
    Text(String),
    Error(String),
    Close(CloseInfo),
}

/// Channel-backed transport driven by a [`MockServer`].
pub struct MockTransport {
    incoming: mpsc::UnboundedReceiver<Frame>,
    sent: mpsc::UnboundedSender<String>,
    fail_sends: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
    close_info: Option<CloseInfo>,
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, message: String) -> Result<(), MopidyError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(MopidyError::TransportSend("broken pipe".into()));
        }
        let _ = self.sent.send(message);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, MopidyError>> {
        match self.incoming.recv().await? {
            Frame::Text(text) => Some(Ok(text)),
            Frame::Error(detail) => Some(Err(MopidyError::TransportReceive(detail))),
            Frame::Close(close) => {
                self.close_info = Some(close);
                None
            }
        }
    }

    async fn close(&mut self) -> Result<(), MopidyError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn close_info(&self) -> Option<CloseInfo> {
        self.close_info.clone()
    }
}

/// The server's end of a [`MockTransport`].
pub struct MockServer {
    push: mpsc::UnboundedSender<Frame>,
    sent: mpsc::UnboundedReceiver<String>,
    fail_sends: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl MockServer {
    /// A connected transport and the server end driving it.
    pub fn pair() -> (MockTransport, MockServer) {
        let (push, incoming) = mpsc::unbounded_channel();
        let (sent_tx, sent) = mpsc::unbounded_channel();
        let fail_sends = Arc::new(AtomicBool::new(false));
        let closed = Arc::new(AtomicBool::new(false));
        let transport = MockTransport {
            incoming,
            sent: sent_tx,
            fail_sends: Arc::clone(&fail_sends),
            closed: Arc::clone(&closed),
            close_info: None,
        };
        let server = MockServer {
            push,
            sent,
            fail_sends,
            closed,
        };
        (transport, server)
    }

    /// Next frame the client transmitted, parsed.
    pub async fn next_request(&mut self) -> Value {
        let raw = self.sent.recv().await.expect("client sent a frame");
        serde_json::from_str(&raw).expect("client frames are JSON")
    }

    /// Frames already transmitted and not yet read.
    pub fn drain_requests(&mut self) -> Vec<Value> {
        let mut requests = Vec::new();
        while let Ok(raw) = self.sent.try_recv() {
            requests.push(serde_json::from_str(&raw).unwrap());
        }
        requests
    }

    /// Read the `core.describe` call and answer it with `catalog`.
    pub async fn describe(&mut self, catalog: Value) {
        let request = self.next_request().await;
        assert_eq!(request["method"], "core.describe");
        self.reply(&request["id"], catalog);
    }

    pub fn send_text(&self, text: impl Into<String>) {
        let _ = self.push.send(Frame::Text(text.into()));
    }

    pub fn send_json(&self, value: Value) {
        self.send_text(value.to_string());
    }

    pub fn reply(&self, id: &Value, result: Value) {
        self.send_json(json!({"jsonrpc": "2.0", "id": id, "result": result}));
    }

    pub fn reply_error(&self, id: &Value, error: Value) {
        self.send_json(json!({"jsonrpc": "2.0", "id": id, "error": error}));
    }

    pub fn event(&self, name: &str, payload: Value) {
        let mut frame = payload;
        frame["event"] = json!(name);
        self.send_json(frame);
    }

    pub fn fail_receive(&self, detail: &str) {
        let _ = self.push.send(Frame::Error(detail.into()));
    }

    pub fn close(&self, code: u16, reason: &str) {
        let _ = self
            .push
            .send(Frame::Close(CloseInfo::new(Some(code), reason, true)));
    }

    pub fn fail_sends(&self) {
        self.fail_sends.store(true, Ordering::SeqCst);
    }

    /// Whether the client closed this channel.
    pub fn client_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

// ── MockConnector ───────────────────────────────────────────────────

/// Accepts or refuses connection attempts, recording each one.
#[derive(Clone)]
pub struct MockConnector {
    accepting: Arc<AtomicBool>,
    attempts: Arc<StdMutex<Vec<(String, Instant)>>>,
    accepted: mpsc::UnboundedSender<MockServer>,
}

impl MockConnector {
    /// An accepting connector and the stream of server ends it produces.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MockServer>) {
        let (accepted, servers) = mpsc::unbounded_channel();
        let connector = Self {
            accepting: Arc::new(AtomicBool::new(true)),
            attempts: Arc::new(StdMutex::new(Vec::new())),
            accepted,
        };
        (connector, servers)
    }

    /// A connector that refuses every attempt until [`accept`](Self::accept).
    pub fn refusing() -> (Self, mpsc::UnboundedReceiver<MockServer>) {
        let (connector, servers) = Self::new();
        connector.refuse();
        (connector, servers)
    }

    pub fn accept(&self) {
        self.accepting.store(true, Ordering::SeqCst);
    }

    pub fn refuse(&self) {
        self.accepting.store(false, Ordering::SeqCst);
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.lock().unwrap().len()
    }

    /// When each attempt happened.
    pub fn attempt_times(&self) -> Vec<Instant> {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn attempted_urls(&self) -> Vec<String> {
        self.attempts
            .lock()
            .unwrap()
            .iter()
            .map(|(url, _)| url.clone())
            .collect()
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, MopidyError> {
        self.attempts
            .lock()
            .unwrap()
            .push((url.to_string(), Instant::now()));
        if !self.accepting.load(Ordering::SeqCst) {
            return Err(MopidyError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "connection refused",
            )));
        }
        let (transport, server) = MockServer::pair();
        let _ = self.accepted.send(server);
        Ok(Box::new(transport))
    }
}

// ── RecordingSink ───────────────────────────────────────────────────

/// Log sink that keeps every message, tagged by level.
#[derive(Clone, Default)]
pub struct RecordingSink {
    lines: Arc<StdMutex<Vec<(&'static str, String)>>>,
}

impl RecordingSink {
    pub fn warnings(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|(level, _)| *level == "warn")
            .map(|(_, line)| line.clone())
            .collect()
    }

    pub fn errors(&self) -> Vec<String> {
        self.lines
            .lock()
            .unwrap()
            .iter()
            .filter(|(level, _)| *level == "error")
            .map(|(_, line)| line.clone())
            .collect()
    }
}

impl LogSink for RecordingSink {
    fn log(&self, message: &str) {
        self.lines.lock().unwrap().push(("log", message.into()));
    }

    fn warn(&self, message: &str) {
        self.lines.lock().unwrap().push(("warn", message.into()));
    }

    fn error(&self, message: &str) {
        self.lines.lock().unwrap().push(("error", message.into()));
    }
}

// ── Counting ────────────────────────────────────────────────────────

/// Shared counter for listener callbacks.
#[derive(Clone, Default)]
pub struct Counter(Arc<AtomicUsize>);

impl Counter {
    pub fn bump(&self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }

    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

// ── JSON helper functions ───────────────────────────────────────────

/// A small slice of a real Mopidy `core.describe` result.
pub fn sample_catalog() -> Value {
    json!({
        "core.get_version": {
            "description": "Get version of the Mopidy core API",
            "params": []
        },
        "core.playback.get_state": {
            "description": "Get The playback state.",
            "params": []
        },
        "core.playback.play": {
            "description": "Play the given track, or if the given tlid and track are None, play the currently active track.",
            "params": [
                {"name": "tl_track", "default": null},
                {"name": "tlid", "default": null}
            ]
        },
        "core.mixer.set_volume": {
            "description": "Set the volume.",
            "params": [{"name": "volume"}]
        },
        "core.tracklist.add": {
            "description": "Add tracks to the tracklist.",
            "params": [
                {"name": "tracks", "default": null},
                {"name": "at_position", "default": null},
                {"name": "uris", "default": null}
            ]
        }
    })
}
