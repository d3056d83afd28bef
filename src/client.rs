//! Reconnecting session for the Mopidy JSON-RPC API.
//!
//! [`MopidyClient`] is a thin handle that talks to a background session loop
//! over an unbounded MPSC channel. The loop owns the channel, the table of
//! outstanding calls, the backoff state and the API tree, so all session
//! state is mutated from a single task. Signals are published through the
//! session's [`EventHub`].
//!
//! # Example
//!
//! ```rust,ignore
//! let client = MopidyClient::new(MopidyConfig::for_host("localhost:6680", false));
//! let mut online = client.subscribe(names::STATE_ONLINE);
//! online.recv().await;
//!
//! let api = client.api().await.expect("online");
//! let state = api.method("playback.getState").expect("declared").call(&[]).await?;
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot, RwLock};
use tracing::{debug, error, warn};

use crate::api::{ApiBuilder, ApiTree, RemoteMethod};
use crate::config::MopidyConfig;
use crate::correlator::{next_request_id, RequestTable, Responder, ResponseFuture};
use crate::error::{MopidyError, Result};
use crate::event::{Signal, StateChange};
use crate::hub::{EventHub, ListenerId};
use crate::log::LogSink;
use crate::protocol::{ApiCatalog, Params, Request, DESCRIBE_METHOD};
use crate::reconnect::{self, Backoff, ReconnectController, ReconnectStep};
use crate::router;
use crate::transport::{CloseInfo, Connector, PrebuiltConnector, ReadyState, Transport};

// ── Shared state ────────────────────────────────────────────────────

/// State read by the handle and written by the session loop.
pub(crate) struct SharedState {
    ready: AtomicU8,
    online: AtomicBool,
    api: RwLock<Option<Arc<ApiTree>>>,
}

impl SharedState {
    fn new(ready: ReadyState) -> Self {
        Self {
            ready: AtomicU8::new(ready as u8),
            online: AtomicBool::new(false),
            api: RwLock::new(None),
        }
    }

    fn ready_state(&self) -> ReadyState {
        ReadyState::from_u8(self.ready.load(Ordering::Acquire))
    }

    fn set_ready_state(&self, state: ReadyState) {
        self.ready.store(state as u8, Ordering::Release);
    }
}

/// Messages from the handle (and materialized methods) to the session loop.
pub(crate) enum Command {
    Call {
        request: Request,
        responder: Responder,
    },
    Connect,
    Close,
}

// ── Caller ──────────────────────────────────────────────────────────

/// Sends calls into a session. Held by the handle and by every
/// [`RemoteMethod`]; it does not keep the session loop alive.
#[derive(Clone)]
pub(crate) struct Caller {
    cmd_tx: mpsc::WeakUnboundedSender<Command>,
    shared: Arc<SharedState>,
}

impl Caller {
    /// Queue a call. Fails without queuing anything when the channel is not
    /// open or the session loop has gone away.
    pub(crate) fn send(&self, method: String, params: Option<Params>) -> ResponseFuture {
        if let Some(reason) = self.shared.ready_state().unusable_reason() {
            return ResponseFuture::rejected(MopidyError::connection(reason));
        }
        let Some(cmd_tx) = self.cmd_tx.upgrade() else {
            return ResponseFuture::rejected(MopidyError::connection("WebSocket is closed"));
        };

        let id = next_request_id();
        let (responder, rx) = oneshot::channel();
        let command = Command::Call {
            request: Request::new(id, method, params),
            responder,
        };
        if cmd_tx.send(command).is_err() {
            return ResponseFuture::rejected(MopidyError::connection("WebSocket is closed"));
        }
        ResponseFuture::waiting(id, rx)
    }

    #[cfg(test)]
    pub(crate) fn detached() -> Self {
        let (cmd_tx, _cmd_rx) = mpsc::unbounded_channel();
        Self {
            cmd_tx: cmd_tx.downgrade(),
            shared: Arc::new(SharedState::new(ReadyState::Closed)),
        }
    }
}

impl std::fmt::Debug for Caller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Caller")
            .field("ready_state", &self.shared.ready_state())
            .finish()
    }
}

// ── Client handle ───────────────────────────────────────────────────

/// Handle to a Mopidy session.
///
/// Constructing a client spawns the session loop on the current tokio
/// runtime. With `auto_connect` (the default) the loop connects right away,
/// fetches the method catalog, builds the [`ApiTree`] and publishes
/// `state:online`. When the channel closes, outstanding calls fail with
/// `WebSocket closed`, `state:offline` is published and the session
/// reconnects with exponential backoff until [`close`](Self::close) is called.
pub struct MopidyClient {
    cmd_tx: mpsc::UnboundedSender<Command>,
    caller: Caller,
    shared: Arc<SharedState>,
    hub: Arc<EventHub>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
    shutdown_timeout: Duration,
}

impl MopidyClient {
    /// Start a session that connects over WebSocket to `config.url`.
    #[cfg(feature = "transport-websocket")]
    pub fn new(config: MopidyConfig) -> Self {
        Self::with_connector(crate::transports::WebSocketConnector::new(), config)
    }

    /// Start a session whose channels are produced by `connector`.
    pub fn with_connector(connector: impl Connector, config: MopidyConfig) -> Self {
        Self::start(connector, config, Arc::new(EventHub::new()))
    }

    /// Start a session over an already-connected transport.
    ///
    /// The transport is used for the first connection only. Reconnection
    /// attempts after it closes fail, so call [`close`](Self::close) or
    /// use [`with_connector`](Self::with_connector) for long-lived sessions.
    pub fn with_transport(transport: impl Transport, config: MopidyConfig) -> Self {
        Self::with_connector(PrebuiltConnector::new(transport), config)
    }

    /// Start a session that publishes on `hub`.
    ///
    /// Listeners registered on `hub` beforehand observe every signal of the
    /// session, including those of the initial connection.
    pub fn start(connector: impl Connector, config: MopidyConfig, hub: Arc<EventHub>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<Command>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let initial = if config.auto_connect {
            ReadyState::Connecting
        } else {
            ReadyState::Closed
        };
        let shared = Arc::new(SharedState::new(initial));
        let caller = Caller {
            cmd_tx: cmd_tx.downgrade(),
            shared: Arc::clone(&shared),
        };

        if config.auto_connect {
            // Cannot fail: the receiver is alive until the loop is spawned.
            let _ = cmd_tx.send(Command::Connect);
        }

        let (min, max) = config.backoff_bounds();
        let session = SessionLoop {
            url: config.url.clone(),
            connector: Arc::new(connector),
            transport: None,
            connecting: None,
            catalog: None,
            cmd_rx,
            shutdown_rx,
            hub: Arc::clone(&hub),
            shared: Arc::clone(&shared),
            caller: caller.clone(),
            sink: config.sink(),
            pending: RequestTable::new(),
            reconnect: ReconnectController::new(Backoff::new(min, max)),
        };
        let task = tokio::spawn(session.run());

        Self {
            cmd_tx,
            caller,
            shared,
            hub,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
            shutdown_timeout: config.shutdown_timeout,
        }
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Connect, unless the channel is already open.
    ///
    /// Only needed when `auto_connect` is off. An in-flight attempt is
    /// abandoned and restarted.
    ///
    /// # Errors
    ///
    /// Returns [`MopidyError::TransportClosed`] if the session loop has exited.
    pub fn connect(&self) -> Result<()> {
        self.command(Command::Connect)
    }

    /// Close the channel and stop reconnecting.
    ///
    /// Any scheduled reconnection attempt is cancelled. Outstanding calls
    /// fail with `WebSocket closed`.
    ///
    /// # Errors
    ///
    /// Returns [`MopidyError::TransportClosed`] if the session loop has exited.
    pub fn close(&self) -> Result<()> {
        self.command(Command::Close)
    }

    /// Close the channel and stop the session loop.
    ///
    /// Waits up to the configured `shutdown_timeout` for the loop to close
    /// the transport, then aborts it.
    pub async fn shutdown(&mut self) {
        debug!("MopidyClient: shutdown requested");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(self.shutdown_timeout, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("session loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("session loop did not exit within timeout; aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("session loop aborted: {join_err}");
                    }
                }
            }
        }

        self.shared.set_ready_state(ReadyState::Closed);
    }

    // ── Calls ───────────────────────────────────────────────────────

    /// Call `method` (its full wire name, e.g. `core.playback.next`).
    ///
    /// The returned future is already rejected with a
    /// [`MopidyError::Connection`] if the channel is not open.
    pub fn call(&self, method: impl Into<String>, params: Option<Params>) -> ResponseFuture {
        self.caller.send(method.into(), params)
    }

    /// The API tree built on the most recent connection, if the session is online.
    pub async fn api(&self) -> Option<Arc<ApiTree>> {
        self.shared.api.read().await.clone()
    }

    /// The method at a client-side path such as `"playback.next"`.
    pub async fn method(&self, path: &str) -> Option<RemoteMethod> {
        self.api().await.and_then(|api| api.method(path).cloned())
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Readiness of the current channel.
    pub fn ready_state(&self) -> ReadyState {
        self.shared.ready_state()
    }

    /// Returns `true` once the API tree is built, until the channel closes.
    pub fn is_online(&self) -> bool {
        self.shared.online.load(Ordering::Acquire)
    }

    // ── Signals ─────────────────────────────────────────────────────

    /// The session's signal registry.
    pub fn events(&self) -> &Arc<EventHub> {
        &self.hub
    }

    /// Shortcut for [`EventHub::on`].
    pub fn on<F>(&self, name: impl Into<String>, listener: F) -> ListenerId
    where
        F: Fn(&Signal) + Send + Sync + 'static,
    {
        self.hub.on(name, listener)
    }

    /// Shortcut for [`EventHub::off`].
    pub fn off(&self, id: ListenerId) -> bool {
        self.hub.off(id)
    }

    /// Shortcut for [`EventHub::subscribe`].
    pub fn subscribe(&self, name: impl Into<String>) -> mpsc::UnboundedReceiver<Signal> {
        self.hub.subscribe(name)
    }

    fn command(&self, command: Command) -> Result<()> {
        self.cmd_tx
            .send(command)
            .map_err(|_| MopidyError::TransportClosed)
    }
}

impl std::fmt::Debug for MopidyClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MopidyClient")
            .field("ready_state", &self.ready_state())
            .field("online", &self.is_online())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for MopidyClient {
    fn drop(&mut self) {
        // No executor context here to drive a graceful close.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Session loop ────────────────────────────────────────────────────

type ConnectFuture = Pin<Box<dyn Future<Output = Result<Box<dyn Transport>>> + Send>>;

struct SessionLoop {
    url: String,
    connector: Arc<dyn Connector>,
    transport: Option<Box<dyn Transport>>,
    connecting: Option<ConnectFuture>,
    catalog: Option<oneshot::Receiver<Result<Value>>>,
    cmd_rx: mpsc::UnboundedReceiver<Command>,
    shutdown_rx: oneshot::Receiver<()>,
    hub: Arc<EventHub>,
    shared: Arc<SharedState>,
    caller: Caller,
    sink: Arc<dyn LogSink>,
    pending: RequestTable,
    reconnect: ReconnectController,
}

impl SessionLoop {
    /// Multiplexes commands, connection attempts, inbound frames, the catalog
    /// call and the reconnection timer.
    ///
    /// Exits when the handle is dropped or shut down.
    async fn run(mut self) {
        debug!("session loop started");

        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle_command(cmd).await,
                        None => {
                            debug!("command channel closed, shutting down session loop");
                            self.close().await;
                            break;
                        }
                    }
                }

                _ = &mut self.shutdown_rx => {
                    debug!("shutdown signal received");
                    self.close().await;
                    break;
                }

                connected = next_connection(&mut self.connecting) => {
                    self.connecting = None;
                    self.on_connected(connected).await;
                }

                incoming = next_frame(&mut self.transport) => {
                    self.on_frame(incoming).await;
                }

                catalog = next_catalog(&mut self.catalog) => {
                    self.catalog = None;
                    self.on_catalog(catalog).await;
                }

                () = reconnect::wait_for(self.reconnect.deadline()) => {
                    self.on_reconnect_tick();
                }
            }
        }

        // Methods in the tree hold the shared state; drop the tree to release it.
        self.shared.api.write().await.take();
        debug!("session loop exited");
    }

    async fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Call { request, responder } => self.dispatch(request, responder).await,
            Command::Connect => self.connect(),
            Command::Close => self.close().await,
        }
    }

    // ── Transport adapter ───────────────────────────────────────────

    fn connect(&mut self) {
        if self.transport.is_some() && self.shared.ready_state() == ReadyState::Open {
            debug!("connect: channel already open");
            return;
        }
        if self.connecting.take().is_some() {
            debug!("connect: abandoning in-flight connection attempt");
        }

        debug!(url = %self.url, "connecting");
        self.shared.set_ready_state(ReadyState::Connecting);
        let connector = Arc::clone(&self.connector);
        let url = self.url.clone();
        self.connecting = Some(Box::pin(async move { connector.connect(&url).await }));
    }

    async fn close(&mut self) {
        self.reconnect.disable();
        let was_connecting = self.connecting.take().is_some();

        match self.transport.take() {
            Some(mut transport) => {
                self.shared.set_ready_state(ReadyState::Closing);
                if let Err(e) = transport.close().await {
                    warn!("transport close error: {e}");
                }
                self.on_closed(CloseInfo::client_closed()).await;
            }
            None if was_connecting => self.on_closed(CloseInfo::client_closed()).await,
            None => debug!("close: no channel to close"),
        }
    }

    async fn on_connected(&mut self, connected: Result<Box<dyn Transport>>) {
        match connected {
            Ok(transport) => {
                debug!(url = %self.url, "channel open");
                self.transport = Some(transport);
                self.shared.set_ready_state(ReadyState::Open);
                self.reconnect.on_open();
                self.hub.emit(&Signal::WebSocketOpen);
                self.fetch_catalog().await;
            }
            Err(e) => {
                let detail = e.to_string();
                self.report_error(&detail);
                self.on_closed(CloseInfo::abnormal(detail)).await;
            }
        }
    }

    async fn on_frame(&mut self, incoming: Option<Result<String>>) {
        match incoming {
            Some(Ok(text)) => {
                self.hub
                    .emit(&Signal::WebSocketIncomingMessage(text.clone()));
                let routed = router::route(&text, &mut self.pending, &self.hub, self.sink.as_ref());
                debug!(?routed, "inbound frame");
            }
            Some(Err(e)) => {
                error!("transport receive error: {e}");
                self.on_transport_failure(e.to_string()).await;
            }
            None => {
                let close = self
                    .transport
                    .take()
                    .and_then(|transport| transport.close_info())
                    .unwrap_or_else(|| CloseInfo::abnormal("connection closed by server"));
                debug!(%close, "channel closed by server");
                self.on_closed(close).await;
            }
        }
    }

    /// The channel broke: report the error, then treat it as closed.
    async fn on_transport_failure(&mut self, detail: String) {
        self.report_error(&detail);
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close().await {
                debug!("closing broken transport failed: {e}");
            }
        }
        self.on_closed(CloseInfo::abnormal(detail)).await;
    }

    fn report_error(&self, detail: &str) {
        self.hub.emit(&Signal::WebSocketError(detail.to_string()));
        self.sink.warn(&format!("WebSocket error: {detail}"));
    }

    /// Cleanup shared by every way a channel can end.
    async fn on_closed(&mut self, close: CloseInfo) {
        self.transport = None;
        self.connecting = None;
        self.shared.set_ready_state(ReadyState::Closed);
        self.shared.online.store(false, Ordering::Release);
        self.shared.api.write().await.take();

        self.hub.emit(&Signal::WebSocketClose(close.clone()));

        let rejected = self.pending.reject_all(&close);
        if rejected > 0 {
            debug!(rejected, "rejected outstanding calls");
        }
        self.hub.emit_all(Signal::state_pair(StateChange::Offline));

        if self.reconnect.schedule() {
            debug!(delay = ?self.reconnect.backoff().current(), "reconnection scheduled");
        }
    }

    // ── Request correlator ──────────────────────────────────────────

    async fn dispatch(&mut self, request: Request, responder: Responder) {
        let ready = self.shared.ready_state();
        let Some(transport) = self
            .transport
            .as_mut()
            .filter(|_| ready == ReadyState::Open)
        else {
            // The channel closed between the handle's check and now.
            let reason = ready.unusable_reason().unwrap_or("WebSocket is closed");
            let _ = responder.send(Err(MopidyError::connection(reason)));
            return;
        };

        let envelope = match serde_json::to_value(&request) {
            Ok(envelope) => envelope,
            Err(e) => {
                error!("failed to serialize request: {e}");
                let _ = responder.send(Err(e.into()));
                return;
            }
        };

        self.pending.insert(request.id, responder);
        if let Err(e) = transport.send(envelope.to_string()).await {
            error!("transport send error: {e}");
            let detail = e.to_string();
            if let Some(responder) = self.pending.remove(request.id) {
                let _ = responder.send(Err(e));
            }
            self.on_transport_failure(detail).await;
            return;
        }

        debug!(
            id = request.id,
            method = %request.method,
            pending = self.pending.len(),
            "sent request"
        );
        self.hub.emit(&Signal::WebSocketOutgoingMessage(envelope));
    }

    // ── API materializer ────────────────────────────────────────────

    async fn fetch_catalog(&mut self) {
        let (responder, rx) = oneshot::channel();
        self.catalog = Some(rx);
        let request = Request::new(next_request_id(), DESCRIBE_METHOD, None);
        self.dispatch(request, responder).await;
    }

    async fn on_catalog(&mut self, outcome: Result<Value>) {
        let catalog = outcome.and_then(|value| {
            serde_json::from_value::<ApiCatalog>(value).map_err(MopidyError::from)
        });
        let catalog = match catalog {
            Ok(catalog) => catalog,
            Err(e) => {
                self.sink.warn(&format!("WebSocket error: {e}"));
                return;
            }
        };

        let methods = catalog.len();
        let (tree, conflicts) = ApiBuilder::new(self.caller.clone()).build(catalog);
        for conflict in conflicts {
            self.sink.warn(&format!("Skipping API method: {conflict}"));
        }
        *self.shared.api.write().await = Some(Arc::new(tree));
        self.shared.online.store(true, Ordering::Release);
        debug!(methods, "API materialized");

        self.hub.emit_all(Signal::state_pair(StateChange::Online));
    }

    // ── Reconnection controller ─────────────────────────────────────

    fn on_reconnect_tick(&mut self) {
        match self.reconnect.fire() {
            Some(ReconnectStep::Announce(time_to_attempt)) => {
                debug!(?time_to_attempt, "reconnection pending");
                self.hub.emit_all(Signal::state_pair(StateChange::ReconnectionPending {
                    time_to_attempt,
                }));
            }
            Some(ReconnectStep::Attempt) => {
                self.hub
                    .emit_all(Signal::state_pair(StateChange::Reconnecting));
                self.connect();
            }
            None => {}
        }
    }
}

/// Resolve with the in-flight connection attempt, or never.
async fn next_connection(connecting: &mut Option<ConnectFuture>) -> Result<Box<dyn Transport>> {
    match connecting {
        Some(attempt) => attempt.as_mut().await,
        None => std::future::pending().await,
    }
}

/// Resolve with the next frame from the current channel, or never.
async fn next_frame(transport: &mut Option<Box<dyn Transport>>) -> Option<Result<String>> {
    match transport {
        Some(transport) => transport.recv().await,
        None => std::future::pending().await,
    }
}

/// Resolve with the outcome of the catalog call, or never.
async fn next_catalog(catalog: &mut Option<oneshot::Receiver<Result<Value>>>) -> Result<Value> {
    match catalog {
        Some(rx) => rx
            .await
            .unwrap_or_else(|_| Err(MopidyError::connection("WebSocket closed"))),
        None => std::future::pending().await,
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
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
    use crate::event::names;
    use crate::log::SilentSink;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Mutex as StdMutex;

    // ── Mock transport ──────────────────────────────────────────────

    /// Channel-backed transport: the test plays the server.
    struct MockTransport {
        incoming: mpsc::UnboundedReceiver<String>,
        sent: mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn send(&mut self, message: String) -> Result<()> {
            let _ = self.sent.send(message);
            Ok(())
        }

        async fn recv(&mut self) -> Option<Result<String>> {
            self.incoming.recv().await.map(Ok)
        }

        async fn close(&mut self) -> Result<()> {
            Ok(())
        }
    }

    struct Server {
        push: mpsc::UnboundedSender<String>,
        sent: mpsc::UnboundedReceiver<String>,
    }

    impl Server {
        async fn next_request(&mut self) -> Value {
            serde_json::from_str(&self.sent.recv().await.unwrap()).unwrap()
        }

        fn reply(&self, id: &Value, result: Value) {
            self.push
                .send(json!({"jsonrpc": "2.0", "id": id, "result": result}).to_string())
                .unwrap();
        }
    }

    fn mock_pair() -> (MockTransport, Server) {
        let (push, incoming) = mpsc::unbounded_channel();
        let (sent_tx, sent) = mpsc::unbounded_channel();
        (
            MockTransport {
                incoming,
                sent: sent_tx,
            },
            Server { push, sent },
        )
    }

    /// Always fails, counting attempts.
    struct RefusingConnector {
        attempts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Connector for RefusingConnector {
        async fn connect(&self, _url: &str) -> Result<Box<dyn Transport>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(MopidyError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "refused",
            )))
        }
    }

    fn quiet() -> MopidyConfig {
        MopidyConfig::default().with_log_sink(SilentSink)
    }

    async fn online(client: &MopidyClient, server: &mut Server) {
        let describe = server.next_request().await;
        assert_eq!(describe["method"], DESCRIBE_METHOD);
        server.reply(
            &describe["id"],
            json!({"core.playback.next": {"description": "Next", "params": []}}),
        );
        let mut rx = client.subscribe(names::STATE_ONLINE);
        if !client.is_online() {
            rx.recv().await.unwrap();
        }
    }

    #[tokio::test]
    async fn auto_connect_fetches_catalog_and_goes_online() {
        let (transport, mut server) = mock_pair();
        let client = MopidyClient::with_transport(transport, quiet());

        online(&client, &mut server).await;

        assert!(client.is_online());
        assert_eq!(client.ready_state(), ReadyState::Open);
        let next = client.method("playback.next").await.unwrap();
        assert_eq!(next.description(), "Next");
    }

    #[tokio::test]
    async fn no_auto_connect_stays_closed() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let client = MopidyClient::with_connector(
            RefusingConnector {
                attempts: Arc::clone(&attempts),
            },
            quiet().with_auto_connect(false),
        );
        tokio::task::yield_now().await;

        assert_eq!(client.ready_state(), ReadyState::Closed);
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
        let err = client.call("core.get_version", None).await.unwrap_err();
        assert_eq!(err.to_string(), "WebSocket is closed");
    }

    #[tokio::test]
    async fn call_before_open_is_still_connecting() {
        let (transport, _server) = mock_pair();
        let client = MopidyClient::with_transport(transport, quiet());
        let future = client.call("core.get_version", None);
        assert!(future.is_rejected());
        assert_eq!(
            future.await.unwrap_err().to_string(),
            "WebSocket is still connecting"
        );
    }

    #[tokio::test]
    async fn remote_method_round_trip() {
        let (transport, mut server) = mock_pair();
        let client = MopidyClient::with_transport(transport, quiet());
        online(&client, &mut server).await;

        let next = client.method("playback.next").await.unwrap();
        let future = next.call(&[json!({"force": true})]);
        let request = server.next_request().await;
        assert_eq!(request["method"], "core.playback.next");
        assert_eq!(request["params"], json!({"force": true}));
        assert_eq!(request["id"], json!(future.request_id().unwrap()));

        server.reply(&request["id"], json!("done"));
        assert_eq!(future.await.unwrap(), json!("done"));
    }

    #[tokio::test]
    async fn close_rejects_outstanding_calls() {
        let (transport, mut server) = mock_pair();
        let client = MopidyClient::with_transport(transport, quiet());
        online(&client, &mut server).await;

        let pending = client.call("core.playback.get_state", None);
        let _ = server.next_request().await;
        client.close().unwrap();

        let err = pending.await.unwrap_err();
        assert_eq!(err.to_string(), "WebSocket closed");
        assert_eq!(err.close_info(), Some(&CloseInfo::client_closed()));
        assert!(!client.is_online());
        assert!(client.api().await.is_none());
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop() {
        let (transport, mut server) = mock_pair();
        let mut client = MopidyClient::with_transport(transport, quiet());
        online(&client, &mut server).await;

        client.shutdown().await;
        assert_eq!(client.ready_state(), ReadyState::Closed);
        assert!(client.connect().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn failed_connect_reports_error_then_close() {
        let hub = Arc::new(EventHub::new());
        let seen = Arc::new(StdMutex::new(Vec::new()));
        for name in [
            names::WEBSOCKET_ERROR,
            names::WEBSOCKET_CLOSE,
            names::STATE_OFFLINE,
            names::RECONNECTION_PENDING,
        ] {
            let seen = Arc::clone(&seen);
            hub.on(name, move |signal: &Signal| {
                seen.lock().unwrap().push(signal.name().into_owned());
            });
        }
        let mut pending = hub.subscribe(names::RECONNECTION_PENDING);

        let attempts = Arc::new(AtomicUsize::new(0));
        let mut client = MopidyClient::start(
            RefusingConnector {
                attempts: Arc::clone(&attempts),
            },
            quiet(),
            Arc::clone(&hub),
        );
        pending.recv().await.unwrap();

        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "websocket:error",
                "websocket:close",
                "state:offline",
                "reconnectionPending"
            ]
        );
        client.shutdown().await;
    }
}
