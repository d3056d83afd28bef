//! # Custom Transport Example
//!
//! Shows how to implement the [`Transport`] and [`Connector`] traits with an
//! in-process loopback channel, and drives a whole session against a tiny
//! fake Mopidy server:
//!
//! - the server answers `core.describe` with a two-method catalog
//! - the client calls one method through the materialized API tree
//! - the server pushes a `volume_changed` event
//!
//! ## Running
//!
//! ```sh
//! cargo run --example custom_transport
//! ```

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use mopidy_client::{
    names, Connector, MopidyClient, MopidyConfig, MopidyError, Signal, Transport,
};
use serde_json::{json, Value};
use tokio::sync::mpsc;

// ─────────────────────────────────────────────────────────────────────
// Step 1: A channel-based "loopback" transport
// ─────────────────────────────────────────────────────────────────────

/// Client half of the loopback.
pub struct LoopbackTransport {
    /// Frames the client sends go here.
    tx: mpsc::UnboundedSender<String>,
    /// Frames the server sends arrive here.
    rx: mpsc::UnboundedReceiver<String>,
}

/// Server half of the loopback.
pub struct LoopbackServer {
    /// Read what the client sent.
    pub rx: mpsc::UnboundedReceiver<String>,
    /// Send frames to the client.
    pub tx: mpsc::UnboundedSender<String>,
}

fn loopback_pair() -> (LoopbackTransport, LoopbackServer) {
    let (client_tx, server_rx) = mpsc::unbounded_channel();
    let (server_tx, client_rx) = mpsc::unbounded_channel();
    (
        LoopbackTransport {
            tx: client_tx,
            rx: client_rx,
        },
        LoopbackServer {
            rx: server_rx,
            tx: server_tx,
        },
    )
}

#[async_trait]
impl Transport for LoopbackTransport {
    async fn send(&mut self, message: String) -> Result<(), MopidyError> {
        self.tx
            .send(message)
            .map_err(|e| MopidyError::TransportSend(e.to_string()))
    }

    /// Cancel-safe because `mpsc::UnboundedReceiver::recv` is. `None` once
    /// the server half is dropped.
    async fn recv(&mut self) -> Option<Result<String, MopidyError>> {
        self.rx.recv().await.map(Ok)
    }

    async fn close(&mut self) -> Result<(), MopidyError> {
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 2: A connector that hands out loopback channels
// ─────────────────────────────────────────────────────────────────────

/// Every connection attempt creates a fresh loopback pair and passes the
/// server half to whoever serves it.
struct LoopbackConnector {
    servers: mpsc::UnboundedSender<LoopbackServer>,
    urls: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl Connector for LoopbackConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn Transport>, MopidyError> {
        if let Ok(mut urls) = self.urls.lock() {
            urls.push(url.to_string());
        }
        let (transport, server) = loopback_pair();
        self.servers
            .send(server)
            .map_err(|_| refused())?;
        Ok(Box::new(transport))
    }
}

fn refused() -> MopidyError {
    MopidyError::Io(std::io::Error::new(
        std::io::ErrorKind::ConnectionRefused,
        "no loopback server",
    ))
}

// ─────────────────────────────────────────────────────────────────────
// Step 3: A tiny fake Mopidy server
// ─────────────────────────────────────────────────────────────────────

async fn serve(mut server: LoopbackServer) {
    let mut volume = 50;
    while let Some(frame) = server.rx.recv().await {
        let Ok(request) = serde_json::from_str::<Value>(&frame) else {
            continue;
        };
        let id = request["id"].clone();
        let result = match request["method"].as_str() {
            Some("core.describe") => json!({
                "core.mixer.get_volume": {"description": "Get the volume.", "params": []},
                "core.mixer.set_volume": {
                    "description": "Set the volume.",
                    "params": [{"name": "volume"}]
                }
            }),
            Some("core.mixer.get_volume") => json!(volume),
            Some("core.mixer.set_volume") => {
                volume = request["params"]["volume"].as_i64().unwrap_or(volume);
                let event = json!({"event": "volume_changed", "volume": volume});
                let _ = server.tx.send(event.to_string());
                json!(true)
            }
            _ => {
                let error = json!({"code": -32601, "message": "Method not found"});
                let _ = server
                    .tx
                    .send(json!({"jsonrpc": "2.0", "id": id, "error": error}).to_string());
                continue;
            }
        };
        let reply = json!({"jsonrpc": "2.0", "id": id, "result": result});
        let _ = server.tx.send(reply.to_string());
    }
}

// ─────────────────────────────────────────────────────────────────────
// Step 4: Wire together the client and the fake server
// ─────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let (servers_tx, mut servers_rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Some(server) = servers_rx.recv().await {
            tokio::spawn(serve(server));
        }
    });

    let urls = Arc::new(Mutex::new(Vec::new()));
    let connector = LoopbackConnector {
        servers: servers_tx,
        urls: Arc::clone(&urls),
    };

    let mut client = MopidyClient::with_connector(connector, MopidyConfig::new("loopback://mopidy"));
    let mut online = client.subscribe(names::STATE_ONLINE);
    let mut volume_changed = client.subscribe("event:volumeChanged");
    online.recv().await;
    if let Ok(urls) = urls.lock() {
        tracing::info!("Online after {} connection attempt(s) to {:?}", urls.len(), urls.last());
    }

    let Some(set_volume) = client.method("mixer.setVolume").await else {
        return Err("server does not declare mixer.setVolume".into());
    };
    tracing::info!("{}: {}", set_volume.name(), set_volume.description());
    let accepted = set_volume.call(&[json!({"volume": 80})]).await?;
    tracing::info!("set_volume returned {accepted}");

    if let Some(Signal::ServerEvent { name, data }) = volume_changed.recv().await {
        let data = Value::Object(data);
        tracing::info!("{name}: {data}");
    }

    let volume = client.call("core.mixer.get_volume", None).await?;
    tracing::info!("Volume is now {volume}");

    match client.call("core.no_such_method", None).await {
        Err(MopidyError::Server { code, message, .. }) => {
            tracing::info!("Server error {code}: {message}");
        }
        other => tracing::warn!("Unexpected outcome: {other:?}"),
    }

    client.shutdown().await;
    tracing::info!("Shutdown complete");
    Ok(())
}
