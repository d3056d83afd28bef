//! # Status Example
//!
//! Follows a Mopidy server:
//!
//! 1. Connect over WebSocket and wait for the API tree
//! 2. Print the playback state, the volume and the tracklist length
//! 3. Log every server event until Ctrl+C
//! 4. Ride out server restarts with the built-in reconnection
//!
//! ## Running
//!
//! ```sh
//! # Start Mopidy with the HTTP frontend on localhost:6680, then:
//! cargo run --example status
//!
//! # Override the server URL:
//! MOPIDY_URL=ws://my-server:6680/mopidy/ws cargo run --example status
//! ```

use mopidy_client::{names, MopidyClient, MopidyConfig, Signal};

/// Default server URL when `MOPIDY_URL` is not set.
const DEFAULT_URL: &str = "ws://localhost:6680/mopidy/ws";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // ── Logging ─────────────────────────────────────────────────────
    // Set `RUST_LOG=debug` for verbose output.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let url = std::env::var("MOPIDY_URL").unwrap_or_else(|_| DEFAULT_URL.to_string());
    tracing::info!("Connecting to {url}");

    let mut client = MopidyClient::new(MopidyConfig::new(url));
    let mut online = client.subscribe(names::STATE_ONLINE);
    let mut offline = client.subscribe(names::STATE_OFFLINE);
    let mut events = client.subscribe(names::EVENT);
    client.on(names::RECONNECTION_PENDING, |signal: &Signal| {
        if let Signal::ReconnectionPending { time_to_attempt } = signal {
            tracing::info!("Reconnecting in {time_to_attempt:?}");
        }
    });

    // ── Event loop ──────────────────────────────────────────────────
    loop {
        tokio::select! {
            Some(_) = online.recv() => {
                if let Err(e) = print_status(&client).await {
                    tracing::warn!("Status query failed: {e}");
                }
            }

            Some(_) = offline.recv() => {
                tracing::info!("Server went away");
            }

            Some(signal) = events.recv() => {
                if let Signal::Event { name, data } = signal {
                    tracing::info!("{name}: {}", serde_json::Value::Object(data));
                }
            }

            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Ctrl+C received, shutting down");
                break;
            }
        }
    }

    client.shutdown().await;
    Ok(())
}

async fn print_status(client: &MopidyClient) -> Result<(), Box<dyn std::error::Error>> {
    let Some(api) = client.api().await else {
        return Ok(());
    };

    if let Some(get_version) = api.method("getVersion") {
        let version: String = get_version.call(&[]).json().await?;
        tracing::info!("Mopidy {version}");
    }
    if let Some(get_state) = api.method("playback.getState") {
        let state: String = get_state.call(&[]).json().await?;
        tracing::info!("Playback: {state}");
    }
    if let Some(get_volume) = api.method("mixer.getVolume") {
        let volume: Option<u8> = get_volume.call(&[]).json().await?;
        match volume {
            Some(volume) => tracing::info!("Volume: {volume}"),
            None => tracing::info!("Volume: unknown"),
        }
    }
    if let Some(get_length) = api.method("tracklist.getLength") {
        let length: u64 = get_length.call(&[]).json().await?;
        tracing::info!("Tracklist: {length} tracks");
    }

    let methods = api.methods().len();
    let namespaces = api
        .iter()
        .filter(|(_, node)| node.as_namespace().is_some())
        .count();
    tracing::info!("API: {methods} methods in {namespaces} namespaces");
    Ok(())
}
