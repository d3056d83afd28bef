//! # Mopidy Client
//!
//! Async Rust client for the [Mopidy](https://mopidy.com) music server's
//! JSON-RPC 2.0 API over WebSocket.
//!
//! A [`MopidyClient`] keeps one session with the server: it connects,
//! discovers the server's methods and builds a navigable [`ApiTree`] from
//! them, correlates calls with their responses, re-publishes server events
//! and reconnects with exponential backoff when the channel drops.
//!
//! ## Features
//!
//! - **Transport-agnostic**: implement [`Transport`] and [`Connector`] for any backend
//! - **WebSocket built-in**: the default `transport-websocket` feature provides
//!   [`WebSocketTransport`] and [`WebSocketConnector`]
//! - **Event-driven**: lifecycle and server events are published on an
//!   [`EventHub`] as typed [`Signal`]s, to callbacks or channels
//! - **Self-describing**: the API tree is built from `core.describe` on every
//!   connection, so it always matches the server's version
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use mopidy_client::{names, MopidyClient, MopidyConfig};
//!
//! let client = MopidyClient::new(MopidyConfig::for_host("localhost:6680", false));
//! let mut online = client.subscribe(names::STATE_ONLINE);
//! online.recv().await;
//!
//! let api = client.api().await.expect("online");
//! let volume = api.method("mixer.getVolume").expect("declared").call(&[]).await?;
//! println!("volume: {volume}");
//! ```

pub mod api;
pub mod client;
pub mod config;
mod correlator;
pub mod error;
pub mod event;
pub mod hub;
pub mod log;
pub mod protocol;
pub mod reconnect;
mod router;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use api::{ApiNode, ApiTree, Namespace, RemoteMethod};
pub use client::MopidyClient;
pub use config::MopidyConfig;
pub use correlator::ResponseFuture;
pub use error::{MopidyError, Result};
pub use event::{names, Signal, StateChange};
pub use hub::{EventHub, ListenerId};
pub use log::{LogSink, SilentSink, TracingSink};
pub use protocol::{ApiCatalog, MethodSpec, ParamSpec, Params};
pub use reconnect::Backoff;
pub use transport::{CloseInfo, Connector, PrebuiltConnector, ReadyState, Transport};

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
