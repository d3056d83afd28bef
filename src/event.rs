//! Signals published by a session through its [`EventHub`](crate::hub::EventHub).
//!
//! Every [`Signal`] has a name (see [`Signal::name`]) that listeners subscribe
//! to. Lifecycle signals have fixed names listed in [`names`]; re-emitted
//! server events are published twice, once on the aggregate `event` name and
//! once on `event:<camelCaseName>`.

use std::borrow::Cow;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::transport::CloseInfo;

/// Signal names accepted by [`EventHub::on`](crate::hub::EventHub::on).
pub mod names {
    /// Aggregate lifecycle signal, carries a [`StateChange`](super::StateChange).
    pub const STATE: &str = "state";
    /// The API tree is built and the session is ready.
    pub const STATE_ONLINE: &str = "state:online";
    /// The channel closed.
    pub const STATE_OFFLINE: &str = "state:offline";
    /// A reconnection attempt is scheduled.
    pub const RECONNECTION_PENDING: &str = "reconnectionPending";
    /// A reconnection attempt is starting now.
    pub const RECONNECTING: &str = "reconnecting";
    /// Aggregate server event signal.
    pub const EVENT: &str = "event";
    /// Prefix of the per-type server event signals.
    pub const EVENT_PREFIX: &str = "event:";
    /// The channel opened.
    pub const WEBSOCKET_OPEN: &str = "websocket:open";
    /// The channel closed.
    pub const WEBSOCKET_CLOSE: &str = "websocket:close";
    /// The channel reported an error.
    pub const WEBSOCKET_ERROR: &str = "websocket:error";
    /// A raw frame arrived.
    pub const WEBSOCKET_INCOMING_MESSAGE: &str = "websocket:incomingMessage";
    /// A request envelope was transmitted.
    pub const WEBSOCKET_OUTGOING_MESSAGE: &str = "websocket:outgoingMessage";
}

/// Payload of the aggregate `state` signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateChange {
    /// `state:online`
    Online,
    /// `state:offline`
    Offline,
    /// `reconnectionPending`
    ReconnectionPending {
        /// Delay before the next attempt.
        time_to_attempt: Duration,
    },
    /// `reconnecting`
    Reconnecting,
}

impl StateChange {
    /// The name of the specific signal this change is mirrored on.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Online => names::STATE_ONLINE,
            Self::Offline => names::STATE_OFFLINE,
            Self::ReconnectionPending { .. } => names::RECONNECTION_PENDING,
            Self::Reconnecting => names::RECONNECTING,
        }
    }
}

/// A signal published by the session.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    /// `state`: aggregate of every lifecycle transition.
    State(StateChange),
    /// `state:online`
    Online,
    /// `state:offline`
    Offline,
    /// `reconnectionPending`
    ReconnectionPending {
        /// Delay before the next attempt.
        time_to_attempt: Duration,
    },
    /// `reconnecting`
    Reconnecting,
    /// `event`: aggregate of every server event.
    Event {
        /// Translated signal name, e.g. `event:trackPlaybackStarted`.
        name: String,
        /// Event payload without the `event` key.
        data: Map<String, Value>,
    },
    /// `event:<Name>`: one server event type.
    ServerEvent {
        /// Translated signal name, e.g. `event:trackPlaybackStarted`.
        name: String,
        /// Event payload without the `event` key.
        data: Map<String, Value>,
    },
    /// `websocket:open`
    WebSocketOpen,
    /// `websocket:close`
    WebSocketClose(CloseInfo),
    /// `websocket:error`
    WebSocketError(String),
    /// `websocket:incomingMessage`: the raw frame text.
    WebSocketIncomingMessage(String),
    /// `websocket:outgoingMessage`: the request envelope.
    WebSocketOutgoingMessage(Value),
}

impl Signal {
    /// The name listeners subscribe to for this signal.
    pub fn name(&self) -> Cow<'_, str> {
        match self {
            Self::State(_) => Cow::Borrowed(names::STATE),
            Self::Online => Cow::Borrowed(names::STATE_ONLINE),
            Self::Offline => Cow::Borrowed(names::STATE_OFFLINE),
            Self::ReconnectionPending { .. } => Cow::Borrowed(names::RECONNECTION_PENDING),
            Self::Reconnecting => Cow::Borrowed(names::RECONNECTING),
            Self::Event { .. } => Cow::Borrowed(names::EVENT),
            Self::ServerEvent { name, .. } => Cow::Borrowed(name.as_str()),
            Self::WebSocketOpen => Cow::Borrowed(names::WEBSOCKET_OPEN),
            Self::WebSocketClose(_) => Cow::Borrowed(names::WEBSOCKET_CLOSE),
            Self::WebSocketError(_) => Cow::Borrowed(names::WEBSOCKET_ERROR),
            Self::WebSocketIncomingMessage(_) => Cow::Borrowed(names::WEBSOCKET_INCOMING_MESSAGE),
            Self::WebSocketOutgoingMessage(_) => Cow::Borrowed(names::WEBSOCKET_OUTGOING_MESSAGE),
        }
    }

    /// The aggregate `state` signal and its specific counterpart, in
    /// publication order.
    pub(crate) fn state_pair(change: StateChange) -> [Signal; 2] {
        let specific = match &change {
            StateChange::Online => Signal::Online,
            StateChange::Offline => Signal::Offline,
            StateChange::ReconnectionPending { time_to_attempt } => Signal::ReconnectionPending {
                time_to_attempt: *time_to_attempt,
            },
            StateChange::Reconnecting => Signal::Reconnecting,
        };
        [Signal::State(change), specific]
    }

    /// The aggregate `event` signal and the per-type `event:<Name>` signal.
    pub(crate) fn event_pair(name: String, data: Map<String, Value>) -> [Signal; 2] {
        [
            Signal::Event {
                name: name.clone(),
                data: data.clone(),
            },
            Signal::ServerEvent { name, data },
        ]
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

    #[test]
    fn state_pair_publishes_aggregate_first() {
        let [aggregate, specific] = Signal::state_pair(StateChange::ReconnectionPending {
            time_to_attempt: Duration::from_millis(2000),
        });
        assert_eq!(aggregate.name(), "state");
        assert_eq!(specific.name(), "reconnectionPending");
        assert_eq!(
            specific,
            Signal::ReconnectionPending {
                time_to_attempt: Duration::from_millis(2000)
            }
        );
    }

    #[test]
    fn server_event_is_named_after_its_type() {
        let [aggregate, specific] =
            Signal::event_pair("event:trackPlaybackStarted".into(), Map::new());
        assert_eq!(aggregate.name(), "event");
        assert_eq!(specific.name(), "event:trackPlaybackStarted");
    }

    #[test]
    fn state_change_names_match_specific_signals() {
        for change in [
            StateChange::Online,
            StateChange::Offline,
            StateChange::Reconnecting,
            StateChange::ReconnectionPending {
                time_to_attempt: Duration::ZERO,
            },
        ] {
            let name = change.name();
            let [_, specific] = Signal::state_pair(change);
            assert_eq!(specific.name(), name);
        }
    }
}
