//! Classification and dispatch of inbound frames.
//!
//! A frame carrying an `id` is a response and settles an outstanding call.
//! A frame carrying an `event` is a server event and is re-published on the
//! [`EventHub`]. Anything else, and anything that is not JSON, is logged and
//! dropped.

use serde_json::{Map, Value};

use crate::correlator::{RequestTable, Resolution};
use crate::event::{names, Signal};
use crate::hub::EventHub;
use crate::log::LogSink;
use crate::protocol::snake_to_camel;

/// A parsed inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Inbound {
    /// JSON-RPC response, the whole object.
    Response(Map<String, Value>),
    /// Server event with its translated signal name and payload.
    Event {
        name: String,
        data: Map<String, Value>,
    },
    /// Valid JSON that is neither.
    Unknown,
}

/// What [`route`] did with a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Routed {
    Response(Resolution),
    Event,
    Unknown,
    Unparseable,
}

/// Parse one frame and decide what it is.
pub(crate) fn classify(text: &str) -> Result<Inbound, serde_json::Error> {
    let Value::Object(mut fields) = serde_json::from_str::<Value>(text)? else {
        return Ok(Inbound::Unknown);
    };
    if fields.contains_key("id") {
        return Ok(Inbound::Response(fields));
    }
    match fields.remove("event") {
        Some(Value::String(event)) => Ok(Inbound::Event {
            name: event_signal_name(&event),
            data: fields,
        }),
        _ => Ok(Inbound::Unknown),
    }
}

/// `track_playback_started` → `event:trackPlaybackStarted`.
pub(crate) fn event_signal_name(event: &str) -> String {
    format!("{}{}", names::EVENT_PREFIX, snake_to_camel(event))
}

/// Classify `text` and hand it to the request table or the hub.
pub(crate) fn route(
    text: &str,
    pending: &mut RequestTable,
    hub: &EventHub,
    sink: &dyn LogSink,
) -> Routed {
    match classify(text) {
        Ok(Inbound::Response(response)) => Routed::Response(pending.resolve(response, sink)),
        Ok(Inbound::Event { name, data }) => {
            tracing::debug!(event = %name, "server event");
            hub.emit_all(Signal::event_pair(name, data));
            Routed::Event
        }
        Ok(Inbound::Unknown) => {
            sink.warn(&format!(
                "Unknown message type received. Message was: {text}"
            ));
            Routed::Unknown
        }
        Err(_) => {
            sink.warn(&format!(
                "WebSocket message parsing failed. Message was: {text}"
            ));
            Routed::Unparseable
        }
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
    use crate::correlator::next_request_id;
    use serde_json::json;
    use std::sync::{Arc, Mutex as StdMutex};
    use tokio::sync::oneshot;

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

    #[test]
    fn id_wins_over_event() {
        let inbound = classify(r#"{"id": 1, "event": "x", "result": 2}"#).unwrap();
        assert!(matches!(inbound, Inbound::Response(_)));
    }

    #[test]
    fn event_key_is_stripped_and_translated() {
        let inbound = classify(r#"{"event": "track_playback_started", "track": {"uri": "a"}}"#)
            .unwrap();
        let Inbound::Event { name, data } = inbound else {
            panic!("expected event");
        };
        assert_eq!(name, "event:trackPlaybackStarted");
        assert_eq!(Value::Object(data), json!({"track": {"uri": "a"}}));
    }

    #[test]
    fn other_json_is_unknown() {
        assert_eq!(classify(r#"{"foo": "bar"}"#).unwrap(), Inbound::Unknown);
        assert_eq!(classify("[1, 2]").unwrap(), Inbound::Unknown);
        assert_eq!(classify("42").unwrap(), Inbound::Unknown);
        assert_eq!(classify(r#"{"event": 7}"#).unwrap(), Inbound::Unknown);
    }

    #[test]
    fn garbage_fails_to_parse() {
        assert!(classify("this is not json").is_err());
    }

    #[test]
    fn route_emits_aggregate_and_specific_event() {
        let hub = EventHub::new();
        let seen = Arc::new(StdMutex::new(Vec::new()));
        for name in ["event", "event:trackPlaybackStarted"] {
            let seen = Arc::clone(&seen);
            hub.on(name, move |signal| seen.lock().unwrap().push(signal.clone()));
        }
        let mut pending = RequestTable::new();
        let sink = RecordingSink::default();

        let routed = route(
            r#"{"event": "track_playback_started", "track": "T"}"#,
            &mut pending,
            &hub,
            &sink,
        );

        assert_eq!(routed, Routed::Event);
        let mut data = Map::new();
        data.insert("track".into(), json!("T"));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                Signal::Event {
                    name: "event:trackPlaybackStarted".into(),
                    data: data.clone(),
                },
                Signal::ServerEvent {
                    name: "event:trackPlaybackStarted".into(),
                    data,
                },
            ]
        );
    }

    #[tokio::test]
    async fn route_resolves_pending_call() {
        let hub = EventHub::new();
        let mut pending = RequestTable::new();
        let id = next_request_id();
        let (tx, rx) = oneshot::channel();
        pending.insert(id, tx);

        let routed = route(
            &json!({"jsonrpc": "2.0", "id": id, "result": "ok"}).to_string(),
            &mut pending,
            &hub,
            &RecordingSink::default(),
        );

        assert_eq!(routed, Routed::Response(Resolution::Fulfilled));
        assert_eq!(rx.await.unwrap().unwrap(), json!("ok"));
    }

    #[test]
    fn route_logs_unknown_and_unparseable() {
        let hub = EventHub::new();
        let mut pending = RequestTable::new();
        let sink = RecordingSink::default();

        assert_eq!(route(r#"{"foo":1}"#, &mut pending, &hub, &sink), Routed::Unknown);
        assert_eq!(route("{oops", &mut pending, &hub, &sink), Routed::Unparseable);

        let warnings = sink.warnings.lock().unwrap();
        assert_eq!(
            warnings[0],
            r#"Unknown message type received. Message was: {"foo":1}"#
        );
        assert_eq!(
            warnings[1],
            "WebSocket message parsing failed. Message was: {oops"
        );
    }
}
