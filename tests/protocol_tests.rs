#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Wire-format tests for the Mopidy client.
//!
//! Checks request envelopes, parameter shapes, error objects and method
//! catalogs against JSON as a Mopidy server actually produces it.

use mopidy_client::protocol::{
    snake_to_camel, ApiCatalog, Params, Request, RpcErrorObject, DESCRIBE_METHOD, JSONRPC_VERSION,
};
use mopidy_client::{names, CloseInfo, MopidyError, Signal, StateChange};
use serde_json::{json, Value};
use std::time::Duration;

// ════════════════════════════════════════════════════════════════════
// Request envelopes
// ════════════════════════════════════════════════════════════════════

#[test]
fn request_without_params_omits_the_key() {
    let request = Request::new(0, DESCRIBE_METHOD, None);
    assert_eq!(
        serde_json::to_value(&request).unwrap(),
        json!({"jsonrpc": "2.0", "id": 0, "method": "core.describe"})
    );
}

#[test]
fn request_with_positional_params() {
    let params = Params::try_from(json!([["file:///a.mp3"], 0])).unwrap();
    let request = Request::new(41, "core.tracklist.add", Some(params));
    assert_eq!(
        serde_json::to_string(&request).unwrap(),
        r#"{"jsonrpc":"2.0","id":41,"method":"core.tracklist.add","params":[["file:///a.mp3"],0]}"#
    );
}

#[test]
fn request_with_named_params() {
    let params = Params::try_from(json!({"uris": ["spotify:track:1"]})).unwrap();
    let request = Request::new(7, "core.tracklist.add", Some(params));
    let value = serde_json::to_value(&request).unwrap();
    assert_eq!(value["jsonrpc"], JSONRPC_VERSION);
    assert_eq!(value["params"], json!({"uris": ["spotify:track:1"]}));
}

#[test]
fn params_reject_scalars() {
    for scalar in [json!("x"), json!(3), json!(2.5), json!(false), Value::Null] {
        assert!(matches!(
            Params::try_from(scalar),
            Err(MopidyError::InvalidArgumentType)
        ));
    }
}

// ════════════════════════════════════════════════════════════════════
// Error objects
// ════════════════════════════════════════════════════════════════════

#[test]
fn server_error_object_maps_to_server_error() {
    // As produced by Mopidy for an unknown method.
    let object: RpcErrorObject = serde_json::from_value(json!({
        "code": -32601,
        "message": "Method not found",
        "data": {"type": "ValueError", "message": "Unknown method"}
    }))
    .unwrap();

    let err = MopidyError::from(object);
    assert_eq!(err.server_code(), Some(-32601));
    assert_eq!(err.to_string(), "Method not found");
    match err {
        MopidyError::Server { data, .. } => {
            assert_eq!(data.unwrap()["type"], "ValueError");
        }
        other => panic!("expected server error, got {other:?}"),
    }
}

#[test]
fn error_object_without_data() {
    let object: RpcErrorObject =
        serde_json::from_value(json!({"code": -32700, "message": "Parse error"})).unwrap();
    assert_eq!(object.code, -32700);
    assert!(object.data.is_none());
}

// ════════════════════════════════════════════════════════════════════
// Method catalogs
// ════════════════════════════════════════════════════════════════════

/// An excerpt of `core.describe` from Mopidy 3.
const DESCRIBE_FIXTURE: &str = r#"{
    "core.get_uri_schemes": {
        "description": "Get list of URI schemes we can handle",
        "params": []
    },
    "core.library.search": {
        "description": "Search the library for tracks where field contains values.",
        "params": [
            {"name": "query", "default": null},
            {"name": "uris", "default": null},
            {"name": "exact", "default": false}
        ]
    },
    "core.playback.play": {
        "description": "Play the given track.",
        "params": [
            {"name": "tl_track", "default": null},
            {"name": "tlid", "default": null}
        ]
    },
    "core.tracklist.filter": {
        "description": "Filter the tracklist by the given criterias.",
        "params": [
            {"name": "criteria", "default": null},
            {"name": "kwargs", "kwargs": true}
        ]
    },
    "core.history.get_history": {
        "description": "Get the track history.",
        "params": [{"name": "args", "varargs": true}]
    }
}"#;

#[test]
fn describe_fixture_parses() {
    let catalog: ApiCatalog = serde_json::from_str(DESCRIBE_FIXTURE).unwrap();
    assert_eq!(catalog.len(), 5);

    let search = &catalog["core.library.search"];
    assert_eq!(search.params.len(), 3);
    assert_eq!(search.params[2].default, Some(json!(false)));

    let filter = &catalog["core.tracklist.filter"];
    assert!(filter.params[1].kwargs);
    assert!(!filter.params[1].varargs);

    let history = &catalog["core.history.get_history"];
    assert!(history.params[0].varargs);
}

#[test]
fn null_default_is_distinct_from_no_default() {
    let catalog: ApiCatalog = serde_json::from_str(DESCRIBE_FIXTURE).unwrap();
    let play = &catalog["core.playback.play"];
    assert_eq!(play.params[0].default, Some(Value::Null));

    let filter = &catalog["core.tracklist.filter"];
    assert_eq!(filter.params[1].default, None);
}

#[test]
fn catalog_entry_may_omit_fields() {
    let catalog: ApiCatalog = serde_json::from_value(json!({"hello": {}})).unwrap();
    assert_eq!(catalog["hello"].description, "");
    assert!(catalog["hello"].params.is_empty());
}

// ════════════════════════════════════════════════════════════════════
// Naming
// ════════════════════════════════════════════════════════════════════

#[test]
fn snake_case_becomes_camel_case() {
    let cases = [
        ("get_state", "getState"),
        ("track_playback_started", "trackPlaybackStarted"),
        ("mighty_greetings", "mightyGreetings"),
        ("playback", "playback"),
        ("set_volume_2", "setVolume_2"),
    ];
    for (wire, client) in cases {
        assert_eq!(snake_to_camel(wire), client, "{wire}");
    }
}

#[test]
fn signal_names() {
    let cases = [
        (Signal::Online, names::STATE_ONLINE),
        (Signal::Offline, names::STATE_OFFLINE),
        (Signal::State(StateChange::Reconnecting), names::STATE),
        (
            Signal::ReconnectionPending {
                time_to_attempt: Duration::from_secs(1),
            },
            names::RECONNECTION_PENDING,
        ),
        (Signal::Reconnecting, names::RECONNECTING),
        (Signal::WebSocketOpen, names::WEBSOCKET_OPEN),
        (
            Signal::WebSocketClose(CloseInfo::default()),
            names::WEBSOCKET_CLOSE,
        ),
        (Signal::WebSocketError(String::new()), names::WEBSOCKET_ERROR),
        (
            Signal::WebSocketIncomingMessage(String::new()),
            names::WEBSOCKET_INCOMING_MESSAGE,
        ),
        (
            Signal::WebSocketOutgoingMessage(Value::Null),
            names::WEBSOCKET_OUTGOING_MESSAGE,
        ),
    ];
    for (signal, name) in cases {
        assert_eq!(signal.name(), name);
    }
}

#[test]
fn server_event_signals_are_named_after_the_event() {
    let event = Signal::Event {
        name: "event:volumeChanged".into(),
        data: Default::default(),
    };
    let specific = Signal::ServerEvent {
        name: "event:volumeChanged".into(),
        data: Default::default(),
    };
    assert_eq!(event.name(), names::EVENT);
    assert_eq!(specific.name(), "event:volumeChanged");
}
