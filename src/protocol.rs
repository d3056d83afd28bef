//! Wire types for the Mopidy JSON-RPC 2.0 WebSocket protocol.
//!
//! Outbound calls are JSON-RPC requests. Inbound frames are either JSON-RPC
//! responses (they carry an `id`) or server-pushed events (they carry an
//! `event` key naming the event in `snake_case`, with the payload fields
//! alongside it). Classification of inbound frames lives in
//! [`router`](crate::router).

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use crate::error::MopidyError;

/// The only JSON-RPC version spoken by the server.
pub const JSONRPC_VERSION: &str = "2.0";

/// Introspection method returning the [`ApiCatalog`].
pub const DESCRIBE_METHOD: &str = "core.describe";

/// Top-level namespace that is dropped when materializing the API, so that
/// `core.playback.next` is exposed as `playback.next`.
pub const CORE_NAMESPACE: &str = "core";

/// Identifier of an outbound call.
pub type RequestId = u64;

/// Parameters of an outbound call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Params {
    /// Positional parameters (`"params": [...]`).
    Positional(Vec<Value>),
    /// Named parameters (`"params": {...}`).
    Named(Map<String, Value>),
}

impl TryFrom<Value> for Params {
    type Error = MopidyError;

    /// Arrays become positional parameters and objects become named
    /// parameters. Anything else is rejected with
    /// [`MopidyError::InvalidArgumentType`].
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Array(items) => Ok(Self::Positional(items)),
            Value::Object(fields) => Ok(Self::Named(fields)),
            _ => Err(MopidyError::InvalidArgumentType),
        }
    }
}

impl From<Vec<Value>> for Params {
    fn from(items: Vec<Value>) -> Self {
        Self::Positional(items)
    }
}

impl From<Map<String, Value>> for Params {
    fn from(fields: Map<String, Value>) -> Self {
        Self::Named(fields)
    }
}

/// A JSON-RPC request envelope as written to the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Always [`JSONRPC_VERSION`].
    pub jsonrpc: String,
    /// Call identifier, echoed back in the response.
    pub id: RequestId,
    /// Fully dotted method name, e.g. `core.playback.next`.
    pub method: String,
    /// Call parameters. Omitted from the wire when `None`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Params>,
}

impl Request {
    /// Build a request envelope for `method`.
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Params>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// The `error` member of a JSON-RPC error response.
///
/// Missing members default so that a sloppy error object still fails the
/// call as a server error rather than as a malformed response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RpcErrorObject {
    /// JSON-RPC error code.
    #[serde(default)]
    pub code: i64,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
    /// Optional extra payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl From<RpcErrorObject> for MopidyError {
    fn from(error: RpcErrorObject) -> Self {
        MopidyError::Server {
            code: error.code,
            message: error.message,
            data: error.data,
        }
    }
}

/// Declared parameter of a remote method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamSpec {
    /// Parameter name.
    pub name: String,
    /// `*args`-style parameter.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub varargs: bool,
    /// `**kwargs`-style parameter.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub kwargs: bool,
    /// Default value. `Some(Value::Null)` means the default is `null`; `None`
    /// means the parameter has no default.
    #[serde(
        default,
        deserialize_with = "present_value",
        skip_serializing_if = "Option::is_none"
    )]
    pub default: Option<Value>,
}

/// Distinguishes `"default": null` from an absent `default` key.
fn present_value<'de, D>(deserializer: D) -> Result<Option<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Value::deserialize(deserializer).map(Some)
}

/// Server-declared metadata for one remote method.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct MethodSpec {
    /// Human description (usually the method's docstring).
    #[serde(default)]
    pub description: String,
    /// Declared parameters, in order.
    #[serde(default)]
    pub params: Vec<ParamSpec>,
}

/// Result of [`DESCRIBE_METHOD`]: fully dotted method name to its metadata.
pub type ApiCatalog = BTreeMap<String, MethodSpec>;

/// Translate a `snake_case` wire identifier to the client's `camelCase`.
///
/// Only an underscore followed by a lower-case ASCII letter is folded, so
/// `track_playback_started` becomes `trackPlaybackStarted` while `volume_2`
/// keeps its underscore.
pub fn snake_to_camel(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut chars = name.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '_' {
            if let Some(&next) = chars.peek() {
                if next.is_ascii_lowercase() {
                    out.push(next.to_ascii_uppercase());
                    chars.next();
                    continue;
                }
            }
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_without_params_omits_the_key() {
        let json = serde_json::to_value(Request::new(7, "core.playback.next", None)).unwrap();
        assert_eq!(
            json,
            json!({"jsonrpc": "2.0", "id": 7, "method": "core.playback.next"})
        );
    }

    #[test]
    fn request_params_serialize_untagged() {
        let positional = Request::new(1, "a", Some(Params::Positional(vec![json!(1)])));
        assert_eq!(serde_json::to_value(positional).unwrap()["params"], json!([1]));

        let mut named = Map::new();
        named.insert("uri".into(), json!("spotify:x"));
        let named = Request::new(2, "b", Some(Params::Named(named)));
        assert_eq!(
            serde_json::to_value(named).unwrap()["params"],
            json!({"uri": "spotify:x"})
        );
    }

    #[test]
    fn params_try_from_rejects_scalars() {
        assert!(matches!(
            Params::try_from(json!([1, 2])),
            Ok(Params::Positional(_))
        ));
        assert!(matches!(Params::try_from(json!({})), Ok(Params::Named(_))));
        for scalar in [json!("x"), json!(3), json!(null), json!(true)] {
            assert!(matches!(
                Params::try_from(scalar),
                Err(MopidyError::InvalidArgumentType)
            ));
        }
    }

    #[test]
    fn catalog_parses_param_specs() {
        let catalog: ApiCatalog = serde_json::from_value(json!({
            "core.tracklist.add": {
                "description": "Add tracks",
                "params": [
                    {"name": "tracks", "default": null},
                    {"name": "at_position"},
                    {"name": "args", "varargs": true},
                    {"name": "kwargs", "kwargs": true}
                ]
            },
            "core.get_version": {"description": "", "params": []}
        }))
        .unwrap();

        let add = &catalog["core.tracklist.add"];
        assert_eq!(add.description, "Add tracks");
        assert_eq!(add.params[0].default, Some(Value::Null));
        assert_eq!(add.params[1].default, None);
        assert!(add.params[2].varargs);
        assert!(add.params[3].kwargs);
        assert!(catalog.contains_key("core.get_version"));
    }

    #[test]
    fn rpc_error_object_tolerates_missing_members() {
        let error: RpcErrorObject = serde_json::from_value(json!({"message": "boom"})).unwrap();
        assert_eq!(error.code, 0);
        assert_eq!(error.message, "boom");
        assert!(error.data.is_none());
    }

    #[test]
    fn snake_to_camel_translates_wire_names() {
        assert_eq!(snake_to_camel("track_playback_started"), "trackPlaybackStarted");
        assert_eq!(snake_to_camel("mighty_greetings"), "mightyGreetings");
        assert_eq!(snake_to_camel("hello"), "hello");
        assert_eq!(snake_to_camel("volume_2"), "volume_2");
        assert_eq!(snake_to_camel("trailing_"), "trailing_");
        assert_eq!(snake_to_camel("_private"), "Private");
    }
}
