//! The callable API tree built from the server's method catalog.
//!
//! On every successful connection the session calls `core.describe` and
//! feeds the catalog through an [`ApiBuilder`]. Dotted wire names become a
//! tree of [`Namespace`]s with [`RemoteMethod`] leaves: the leading `core`
//! segment is dropped and every segment is translated to camelCase, so
//! `core.playback.get_state` is reachable as `playback.getState`.
//!
//! A fresh tree is built for each connection. Trees obtained before a
//! reconnect keep working (their methods send through the same session) but
//! reflect the old catalog; re-read [`MopidyClient::api`](crate::client::MopidyClient::api)
//! after `state:online` to pick up the new one.

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::client::Caller;
use crate::correlator::ResponseFuture;
use crate::error::{MopidyError, Result};
use crate::protocol::{snake_to_camel, ApiCatalog, MethodSpec, ParamSpec, Params, CORE_NAMESPACE};

/// One node of the API tree.
#[derive(Debug, Clone)]
pub enum ApiNode {
    /// A group of nodes, e.g. `playback`.
    Namespace(Namespace),
    /// A callable remote method, e.g. `playback.next`.
    ///
    /// When the catalog also declares methods below the method's own path
    /// (`hello` and `hello.world`), they are kept in `members`.
    Method {
        /// The method itself.
        method: RemoteMethod,
        /// Nodes declared below the method's path.
        members: Namespace,
    },
}

impl ApiNode {
    /// The namespace, if this node is one.
    pub fn as_namespace(&self) -> Option<&Namespace> {
        match self {
            Self::Namespace(namespace) => Some(namespace),
            Self::Method { .. } => None,
        }
    }

    /// The method, if this node is one.
    pub fn as_method(&self) -> Option<&RemoteMethod> {
        match self {
            Self::Method { method, .. } => Some(method),
            Self::Namespace(_) => None,
        }
    }

    /// Nodes below this one: the namespace itself, or a method's members.
    pub fn children(&self) -> &Namespace {
        match self {
            Self::Namespace(namespace) => namespace,
            Self::Method { members, .. } => members,
        }
    }
}

/// Named children of a namespace, keyed by camelCase segment.
#[derive(Debug, Clone, Default)]
pub struct Namespace {
    children: BTreeMap<String, ApiNode>,
}

impl Namespace {
    /// Direct child called `name`.
    pub fn get(&self, name: &str) -> Option<&ApiNode> {
        self.children.get(name)
    }

    /// Direct child namespace called `name`.
    pub fn namespace(&self, name: &str) -> Option<&Namespace> {
        self.get(name).and_then(ApiNode::as_namespace)
    }

    /// Direct child method called `name`.
    pub fn method(&self, name: &str) -> Option<&RemoteMethod> {
        self.get(name).and_then(ApiNode::as_method)
    }

    /// Node at a dotted client-side path such as `"tracklist.getTracks"`.
    pub fn lookup(&self, path: &str) -> Option<&ApiNode> {
        let mut segments = path.split('.');
        let mut node = self.get(segments.next()?)?;
        for segment in segments {
            node = node.children().get(segment)?;
        }
        Some(node)
    }

    /// Children in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ApiNode)> {
        self.children.iter().map(|(name, node)| (name.as_str(), node))
    }

    /// Number of direct children.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Returns `true` if the namespace has no children.
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Every method below this namespace, depth first in name order.
    pub fn methods(&self) -> Vec<&RemoteMethod> {
        let mut out = Vec::new();
        self.collect_methods(&mut out);
        out
    }

    fn collect_methods<'a>(&'a self, out: &mut Vec<&'a RemoteMethod>) {
        for node in self.children.values() {
            match node {
                ApiNode::Method { method, members } => {
                    out.push(method);
                    members.collect_methods(out);
                }
                ApiNode::Namespace(namespace) => namespace.collect_methods(out),
            }
        }
    }
}

/// The root of a materialized API.
#[derive(Debug, Clone, Default)]
pub struct ApiTree {
    root: Namespace,
}

impl ApiTree {
    /// The root namespace.
    pub fn root(&self) -> &Namespace {
        &self.root
    }

    /// Method at a dotted client-side path such as `"playback.next"`.
    pub fn method(&self, path: &str) -> Option<&RemoteMethod> {
        self.root.lookup(path).and_then(ApiNode::as_method)
    }

    /// Namespace at a dotted client-side path such as `"playback"`.
    pub fn namespace(&self, path: &str) -> Option<&Namespace> {
        self.root.lookup(path).and_then(ApiNode::as_namespace)
    }
}

impl std::ops::Deref for ApiTree {
    type Target = Namespace;

    fn deref(&self) -> &Namespace {
        &self.root
    }
}

/// A remote method bound to a session.
#[derive(Clone)]
pub struct RemoteMethod {
    name: String,
    description: String,
    params: Vec<ParamSpec>,
    caller: Caller,
}

impl RemoteMethod {
    /// Fully dotted wire name, e.g. `core.playback.next`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The server's description of the method.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The server's declared parameters.
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    /// Invoke the method.
    ///
    /// - no arguments: sent without `params`
    /// - one array: sent as positional `params`
    /// - one object: sent as named `params`
    ///
    /// More than one argument rejects with [`MopidyError::InvalidArguments`],
    /// and a single argument of any other type rejects with
    /// [`MopidyError::InvalidArgumentType`]. Neither touches the transport.
    pub fn call(&self, args: &[Value]) -> ResponseFuture {
        match args {
            [] => self.caller.send(self.name.clone(), None),
            [arg] => match Params::try_from(arg.clone()) {
                Ok(params) => self.caller.send(self.name.clone(), Some(params)),
                Err(error) => ResponseFuture::rejected(error),
            },
            _ => ResponseFuture::rejected(MopidyError::InvalidArguments),
        }
    }

    /// Invoke the method with `params` serialized to a single argument.
    ///
    /// Structs and maps become named parameters, sequences and tuples become
    /// positional parameters.
    pub fn call_with<P: Serialize>(&self, params: P) -> ResponseFuture {
        match serde_json::to_value(params) {
            Ok(value) => self.call(std::slice::from_ref(&value)),
            Err(error) => ResponseFuture::rejected(error.into()),
        }
    }
}

impl fmt::Debug for RemoteMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteMethod")
            .field("name", &self.name)
            .field("params", &self.params.len())
            .finish_non_exhaustive()
    }
}

/// Builds an [`ApiTree`] from catalog entries.
pub(crate) struct ApiBuilder {
    root: Namespace,
    caller: Caller,
}

impl ApiBuilder {
    pub(crate) fn new(caller: Caller) -> Self {
        Self {
            root: Namespace::default(),
            caller,
        }
    }

    /// Attach every catalog entry. Entries that land on a path already taken
    /// by a method are skipped and returned.
    pub(crate) fn build(mut self, catalog: ApiCatalog) -> (ApiTree, Vec<MopidyError>) {
        let mut conflicts = Vec::new();
        for (name, spec) in catalog {
            if let Err(error) = self.insert(name, spec) {
                conflicts.push(error);
            }
        }
        (ApiTree { root: self.root }, conflicts)
    }

    /// Attach one method, creating intermediate namespaces as needed.
    ///
    /// A method and a namespace may share a path in either order; the
    /// namespace's children become the method's members.
    pub(crate) fn insert(&mut self, full_name: String, spec: MethodSpec) -> Result<()> {
        let segments = client_path(&full_name);
        let Some((leaf, parents)) = segments.split_last() else {
            return Err(conflict(&full_name, "", "namespace"));
        };

        let mut namespace = &mut self.root;
        for segment in parents {
            let node = namespace
                .children
                .entry(segment.clone())
                .or_insert_with(|| ApiNode::Namespace(Namespace::default()));
            namespace = match node {
                ApiNode::Namespace(child) => child,
                ApiNode::Method { members, .. } => members,
            };
        }

        if matches!(namespace.children.get(leaf), Some(ApiNode::Method { .. })) {
            return Err(conflict(&full_name, &segments.join("."), "method"));
        }
        let members = match namespace.children.remove(leaf) {
            Some(ApiNode::Namespace(members)) => members,
            _ => Namespace::default(),
        };
        namespace.children.insert(
            leaf.clone(),
            ApiNode::Method {
                method: RemoteMethod {
                    name: full_name,
                    description: spec.description,
                    params: spec.params,
                    caller: self.caller.clone(),
                },
                members,
            },
        );
        Ok(())
    }
}

/// `core.mighty_greetings.hello_world` → `["mightyGreetings", "helloWorld"]`.
pub(crate) fn client_path(full_name: &str) -> Vec<String> {
    let mut segments: Vec<&str> = full_name.split('.').collect();
    if segments.first() == Some(&CORE_NAMESPACE) {
        segments.remove(0);
    }
    segments.into_iter().map(snake_to_camel).collect()
}

fn conflict(method: &str, path: &str, existing: &'static str) -> MopidyError {
    MopidyError::ApiConflict {
        method: method.to_string(),
        path: path.to_string(),
        existing,
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

    fn spec(description: &str) -> MethodSpec {
        MethodSpec {
            description: description.into(),
            params: vec![],
        }
    }

    fn build(catalog: Value) -> (ApiTree, Vec<MopidyError>) {
        let catalog: ApiCatalog = serde_json::from_value(catalog).unwrap();
        ApiBuilder::new(Caller::detached()).build(catalog)
    }

    #[test]
    fn client_path_drops_core_and_camel_cases() {
        assert_eq!(client_path("hello"), vec!["hello"]);
        assert_eq!(client_path("core.hello.world"), vec!["hello", "world"]);
        assert_eq!(
            client_path("mighty_greetings.hello_world"),
            vec!["mightyGreetings", "helloWorld"]
        );
        assert_eq!(client_path("library.core.x"), vec!["library", "core", "x"]);
    }

    #[test]
    fn top_level_method_keeps_metadata() {
        let (tree, conflicts) = build(json!({
            "hello": {"description": "d", "params": [{"name": "a"}]}
        }));
        assert!(conflicts.is_empty());

        let hello = tree.method("hello").unwrap();
        assert_eq!(hello.name(), "hello");
        assert_eq!(hello.description(), "d");
        assert_eq!(hello.params()[0].name, "a");
    }

    #[test]
    fn core_prefix_is_dropped() {
        let (tree, _) = build(json!({"core.hello.world": {"description": "", "params": []}}));
        assert!(tree.get("core").is_none());
        let world = tree.namespace("hello").unwrap().method("world").unwrap();
        assert_eq!(world.name(), "core.hello.world");
    }

    #[test]
    fn segments_are_camel_cased() {
        let (tree, _) = build(json!({
            "mighty_greetings.hello_world": {"description": "", "params": []}
        }));
        assert!(tree.method("mightyGreetings.helloWorld").is_some());
        assert!(tree.lookup("mighty_greetings").is_none());
    }

    #[test]
    fn siblings_share_namespace() {
        let (tree, _) = build(json!({
            "core.playback.next": {"description": "n", "params": []},
            "core.playback.previous": {"description": "p", "params": []},
            "core.mixer.get_volume": {"description": "v", "params": []}
        }));
        let playback = tree.namespace("playback").unwrap();
        assert_eq!(playback.len(), 2);
        assert_eq!(tree.len(), 2);
        let names: Vec<&str> = tree.methods().iter().map(|m| m.name()).collect();
        assert_eq!(
            names,
            vec!["core.mixer.get_volume", "core.playback.next", "core.playback.previous"]
        );
    }

    #[test]
    fn method_and_namespace_share_a_path() {
        let (tree, conflicts) = build(json!({
            "core.playback": {"description": "p", "params": []},
            "core.playback.next": {"description": "n", "params": []}
        }));
        assert!(conflicts.is_empty());
        assert_eq!(tree.method("playback").unwrap().name(), "core.playback");
        assert_eq!(tree.method("playback.next").unwrap().name(), "core.playback.next");
        assert!(tree.namespace("playback").is_none());
    }

    #[test]
    fn method_adopts_namespace_declared_before_it() {
        let mut builder = ApiBuilder::new(Caller::detached());
        builder.insert("core.hello.world".into(), spec("w")).unwrap();
        builder.insert("hello".into(), spec("h")).unwrap();
        let tree = ApiTree { root: builder.root };

        assert_eq!(tree.method("hello").unwrap().description(), "h");
        assert_eq!(tree.method("hello.world").unwrap().description(), "w");
        let names: Vec<&str> = tree.methods().iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["hello", "core.hello.world"]);
        assert_eq!(tree.lookup("hello").unwrap().children().len(), 1);
    }

    #[test]
    fn duplicate_leaf_after_translation_is_reported() {
        let mut builder = ApiBuilder::new(Caller::detached());
        builder.insert("a.get_x".into(), spec("first")).unwrap();
        let err = builder.insert("core.a.get_x".into(), spec("second")).unwrap_err();
        assert!(matches!(err, MopidyError::ApiConflict { existing: "method", .. }));
    }

    #[tokio::test]
    async fn too_many_arguments_rejects_without_sending() {
        let (tree, _) = build(json!({"hello": {"description": "", "params": []}}));
        let future = tree.method("hello").unwrap().call(&[json!([]), json!({})]);
        assert!(future.is_rejected());
        let err = future.await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Expected zero arguments, a single array, or a single object."
        );
    }

    #[tokio::test]
    async fn scalar_argument_rejects_with_type_error() {
        let (tree, _) = build(json!({"hello": {"description": "", "params": []}}));
        let hello = tree.method("hello").unwrap();
        for arg in [json!("x"), json!(42)] {
            let err = hello.call(&[arg]).await.unwrap_err();
            assert!(matches!(err, MopidyError::InvalidArgumentType));
            assert_eq!(err.to_string(), "Expected an array or an object.");
        }
    }

    #[tokio::test]
    async fn detached_caller_reports_closed() {
        let (tree, _) = build(json!({"hello": {"description": "", "params": []}}));
        let err = tree.method("hello").unwrap().call(&[]).await.unwrap_err();
        assert_eq!(err.to_string(), "WebSocket is closed");
    }
}
