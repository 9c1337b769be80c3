#![allow(dead_code)]

use async_graphql_parser::{
    parse_query,
    types::{DocumentOperations, Selection, SelectionSet},
};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};
use stitchwork_graphql::{
    ExecutionAdapter, ExtensionManifest, ExtensionSet, Upstream, UpstreamError, UpstreamRequest,
    UpstreamResponse, UpstreamSchema,
};

pub const GITHUB_SDL: &str = include_str!("../fixtures/github.graphql");
pub const STARGAZER_MANIFEST: &str = include_str!("../fixtures/stargazers.yaml");

pub fn stargazer_extensions() -> ExtensionSet {
    ExtensionManifest::from_str(STARGAZER_MANIFEST)
        .unwrap()
        .into_registries()
        .unwrap()
}

pub fn github_data() -> Value {
    let github = json!({
        "__typename": "Organization",
        "id": "O_1",
        "login": "github",
        "name": "GitHub",
        "description": "How people build software.",
        "repositories": {
            "totalCount": 2,
            "nodes": [
                { "name": "linguist", "stargazers": { "totalCount": 3 } },
                { "name": "docs", "stargazers": { "totalCount": 7 } }
            ]
        }
    });

    json!({
        "organization": github,
        "repositoryOwner": github,
        "user": {
            "__typename": "User",
            "id": "U_1",
            "login": "octocat",
            "name": "The Octocat",
            "repositories": { "totalCount": 0, "nodes": [] }
        }
    })
}

/// An in-memory upstream answering forwarded queries from a JSON tree.
///
/// Fields are looked up by name (arguments are ignored) and written under
/// their response key. `... on T` applies when the object's `__typename` is `T`.
pub struct MockUpstream {
    data: Value,
    introspections: AtomicUsize,
    failing_introspections: AtomicUsize,
    introspection_delay: Duration,
    requests: Mutex<Vec<UpstreamRequest>>,
}

impl MockUpstream {
    pub fn new(data: Value) -> Self {
        Self {
            data,
            introspections: AtomicUsize::new(0),
            failing_introspections: AtomicUsize::new(0),
            introspection_delay: Duration::ZERO,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn github() -> Self {
        Self::new(github_data())
    }

    pub fn with_introspection_delay(mut self, delay: Duration) -> Self {
        self.introspection_delay = delay;
        self
    }

    /// Fail the next `n` introspections.
    pub fn failing_introspections(self, n: usize) -> Self {
        self.failing_introspections.store(n, Ordering::SeqCst);
        self
    }

    pub fn introspection_count(&self) -> usize {
        self.introspections.load(Ordering::SeqCst)
    }

    pub fn queries(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.query.clone())
            .collect()
    }

    pub fn requests(&self) -> Vec<UpstreamRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl Upstream for MockUpstream {
    async fn introspect(&self) -> Result<UpstreamSchema, UpstreamError> {
        self.introspections.fetch_add(1, Ordering::SeqCst);
        if !self.introspection_delay.is_zero() {
            tokio::time::sleep(self.introspection_delay).await;
        }

        let remaining = self.failing_introspections.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failing_introspections.store(remaining - 1, Ordering::SeqCst);
            return Err(UpstreamError::Transport("connection refused".to_string()));
        }

        Ok(UpstreamSchema::from_sdl(GITHUB_SDL)?)
    }

    async fn execute(&self, request: UpstreamRequest) -> Result<UpstreamResponse, UpstreamError> {
        self.requests.lock().unwrap().push(request.clone());

        let doc = parse_query(&request.query)
            .map_err(|e| UpstreamError::Decode(format!("mock could not parse query: {e}")))?;
        let op = match doc.operations {
            DocumentOperations::Single(op) => op.node,
            DocumentOperations::Multiple(ops) => ops
                .into_values()
                .next()
                .ok_or_else(|| UpstreamError::Decode("no operation".to_string()))?
                .node,
        };

        Ok(UpstreamResponse {
            data: Some(Value::Object(resolve(&self.data, &op.selection_set.node))),
            errors: Vec::new(),
        })
    }
}

fn resolve(source: &Value, set: &SelectionSet) -> Map<String, Value> {
    let mut out = Map::new();

    for item in &set.items {
        match &item.node {
            Selection::Field(f) => {
                let f = &f.node;
                let key = f.response_key().node.to_string();
                let value = source.get(f.name.node.as_str()).cloned().unwrap_or(Value::Null);
                out.insert(key, resolve_value(&value, &f.selection_set.node));
            }
            Selection::InlineFragment(inline) => {
                let applies = match &inline.node.type_condition {
                    Some(tc) => source["__typename"] == tc.node.on.node.as_str(),
                    None => true,
                };
                if applies {
                    out.extend(resolve(source, &inline.node.selection_set.node));
                }
            }
            Selection::FragmentSpread(_) => {}
        }
    }

    out
}

fn resolve_value(value: &Value, set: &SelectionSet) -> Value {
    if set.items.is_empty() {
        return value.clone();
    }

    match value {
        Value::Array(items) => Value::Array(items.iter().map(|v| resolve_value(v, set)).collect()),
        Value::Object(_) => Value::Object(resolve(value, set)),
        other => other.clone(),
    }
}

pub fn adapter(upstream: Arc<MockUpstream>) -> ExecutionAdapter {
    ExecutionAdapter::new(upstream, stargazer_extensions())
}
