#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::oneshot;
use tracing::Level;

use mutara_core::{
    config::SchemaConfig,
    error::WriteError,
    mutation::{ApplyConfig, Mutation},
    queue::TransactionQueue,
    traits::{CacheStore, ExcludeFn, TrackedFields, Transport, TreeIntersector},
};
use mutara_proto::{EntityId, FieldNode, OperationRef, QueryFragment, RequestPayload, ResponsePayload};

// Initialize tracing for tests
#[ctor::ctor]
fn init_tracing() {
    tracing_subscriber::fmt().with_max_level(Level::DEBUG).with_test_writer().init();
}

/// Let spawned transport/refresh tasks run to quiescence.
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}

pub fn entity(id: &str) -> EntityId { EntityId::new(id).unwrap() }

// ---------------------------------------------------------------------------
// Cache store that records every operation in order.

#[derive(Debug, Clone, PartialEq)]
pub enum StoreOp {
    Apply { type_name: String, fields: Vec<String>, payload: serde_json::Value, optimistic: bool },
    ClearSpeculative,
}

#[derive(Default)]
pub struct RecordingStore {
    ops: Mutex<Vec<StoreOp>>,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> { Arc::new(Self::default()) }

    pub fn ops(&self) -> Vec<StoreOp> { self.ops.lock().unwrap().clone() }

    pub fn clear_ops(&self) { self.ops.lock().unwrap().clear(); }

    pub fn applies(&self, optimistic: bool) -> Vec<StoreOp> {
        self.ops().into_iter().filter(|op| matches!(op, StoreOp::Apply { optimistic: o, .. } if *o == optimistic)).collect()
    }

    pub fn clear_count(&self) -> usize {
        self.ops().iter().filter(|op| matches!(op, StoreOp::ClearSpeculative)).count()
    }
}

impl CacheStore for RecordingStore {
    fn apply(&self, query: &QueryFragment, payload: &serde_json::Value, optimistic: bool) {
        self.ops.lock().unwrap().push(StoreOp::Apply {
            type_name: query.type_name.clone(),
            fields: query.fields.iter().map(|f| f.name.clone()).collect(),
            payload: payload.clone(),
            optimistic,
        });
    }

    fn clear_speculative(&self) { self.ops.lock().unwrap().push(StoreOp::ClearSpeculative); }
}

// ---------------------------------------------------------------------------
// Tracked-field index with fixed per-entity subtrees.

#[derive(Default)]
pub struct FixedTracker {
    subtrees: HashMap<EntityId, FieldNode>,
}

impl FixedTracker {
    pub fn new() -> Self { Self::default() }

    pub fn with(mut self, id: &str, subtree: FieldNode) -> Self {
        self.subtrees.insert(entity(id), subtree);
        self
    }

    pub fn into_arc(self) -> Arc<Self> { Arc::new(self) }
}

impl TrackedFields for FixedTracker {
    fn tracked_subtree(&self, id: &EntityId) -> Option<FieldNode> { self.subtrees.get(id).cloned() }
}

// ---------------------------------------------------------------------------
// Structural intersector: children are matched by name, recursively. The
// exclusion predicate is evaluated against the tracked (right-hand) side.

pub struct StructuralIntersector;

impl StructuralIntersector {
    fn intersect_children(a: &FieldNode, b: &FieldNode, exclude: Option<ExcludeFn<'_>>) -> Vec<FieldNode> {
        let mut out = Vec::new();
        for theirs in &b.children {
            if let Some(exclude) = exclude {
                if exclude(theirs) {
                    continue;
                }
            }
            let Some(ours) = a.children.iter().find(|c| c.name == theirs.name) else {
                continue;
            };
            if ours.is_leaf() || theirs.is_leaf() {
                out.push(FieldNode::leaf(theirs.name.as_str()).with_calls(theirs.calls.clone()));
            } else {
                let children = Self::intersect_children(ours, theirs, exclude);
                if !children.is_empty() {
                    let mut node = FieldNode::new(theirs.name.as_str(), children).with_calls(theirs.calls.clone());
                    node.plural = ours.plural || theirs.plural;
                    out.push(node);
                }
            }
        }
        out
    }
}

impl TreeIntersector for StructuralIntersector {
    fn intersect(&self, a: &FieldNode, b: &FieldNode, exclude: Option<ExcludeFn<'_>>) -> Option<FieldNode> {
        let children = Self::intersect_children(a, b, exclude);
        if children.is_empty() {
            return None;
        }
        let mut root = FieldNode::new(a.name.as_str(), children).with_calls(a.calls.clone());
        root.plural = a.plural;
        Some(root)
    }
}

// ---------------------------------------------------------------------------
// Scriptable transport. Each send consumes one script entry; `Hold` parks the
// attempt until the test releases it.

pub enum Script {
    Succeed(serde_json::Value),
    Fail(String),
    Hold,
}

#[derive(Default)]
pub struct MockTransport {
    scripts: Mutex<VecDeque<Script>>,
    sent: Mutex<Vec<RequestPayload>>,
    holds: Mutex<VecDeque<oneshot::Sender<Result<ResponsePayload, WriteError>>>>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> { Arc::new(Self::default()) }

    pub fn script(&self, script: Script) {
        self.scripts.lock().unwrap().push_back(script);
    }

    pub fn sent(&self) -> Vec<RequestPayload> { self.sent.lock().unwrap().clone() }

    pub fn sent_count(&self) -> usize { self.sent.lock().unwrap().len() }

    /// Resolve the oldest held attempt.
    pub fn release_next(&self, result: Result<ResponsePayload, WriteError>) {
        let sender = self.holds.lock().unwrap().pop_front().expect("no held attempt to release");
        let _ = sender.send(result);
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: RequestPayload) -> Result<ResponsePayload, WriteError> {
        self.sent.lock().unwrap().push(request);
        let script = self.scripts.lock().unwrap().pop_front().unwrap_or(Script::Hold);
        match script {
            Script::Succeed(value) => Ok(ResponsePayload::new(value)),
            Script::Fail(message) => Err(WriteError::new(message)),
            Script::Hold => {
                let (tx, rx) = oneshot::channel();
                self.holds.lock().unwrap().push_back(tx);
                rx.await.unwrap_or_else(|_| Err(WriteError::new("transport handle dropped")))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// A write definition assembled field by field.

pub struct TestMutation {
    pub operation: String,
    pub variables: serde_json::Value,
    pub fat: QueryFragment,
    pub configs: Vec<ApplyConfig>,
    pub collision_key: Option<String>,
    pub optimistic: Option<serde_json::Value>,
}

impl TestMutation {
    pub fn new(operation: &str, fat: QueryFragment) -> Self {
        Self {
            operation: operation.to_string(),
            variables: serde_json::json!({}),
            fat,
            configs: Vec::new(),
            collision_key: None,
            optimistic: None,
        }
    }

    pub fn with_collision_key(mut self, key: &str) -> Self {
        self.collision_key = Some(key.to_string());
        self
    }

    pub fn with_optimistic(mut self, response: serde_json::Value) -> Self {
        self.optimistic = Some(response);
        self
    }

    pub fn with_config(mut self, config: ApplyConfig) -> Self {
        self.configs.push(config);
        self
    }

    pub fn with_variables(mut self, variables: serde_json::Value) -> Self {
        self.variables = variables;
        self
    }

    pub fn into_arc(self) -> Arc<Self> { Arc::new(self) }
}

impl Mutation for TestMutation {
    fn operation(&self) -> OperationRef { OperationRef::new(self.operation.clone()) }
    fn variables(&self) -> serde_json::Value { self.variables.clone() }
    fn fat_query(&self) -> QueryFragment { self.fat.clone() }
    fn configs(&self) -> Vec<ApplyConfig> { self.configs.clone() }
    fn collision_key(&self) -> Option<String> { self.collision_key.clone() }
    fn optimistic_response(&self) -> Option<serde_json::Value> { self.optimistic.clone() }
}

// ---------------------------------------------------------------------------

pub struct Harness {
    pub store: Arc<RecordingStore>,
    pub transport: Arc<MockTransport>,
    pub queue: TransactionQueue,
}

/// A queue wired to recording mocks with the given tracked subtrees.
pub fn harness(tracker: FixedTracker) -> Harness {
    let store = RecordingStore::new();
    let transport = MockTransport::new();
    let queue = TransactionQueue::new(
        store.clone(),
        tracker.into_arc(),
        Arc::new(StructuralIntersector),
        transport.clone(),
        SchemaConfig::default(),
    );
    Harness { store, transport, queue }
}

/// A fat query on `type_name` with the given top-level fields.
pub fn fat(type_name: &str, fields: Vec<FieldNode>) -> QueryFragment {
    QueryFragment { type_name: type_name.to_string(), fields }
}
