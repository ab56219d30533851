use std::collections::BTreeMap;

use mutara_proto::{EntityId, FieldNode, FileAttachment, OperationRef, QueryFragment};

/// A caller-supplied description of one write. Implementations must be
/// deterministic: the queue memoizes everything derived from these methods
/// for the life of the transaction, so repeated calls must agree.
pub trait Mutation: Send + Sync {
    /// The server operation this write invokes.
    fn operation(&self) -> OperationRef;

    /// Input variables, before the correlation token is injected.
    fn variables(&self) -> serde_json::Value;

    /// The declared-superset ("fat") field tree: every field this mutation
    /// kind might affect, rooted at the payload type.
    fn fat_query(&self) -> QueryFragment;

    /// Typed instructions describing how the write lands in the cache.
    fn configs(&self) -> Vec<ApplyConfig> { Vec::new() }

    /// Writes sharing a collision key commit strictly in commit-call order.
    fn collision_key(&self) -> Option<String> { None }

    /// Speculative payload applied to the cache before acknowledgment.
    fn optimistic_response(&self) -> Option<serde_json::Value> { None }

    /// Files submitted alongside the request.
    fn files(&self) -> Vec<FileAttachment> { Vec::new() }
}

/// One or several entity ids a changed field maps to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldIds {
    One(EntityId),
    Many(Vec<EntityId>),
}

impl FieldIds {
    pub fn iter(&self) -> impl Iterator<Item = &EntityId> {
        match self {
            FieldIds::One(id) => std::slice::from_ref(id).iter(),
            FieldIds::Many(ids) => ids.iter(),
        }
    }
}

impl From<EntityId> for FieldIds {
    fn from(id: EntityId) -> Self { FieldIds::One(id) }
}

impl From<Vec<EntityId>> for FieldIds {
    fn from(ids: Vec<EntityId>) -> Self { FieldIds::Many(ids) }
}

/// How a connection identified by its call signature absorbs an inserted
/// edge without a wholesale re-fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeBehavior {
    Append,
    Prepend,
    Ignore,
}

/// Range behaviors keyed by connection call signature. Keys are validated by
/// the refetch builder: call segments must already be sorted alphabetically.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RangeBehaviors(BTreeMap<String, RangeBehavior>);

impl RangeBehaviors {
    pub fn new() -> Self { Self::default() }

    pub fn with(mut self, key: impl Into<String>, behavior: RangeBehavior) -> Self {
        self.0.insert(key.into(), behavior);
        self
    }

    pub fn get(&self, key: &str) -> Option<RangeBehavior> { self.0.get(key).copied() }

    pub fn keys(&self) -> impl Iterator<Item = &str> { self.0.keys().map(|k| k.as_str()) }
}

/// The typed apply instructions a mutation may declare.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyConfig {
    /// These fields changed for these entities.
    FieldsChange { fields: Vec<(String, FieldIds)> },

    /// This edge was added to this connection under this parent.
    RangeAdd {
        parent_name: Option<String>,
        parent_id: EntityId,
        connection_name: String,
        edge_name: String,
        range_behaviors: RangeBehaviors,
    },

    /// This node/edge was deleted from this connection under this parent.
    RangeDelete { parent_name: String, parent_id: EntityId, connection_name: String },

    /// Spread these required child fragments into the refetch query as-is.
    RequiredChildren { children: Vec<FieldNode> },
}
