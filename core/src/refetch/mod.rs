//! Minimal-refetch query building.
//!
//! After a write is acknowledged, only the fields that (a) the mutation kind
//! declares it might affect and (b) the cache has previously observed need to
//! be re-fetched. The builder computes that intersection per apply config and
//! wraps the result in a fragment on the declared-superset's root type. An
//! empty result yields no fragment at all.

pub mod keys;

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use mutara_proto::{EntityId, FieldNode, QueryFragment};

use crate::{
    config::SchemaConfig,
    error::UsageError,
    mutation::{ApplyConfig, FieldIds, RangeBehaviors},
    traits::{TrackedFields, TreeIntersector},
};

pub struct RefetchBuilder {
    tracker: Arc<dyn TrackedFields>,
    intersector: Arc<dyn TreeIntersector>,
    config: SchemaConfig,
}

impl RefetchBuilder {
    pub fn new(tracker: Arc<dyn TrackedFields>, intersector: Arc<dyn TreeIntersector>, config: SchemaConfig) -> Self {
        Self { tracker, intersector, config }
    }

    /// Combine the fragments of every apply config into one refetch tree.
    pub fn build_from_configs(&self, configs: &[ApplyConfig], fat: &QueryFragment) -> Result<Option<QueryFragment>, UsageError> {
        let mut fields = Vec::new();
        for config in configs {
            match config {
                ApplyConfig::FieldsChange { fields: pairs } => fields.extend(self.fields_changed(pairs, fat)?),
                ApplyConfig::RangeAdd { parent_name, parent_id, connection_name, edge_name, range_behaviors } => fields.extend(
                    self.edge_insertion(parent_name.as_deref(), parent_id, connection_name, edge_name, range_behaviors, fat)?,
                ),
                ApplyConfig::RangeDelete { parent_name, parent_id, connection_name } => {
                    fields.extend(self.edge_deletion(parent_name, parent_id, connection_name, fat)?)
                }
                ApplyConfig::RequiredChildren { children } => fields.extend(children.iter().cloned()),
            }
        }
        Ok(wrap(fat, fields))
    }

    /// "These fields changed for these entities."
    pub fn build_for_fields(
        &self,
        pairs: &[(String, FieldIds)],
        fat: &QueryFragment,
    ) -> Result<Option<QueryFragment>, UsageError> {
        Ok(wrap(fat, self.fields_changed(pairs, fat)?))
    }

    fn fields_changed(&self, pairs: &[(String, FieldIds)], fat: &QueryFragment) -> Result<Vec<FieldNode>, UsageError> {
        let mut out = Vec::new();
        for (field_name, ids) in pairs {
            let fat_field = fat.field(field_name).ok_or_else(|| UsageError::UnknownFatQueryField(field_name.clone()))?;

            // Union the tracked subtrees across every id the field maps to.
            let mut union: Option<FieldNode> = None;
            for id in ids.iter() {
                if let Some(tracked) = self.tracker.tracked_subtree(id) {
                    match &mut union {
                        Some(u) => u.merge(&tracked),
                        None => union = Some(tracked),
                    }
                }
            }

            let Some(union) = union else {
                debug!("no tracked fields for {field_name}; nothing to refetch");
                continue;
            };
            if let Some(hit) = self.intersector.intersect(fat_field, &union, None) {
                out.push(hit);
            }
        }
        Ok(out)
    }

    /// "This node/edge was deleted from this connection." The connection's
    /// own edges need no re-fetch; only sibling metadata does.
    pub fn build_for_edge_deletion(
        &self,
        parent_name: &str,
        parent_id: &EntityId,
        connection_name: &str,
        fat: &QueryFragment,
    ) -> Result<Option<QueryFragment>, UsageError> {
        Ok(wrap(fat, self.edge_deletion(parent_name, parent_id, connection_name, fat)?))
    }

    fn edge_deletion(
        &self,
        parent_name: &str,
        parent_id: &EntityId,
        connection_name: &str,
        fat: &QueryFragment,
    ) -> Result<Vec<FieldNode>, UsageError> {
        let fat_parent = fat.field(parent_name).ok_or_else(|| UsageError::UnknownFatQueryField(parent_name.to_string()))?;
        let Some(tracked) = self.tracker.tracked_subtree(parent_id) else {
            return Ok(Vec::new());
        };
        let exclude = |node: &FieldNode| node.name == connection_name;
        Ok(self.intersector.intersect(fat_parent, &tracked, Some(&exclude)).into_iter().collect())
    }

    /// "This edge was added to this connection." Tracked occurrences of the
    /// connection with a range behavior for their call signature contribute
    /// their observed edge sub-fields to one synthesized edge; occurrences
    /// without a behavior are left in the parent intersection for wholesale
    /// re-fetch.
    pub fn build_for_edge_insertion(
        &self,
        parent_name: Option<&str>,
        parent_id: &EntityId,
        connection_name: &str,
        edge_name: &str,
        range_behaviors: &RangeBehaviors,
        fat: &QueryFragment,
    ) -> Result<Option<QueryFragment>, UsageError> {
        Ok(wrap(fat, self.edge_insertion(parent_name, parent_id, connection_name, edge_name, range_behaviors, fat)?))
    }

    fn edge_insertion(
        &self,
        parent_name: Option<&str>,
        parent_id: &EntityId,
        connection_name: &str,
        edge_name: &str,
        range_behaviors: &RangeBehaviors,
        fat: &QueryFragment,
    ) -> Result<Vec<FieldNode>, UsageError> {
        for key in range_behaviors.keys() {
            keys::ensure_sorted_range_key(key)?;
        }
        let Some(tracked) = self.tracker.tracked_subtree(parent_id) else {
            return Ok(Vec::new());
        };

        let connections = find_descendants(&tracked, connection_name);
        if connections.is_empty() {
            return Ok(Vec::new());
        }

        // Partition tracked occurrences by whether the caller supplied a
        // range behavior for their call signature.
        let mut handled: HashSet<String> = HashSet::new();
        let mut edge_fields: Vec<FieldNode> = Vec::new();
        for connection in &connections {
            let signature = keys::range_behavior_key(connection, &self.config);
            if range_behaviors.get(&signature).is_some() {
                if let Some(edges) = connection.child(&self.config.edges_key) {
                    edge_fields.extend(edges.children.iter().cloned());
                }
                handled.insert(signature);
            } else {
                debug!("no range behavior for {connection_name}[{signature}]; will refetch the connection");
            }
        }

        let mut out = Vec::new();
        if !handled.is_empty() {
            out.push(self.synthesize_edge(parent_id, edge_name, edge_fields));
        }
        if let Some(parent_name) = parent_name {
            let fat_parent = fat.field(parent_name).ok_or_else(|| UsageError::UnknownFatQueryField(parent_name.to_string()))?;
            let exclude = |node: &FieldNode| {
                node.name == connection_name && handled.contains(&keys::range_behavior_key(node, &self.config))
            };
            if let Some(hit) = self.intersector.intersect(fat_parent, &tracked, Some(&exclude)) {
                out.push(hit);
            }
        }
        Ok(out)
    }

    /// Cursor, type discriminator, an origin-node reference when the parent
    /// is client-allocated, then the observed edge sub-fields; duplicates
    /// flattened away.
    fn synthesize_edge(&self, parent_id: &EntityId, edge_name: &str, edge_fields: Vec<FieldNode>) -> FieldNode {
        let mut children =
            vec![FieldNode::leaf(self.config.cursor_field.as_str()), FieldNode::leaf(self.config.typename_field.as_str())];
        if parent_id.has_prefix(&self.config.client_id_prefix) {
            children
                .push(FieldNode::new(self.config.node_key.as_str(), vec![FieldNode::leaf(self.config.id_field.as_str())]));
        }
        children.extend(edge_fields);
        FieldNode::new(edge_name, children).flattened()
    }

    /// Shape-match a raw optimistic response: keys become fields, objects
    /// recurse, arrays become plural fields, and the reserved node/edges keys
    /// get their implicit id/cursor leaves.
    pub fn build_for_optimistic_response(
        &self,
        response: &serde_json::Value,
        fat: &QueryFragment,
    ) -> Result<Option<QueryFragment>, UsageError> {
        let serde_json::Value::Object(map) = response else {
            return Ok(None);
        };
        Ok(wrap(fat, self.infer_fields(map)?))
    }

    fn infer_fields(&self, map: &serde_json::Map<String, serde_json::Value>) -> Result<Vec<FieldNode>, UsageError> {
        map.iter().map(|(key, value)| self.infer_field(key, value)).collect()
    }

    fn infer_field(&self, key: &str, value: &serde_json::Value) -> Result<FieldNode, UsageError> {
        let decoded = keys::decode_field_key(key)?;
        let mut node = FieldNode::new(decoded.name, Vec::new()).with_calls(decoded.calls);
        match value {
            serde_json::Value::Object(map) => node.children = self.infer_fields(map)?,
            serde_json::Value::Array(items) => {
                node.plural = true;
                if let Some(serde_json::Value::Object(first)) = items.first() {
                    node.children = self.infer_fields(first)?;
                }
            }
            _ => {}
        }
        // Reserved keys always select their identifying leaf.
        let implied = if node.name == self.config.node_key {
            Some(&self.config.id_field)
        } else if node.name == self.config.edges_key {
            Some(&self.config.cursor_field)
        } else {
            None
        };
        if let Some(leaf) = implied {
            if node.child(leaf).is_none() {
                node.children.push(FieldNode::leaf(leaf.as_str()));
            }
        }
        Ok(node)
    }
}

/// Wrap non-empty results in a fragment on the declared root type, collapsing
/// duplicate selections contributed by different configs.
fn wrap(fat: &QueryFragment, fields: Vec<FieldNode>) -> Option<QueryFragment> {
    if fields.is_empty() {
        return None;
    }
    let root = FieldNode::new("", fields).flattened();
    QueryFragment::on(&*fat.type_name, root.children)
}

/// Every occurrence of `name` in the tree, shallowest first; matches are not
/// descended into.
fn find_descendants<'a>(tree: &'a FieldNode, name: &str) -> Vec<&'a FieldNode> {
    let mut out = Vec::new();
    let mut queue: std::collections::VecDeque<&FieldNode> = tree.children.iter().collect();
    while let Some(node) = queue.pop_front() {
        if node.name == name {
            out.push(node);
        } else {
            queue.extend(node.children.iter());
        }
    }
    out
}
