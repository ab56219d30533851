use serde::{Deserialize, Serialize};

/// A printed call attached to a field, e.g. `orderby(name)` or `first(10)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Call {
    pub name: String,
    pub value: String,
}

impl Call {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self { Self { name: name.into(), value: value.into() } }
}

impl std::fmt::Display for Call {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}({})", self.name, self.value) }
}

/// One field in a field tree. A node with no children is a scalar leaf.
///
/// The same representation is used for declared-superset ("fat") trees,
/// tracked subtrees reported by the cache, and built refetch fragments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldNode {
    pub name: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub calls: Vec<Call>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub plural: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FieldNode>,
}

impl FieldNode {
    pub fn new(name: impl Into<String>, children: Vec<FieldNode>) -> Self {
        Self { name: name.into(), calls: Vec::new(), plural: false, children }
    }

    pub fn leaf(name: impl Into<String>) -> Self { Self::new(name, Vec::new()) }

    pub fn with_calls(mut self, calls: Vec<Call>) -> Self {
        self.calls = calls;
        self
    }

    pub fn plural(mut self) -> Self {
        self.plural = true;
        self
    }

    pub fn is_leaf(&self) -> bool { self.children.is_empty() }

    /// First direct child with the given name, if any.
    pub fn child(&self, name: &str) -> Option<&FieldNode> { self.children.iter().find(|c| c.name == name) }

    /// Identity used when merging: two nodes are the same selection if their
    /// name and printed calls agree.
    fn selection_key(&self) -> (&str, &[Call]) { (&self.name, &self.calls) }

    /// Union `other`'s children into this node's children. Children with the
    /// same name and calls are merged recursively; plurality is sticky.
    pub fn merge(&mut self, other: &FieldNode) {
        self.plural |= other.plural;
        for theirs in &other.children {
            match self.children.iter_mut().find(|ours| ours.selection_key() == theirs.selection_key()) {
                Some(ours) => ours.merge(theirs),
                None => self.children.push(theirs.clone()),
            }
        }
    }

    /// Collapse duplicate selections at every level, merging their children.
    pub fn flattened(mut self) -> FieldNode {
        let mut kept: Vec<FieldNode> = Vec::new();
        for child in std::mem::take(&mut self.children) {
            match kept.iter_mut().find(|k| k.selection_key() == child.selection_key()) {
                Some(k) => k.merge(&child),
                None => kept.push(child),
            }
        }
        self.children = kept.into_iter().map(|c| c.flattened()).collect();
        self
    }
}

impl std::fmt::Display for FieldNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)?;
        for call in &self.calls {
            write!(f, ".{}", call)?;
        }
        if !self.children.is_empty() {
            let inner = self.children.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(", ");
            write!(f, " {{ {} }}", inner)?;
        }
        Ok(())
    }
}

/// A field tree rooted at a named type, attachable to a re-fetch request.
/// Builders never emit an empty fragment: no fields means no fragment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryFragment {
    pub type_name: String,
    pub fields: Vec<FieldNode>,
}

impl QueryFragment {
    /// Wrap fields in a fragment on `type_name`, or nothing if there are none.
    pub fn on(type_name: impl Into<String>, fields: Vec<FieldNode>) -> Option<Self> {
        if fields.is_empty() {
            None
        } else {
            Some(Self { type_name: type_name.into(), fields })
        }
    }

    /// First top-level field with the given name, if any.
    pub fn field(&self, name: &str) -> Option<&FieldNode> { self.fields.iter().find(|f| f.name == name) }
}

impl std::fmt::Display for QueryFragment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.fields.iter().map(|c| c.to_string()).collect::<Vec<_>>().join(", ");
        write!(f, "on {} {{ {} }}", self.type_name, inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_unions_children_recursively() {
        let mut a = FieldNode::new("actor", vec![FieldNode::new("address", vec![FieldNode::leaf("city")])]);
        let b = FieldNode::new("actor", vec![FieldNode::new("address", vec![FieldNode::leaf("country")]), FieldNode::leaf("name")]);
        a.merge(&b);

        let address = a.child("address").unwrap();
        assert!(address.child("city").is_some());
        assert!(address.child("country").is_some());
        assert!(a.child("name").is_some());
    }

    #[test]
    fn merge_keeps_distinct_calls_apart() {
        let mut a = FieldNode::new("root", vec![FieldNode::leaf("friends").with_calls(vec![Call::new("orderby", "name")])]);
        let b = FieldNode::new("root", vec![FieldNode::leaf("friends").with_calls(vec![Call::new("orderby", "age")])]);
        a.merge(&b);
        assert_eq!(a.children.len(), 2);
    }

    #[test]
    fn flattened_collapses_duplicate_selections() {
        let edge = FieldNode::new(
            "edges",
            vec![
                FieldNode::leaf("cursor"),
                FieldNode::new("node", vec![FieldNode::leaf("id")]),
                FieldNode::leaf("cursor"),
                FieldNode::new("node", vec![FieldNode::leaf("name")]),
            ],
        );
        let flat = edge.flattened();
        assert_eq!(flat.children.len(), 2);
        let node = flat.child("node").unwrap();
        assert!(node.child("id").is_some());
        assert!(node.child("name").is_some());
    }

    #[test]
    fn empty_fragment_is_nothing() {
        assert!(QueryFragment::on("Payload", vec![]).is_none());
        assert!(QueryFragment::on("Payload", vec![FieldNode::leaf("id")]).is_some());
    }
}
