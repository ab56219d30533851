use serde::{Deserialize, Serialize};

/// Schema-level knobs referenced by the queue and the refetch builder.
///
/// The cache layer historically read these from ambient global state; here the
/// value is constructed once and passed into `TransactionQueue::new` and
/// `RefetchBuilder::new` explicitly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaConfig {
    /// Variable name the transaction id is injected under, correlating a
    /// request with its eventual resolution.
    pub correlation_field: String,

    /// Scalar id field implied on reserved `node` objects in optimistic
    /// responses, and selected on origin-node references.
    pub id_field: String,

    /// Cursor field implied on reserved `edges` objects in optimistic
    /// responses, and selected on synthesized insertion edges.
    pub cursor_field: String,

    /// Type discriminator selected on synthesized insertion edges.
    pub typename_field: String,

    /// Response key that receives an implicit id leaf.
    pub node_key: String,

    /// Response key that receives an implicit cursor leaf.
    pub edges_key: String,

    /// Prefix on entity ids allocated by the client before server
    /// acknowledgment.
    pub client_id_prefix: String,

    /// Call names that paginate a connection rather than select within it.
    /// Excluded when printing a connection's range-behavior lookup key.
    pub range_call_names: Vec<String>,
}

impl Default for SchemaConfig {
    fn default() -> Self {
        Self {
            correlation_field: "correlationId".to_string(),
            id_field: "id".to_string(),
            cursor_field: "cursor".to_string(),
            typename_field: "__typename".to_string(),
            node_key: "node".to_string(),
            edges_key: "edges".to_string(),
            client_id_prefix: "client:".to_string(),
            range_call_names: ["first", "last", "before", "after", "find"].map(String::from).to_vec(),
        }
    }
}

impl SchemaConfig {
    pub fn is_range_call(&self, name: &str) -> bool { self.range_call_names.iter().any(|c| c == name) }
}
