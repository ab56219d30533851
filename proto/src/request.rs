use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::id::TransactionId;

/// Reference to a server-side write operation. Opaque to the queue; the
/// transport and server agree on what it names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationRef(String);

impl OperationRef {
    pub fn new(name: impl Into<String>) -> Self { Self(name.into()) }

    pub fn as_str(&self) -> &str { &self.0 }
}

impl std::fmt::Display for OperationRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.0) }
}

/// A file carried alongside a write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileAttachment {
    pub name: String,
    pub content_type: String,
    pub contents: Bytes,
}

/// The serialized form of one commit attempt, submitted to the transport
/// exactly once per attempt. `variables` already contains the transaction id
/// under the configured correlation field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestPayload {
    pub id: TransactionId,
    pub operation: OperationRef,
    pub variables: serde_json::Value,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FileAttachment>,
}

/// What the server acknowledged a write with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePayload(serde_json::Value);

impl ResponsePayload {
    pub fn new(data: serde_json::Value) -> Self { Self(data) }

    pub fn data(&self) -> &serde_json::Value { &self.0 }

    pub fn into_data(self) -> serde_json::Value { self.0 }
}

impl std::fmt::Display for RequestPayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Request {} {} ({} file(s))", self.id, self.operation, self.files.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_payload_round_trips_through_serde() {
        let payload = RequestPayload {
            id: TransactionId::new(),
            operation: OperationRef::new("likeStory"),
            variables: json!({"storyId": "s1"}),
            files: vec![],
        };
        let encoded = serde_json::to_string(&payload).unwrap();
        let decoded: RequestPayload = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded.id, payload.id);
        assert_eq!(decoded.operation, payload.operation);
        assert_eq!(decoded.variables, payload.variables);
    }
}
