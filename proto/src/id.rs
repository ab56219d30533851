use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::error::DecodeError;

/// Identifies one pending write for the life of a queue. Ulids are monotonic
/// within a process, so ids also encode creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionId(Ulid);

impl TransactionId {
    pub fn new() -> Self { Self(Ulid::new()) }

    pub fn to_bytes(&self) -> [u8; 16] { self.0.to_bytes() }
}

impl Default for TransactionId {
    fn default() -> Self { Self::new() }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let id_str = self.0.to_string();
        write!(f, "T{}", &id_str[20..])
    }
}

impl TryFrom<&str> for TransactionId {
    type Error = DecodeError;
    fn try_from(value: &str) -> Result<Self, Self::Error> { Ok(Self(Ulid::from_string(value)?)) }
}

/// An id in the shared object cache. Opaque to this engine: the cache decides
/// the format. The only structure we rely on is an optional prefix marking
/// client-allocated (not yet server-acknowledged) entities.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityId(String);

impl EntityId {
    pub fn new(id: impl Into<String>) -> Result<Self, DecodeError> {
        let id = id.into();
        if id.is_empty() {
            return Err(DecodeError::EmptyEntityId);
        }
        Ok(Self(id))
    }

    pub fn as_str(&self) -> &str { &self.0 }

    /// Whether this id was allocated on the client, per the given prefix.
    pub fn has_prefix(&self, prefix: &str) -> bool { !prefix.is_empty() && self.0.starts_with(prefix) }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "{}", self.0) }
}

impl TryFrom<&str> for EntityId {
    type Error = DecodeError;
    fn try_from(value: &str) -> Result<Self, Self::Error> { Self::new(value) }
}

impl TryFrom<String> for EntityId {
    type Error = DecodeError;
    fn try_from(value: String) -> Result<Self, Self::Error> { Self::new(value) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_ids_are_unique_and_ordered() {
        let a = TransactionId::new();
        let b = TransactionId::new();
        assert_ne!(a, b);
        assert!(a < b);
    }

    #[test]
    fn entity_id_rejects_empty() {
        assert!(EntityId::new("").is_err());
        let id = EntityId::new("client:4").unwrap();
        assert!(id.has_prefix("client:"));
        assert!(!id.has_prefix("server:"));
        assert!(!id.has_prefix(""));
    }
}
