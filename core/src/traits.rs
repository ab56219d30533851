//! Contracts for the collaborators this engine coordinates but does not own.
//! All are consumed as `Arc<dyn …>` so applications can wire in their own
//! cache, tracker, intersection rules, and transport.

use async_trait::async_trait;

use mutara_proto::{EntityId, FieldNode, QueryFragment, RequestPayload, ResponsePayload};

use crate::error::WriteError;

/// The shared normalized cache. Writes are atomic per call and speculative
/// clears are safe to repeat.
pub trait CacheStore: Send + Sync {
    /// Write `payload` into the cache, shaped by `query`. Speculative writes
    /// land in the revocable optimistic layer.
    fn apply(&self, query: &QueryFragment, payload: &serde_json::Value, optimistic: bool);

    /// Remove every previously applied optimistic write.
    fn clear_speculative(&self);
}

/// Read-only index of which fields have previously been observed per entity.
pub trait TrackedFields: Send + Sync {
    /// The previously-observed field subtree for `id`, or nothing if the
    /// entity has never been fetched.
    fn tracked_subtree(&self, id: &EntityId) -> Option<FieldNode>;
}

/// Predicate deciding whether a node is excluded from an intersection.
pub type ExcludeFn<'a> = &'a dyn Fn(&FieldNode) -> bool;

/// Tree intersection primitive. The field-by-field matching rules are the
/// intersector's business; this engine only supplies the operands and an
/// optional exclusion predicate.
pub trait TreeIntersector: Send + Sync {
    fn intersect(&self, a: &FieldNode, b: &FieldNode, exclude: Option<ExcludeFn<'_>>) -> Option<FieldNode>;
}

/// The network primitive. One call per commit attempt; resolves or rejects
/// exactly once. Abandoning the returned future stops listening without
/// cancelling the attempt, which is why the queue also tolerates resolutions
/// for transactions that no longer exist.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: RequestPayload) -> Result<ResponsePayload, WriteError>;
}
