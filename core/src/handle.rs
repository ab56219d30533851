use mutara_proto::TransactionId;

use crate::{
    error::{UsageError, WriteError},
    queue::TransactionQueue,
    transaction::TransactionStatus,
};

/// A validated facade for driving one transaction through its lifecycle.
///
/// Holds no state beyond the id and a back-reference to the queue, so the
/// queue remains the single source of truth. Every method fails with
/// `UsageError::UnknownTransaction` once the transaction has been destroyed.
pub struct TransactionHandle {
    queue: TransactionQueue,
    id: TransactionId,
}

impl TransactionHandle {
    pub(crate) fn new(queue: TransactionQueue, id: TransactionId) -> Self { Self { queue, id } }

    pub fn id(&self) -> TransactionId { self.id }

    /// Legal only while `Uncommitted`.
    pub fn commit(&self) -> Result<(), UsageError> { self.queue.commit(self.id) }

    /// Legal only from `CommitFailed` or `CollisionCommitFailed`.
    pub fn recommit(&self) -> Result<(), UsageError> { self.queue.recommit(self.id) }

    /// Legal from `Uncommitted`, `CommitFailed`, or `CollisionCommitFailed`.
    pub fn rollback(&self) -> Result<(), UsageError> { self.queue.rollback(self.id) }

    pub fn status(&self) -> Result<TransactionStatus, UsageError> { self.queue.status(self.id) }

    pub fn error(&self) -> Result<Option<WriteError>, UsageError> { self.queue.error(self.id) }
}

impl std::fmt::Debug for TransactionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "TransactionHandle({})", self.id) }
}
