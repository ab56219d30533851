//! Error taxonomy for the mutation queue.
//!
//! Usage errors indicate a caller or configuration bug and are always
//! returned, never swallowed. Write failures are data: they are recorded on
//! the failing transaction and surfaced through its failure callback and
//! `error()`, but never returned out of the queue's own bookkeeping. A
//! resolution arriving for a transaction that no longer exists is not an
//! error at all; the queue logs and ignores it.

use mutara_proto::TransactionId;
use thiserror::Error;

use crate::transaction::TransactionStatus;

/// A caller or configuration bug. Fatal to the call that triggered it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UsageError {
    /// No transaction with this id exists in the queue
    #[error("unknown transaction: {0}")]
    UnknownTransaction(TransactionId),

    /// The operation is not legal from the transaction's current status
    #[error("cannot {action} transaction {id} while {status}")]
    IllegalTransition { action: &'static str, id: TransactionId, status: TransactionStatus },

    /// A response key failed both field-name-with-arguments decodings
    #[error("malformed field key: {0:?}")]
    MalformedFieldKey(String),

    /// A range-behavior key's call segments are not in alphabetical order
    #[error("range behavior key {key:?} is not sorted; expected {expected:?}")]
    UnsortedRangeBehaviorKey { key: String, expected: String },

    /// An apply config names a field the declared-superset tree does not have
    #[error("field {0:?} does not appear in the declared-superset tree")]
    UnknownFatQueryField(String),
}

/// A rejected network attempt, as reported by the transport. Recovered
/// locally: captured on the transaction and optionally cascaded to
/// collision-queue siblings.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("write failed: {message}")]
pub struct WriteError {
    pub message: String,
}

impl WriteError {
    pub fn new(message: impl Into<String>) -> Self { Self { message: message.into() } }
}

impl From<String> for WriteError {
    fn from(message: String) -> Self { Self { message } }
}

impl From<&str> for WriteError {
    fn from(message: &str) -> Self { Self { message: message.to_string() } }
}
