use std::sync::{Arc, Mutex, OnceLock};

use tracing::debug;

use mutara_proto::{QueryFragment, RequestPayload, ResponsePayload, TransactionId};

use crate::{
    config::SchemaConfig,
    error::{UsageError, WriteError},
    mutation::Mutation,
    refetch::RefetchBuilder,
    util::OneTimeFlag,
};

/// Lifecycle of one pending write.
///
/// `Uncommitted` → (`CommitQueued` →) `Committing` → destroyed on success, or
/// `CommitFailed` / `CollisionCommitFailed`, from which the only legal moves
/// are recommit and rollback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Created; optimistic effect applied; no commit requested yet
    Uncommitted,
    /// Commit requested, waiting behind a same-collision-key predecessor
    CommitQueued,
    /// The single network attempt for this transaction is in flight
    Committing,
    /// The transaction's own attempt was rejected
    CommitFailed,
    /// An earlier same-key transaction failed; this one never reached the wire
    CollisionCommitFailed,
}

impl TransactionStatus {
    pub fn can_commit(&self) -> bool { matches!(self, TransactionStatus::Uncommitted) }

    pub fn can_recommit(&self) -> bool {
        matches!(self, TransactionStatus::CommitFailed | TransactionStatus::CollisionCommitFailed)
    }

    pub fn can_rollback(&self) -> bool {
        matches!(
            self,
            TransactionStatus::Uncommitted | TransactionStatus::CommitFailed | TransactionStatus::CollisionCommitFailed
        )
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransactionStatus::Uncommitted => "UNCOMMITTED",
            TransactionStatus::CommitQueued => "COMMIT_QUEUED",
            TransactionStatus::Committing => "COMMITTING",
            TransactionStatus::CommitFailed => "COMMIT_FAILED",
            TransactionStatus::CollisionCommitFailed => "COLLISION_COMMIT_FAILED",
        };
        write!(f, "{s}")
    }
}

/// One-shot capability handed to a failure callback. Raising it suppresses
/// the default auto-rollback for that transaction's current failure only.
#[derive(Debug, Default)]
pub struct PreventRollback(OneTimeFlag);

impl PreventRollback {
    pub(crate) fn new() -> Self { Self(OneTimeFlag::new()) }

    /// Keep the failed transaction in the queue instead of rolling it back.
    pub fn prevent(&self) { self.0.set(); }

    pub(crate) fn prevented(&self) -> bool { self.0.is_set() }
}

pub type SuccessCallback = Box<dyn Fn(&ResponsePayload) + Send + Sync>;
/// Receives the write's own error, or `None` when the failure cascaded from
/// an earlier same-key transaction.
pub type FailureCallback = Box<dyn Fn(Option<&WriteError>, &PreventRollback) + Send + Sync>;

#[derive(Default)]
pub struct Callbacks {
    pub success: Option<SuccessCallback>,
    pub failure: Option<FailureCallback>,
}

impl Callbacks {
    pub fn new() -> Self { Self::default() }

    pub fn on_success(mut self, f: impl Fn(&ResponsePayload) + Send + Sync + 'static) -> Self {
        self.success = Some(Box::new(f));
        self
    }

    pub fn on_failure(mut self, f: impl Fn(Option<&WriteError>, &PreventRollback) + Send + Sync + 'static) -> Self {
        self.failure = Some(Box::new(f));
        self
    }
}

/// The per-write state record. Owned exclusively by the queue; handles refer
/// to it by id only.
///
/// The write definition is immutable after creation, so every derived value
/// is computed once and cached for the transaction's lifetime.
pub(crate) struct Transaction {
    pub(crate) id: TransactionId,
    mutation: Arc<dyn Mutation>,
    pub(crate) callbacks: Callbacks,

    status: Mutex<TransactionStatus>,
    error: Mutex<Option<WriteError>>,

    // Memoized derived values
    collision_key: OnceLock<Option<String>>,
    fat_query: OnceLock<QueryFragment>,
    refetch_query: OnceLock<Option<QueryFragment>>,
    optimistic_response: OnceLock<Option<serde_json::Value>>,
    optimistic_query: OnceLock<Option<QueryFragment>>,
    request: OnceLock<RequestPayload>,
}

impl Transaction {
    pub(crate) fn new(id: TransactionId, mutation: Arc<dyn Mutation>, callbacks: Callbacks) -> Self {
        Self {
            id,
            mutation,
            callbacks,
            status: Mutex::new(TransactionStatus::Uncommitted),
            error: Mutex::new(None),
            collision_key: OnceLock::new(),
            fat_query: OnceLock::new(),
            refetch_query: OnceLock::new(),
            optimistic_response: OnceLock::new(),
            optimistic_query: OnceLock::new(),
            request: OnceLock::new(),
        }
    }

    pub(crate) fn status(&self) -> TransactionStatus { *self.status.lock().expect("status lock") }

    pub(crate) fn set_status(&self, status: TransactionStatus) {
        debug!("{} -> {status}", self.id);
        *self.status.lock().expect("status lock") = status;
    }

    pub(crate) fn error(&self) -> Option<WriteError> { self.error.lock().expect("error lock").clone() }

    pub(crate) fn set_error(&self, error: Option<WriteError>) { *self.error.lock().expect("error lock") = error; }

    pub(crate) fn collision_key(&self) -> Option<String> {
        self.collision_key.get_or_init(|| self.mutation.collision_key()).clone()
    }

    pub(crate) fn fat_query(&self) -> &QueryFragment { self.fat_query.get_or_init(|| self.mutation.fat_query()) }

    pub(crate) fn optimistic_response(&self) -> Option<&serde_json::Value> {
        self.optimistic_response.get_or_init(|| self.mutation.optimistic_response()).as_ref()
    }

    /// Minimal-refetch tree derived from the apply configs (or, with no
    /// configs, from the optimistic response shape).
    pub(crate) fn refetch_query(&self, builder: &RefetchBuilder) -> Result<Option<QueryFragment>, UsageError> {
        if let Some(cached) = self.refetch_query.get() {
            return Ok(cached.clone());
        }
        let configs = self.mutation.configs();
        let built = if configs.is_empty() {
            match self.optimistic_response() {
                Some(response) => builder.build_for_optimistic_response(response, self.fat_query())?,
                None => None,
            }
        } else {
            builder.build_from_configs(&configs, self.fat_query())?
        };
        Ok(self.refetch_query.get_or_init(|| built).clone())
    }

    /// Tree shaping the speculative apply of the optimistic response.
    pub(crate) fn optimistic_query(&self, builder: &RefetchBuilder) -> Result<Option<QueryFragment>, UsageError> {
        if let Some(cached) = self.optimistic_query.get() {
            return Ok(cached.clone());
        }
        let built = match self.optimistic_response() {
            Some(response) => builder.build_for_optimistic_response(response, self.fat_query())?,
            None => None,
        };
        Ok(self.optimistic_query.get_or_init(|| built).clone())
    }

    /// The serialized commit attempt. The transaction id is injected into the
    /// variables under the configured correlation field; non-object variables
    /// are wrapped under `input` first.
    pub(crate) fn request_payload(&self, config: &SchemaConfig) -> &RequestPayload {
        self.request.get_or_init(|| {
            let correlation = serde_json::Value::String(self.id.to_string());
            let variables = match self.mutation.variables() {
                serde_json::Value::Object(mut map) => {
                    map.insert(config.correlation_field.clone(), correlation);
                    serde_json::Value::Object(map)
                }
                serde_json::Value::Null => {
                    serde_json::Value::Object([(config.correlation_field.clone(), correlation)].into_iter().collect())
                }
                other => serde_json::Value::Object(
                    [(config.correlation_field.clone(), correlation), ("input".to_string(), other)].into_iter().collect(),
                ),
            };
            RequestPayload { id: self.id, operation: self.mutation.operation(), variables, files: self.mutation.files() }
        })
    }
}

impl std::fmt::Debug for Transaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Transaction({}, {})", self.id, self.status())
    }
}
