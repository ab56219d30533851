//! The mutation transaction queue.
//!
//! Owns every pending write, applies and withdraws optimistic effects,
//! serializes same-collision-key commits, drives the transport, and
//! propagates success and failure. Queue state lives behind one mutex; the
//! lock is never held across a store call, a callback invocation, or an
//! await.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};

use mutara_proto::{ResponsePayload, TransactionId};

use crate::{
    config::SchemaConfig,
    error::{UsageError, WriteError},
    handle::TransactionHandle,
    mutation::Mutation,
    refetch::RefetchBuilder,
    traits::{CacheStore, TrackedFields, Transport, TreeIntersector},
    transaction::{Callbacks, PreventRollback, Transaction, TransactionStatus},
};

/// Cheaply clonable handle to the shared queue.
#[derive(Clone)]
pub struct TransactionQueue(Arc<QueueInner>);

struct QueueInner {
    config: SchemaConfig,
    store: Arc<dyn CacheStore>,
    transport: Arc<dyn Transport>,
    builder: RefetchBuilder,
    state: Mutex<QueueState>,
}

#[derive(Default)]
struct QueueState {
    by_id: HashMap<TransactionId, Arc<Transaction>>,
    /// Pending transactions in creation order; the optimistic layer is
    /// rebuilt by replaying this sequence.
    order: Vec<TransactionId>,
    /// Transactions waiting to commit per collision key. A key is present iff
    /// at least one transaction with that key is queued or committing; the
    /// head is the one on the wire.
    collision_queues: HashMap<String, VecDeque<TransactionId>>,
    refresh_scheduled: bool,
}

impl TransactionQueue {
    pub fn new(
        store: Arc<dyn CacheStore>,
        tracker: Arc<dyn TrackedFields>,
        intersector: Arc<dyn TreeIntersector>,
        transport: Arc<dyn Transport>,
        config: SchemaConfig,
    ) -> Self {
        let builder = RefetchBuilder::new(tracker, intersector, config.clone());
        Self(Arc::new(QueueInner { config, store, transport, builder, state: Mutex::new(QueueState::default()) }))
    }

    pub fn builder(&self) -> &RefetchBuilder { &self.0.builder }

    /// Create a transaction and apply its optimistic effect, if any, before
    /// returning. No network activity yet.
    pub fn create_transaction(
        &self,
        mutation: Arc<dyn Mutation>,
        callbacks: Callbacks,
    ) -> Result<TransactionHandle, UsageError> {
        let id = TransactionId::new();
        let trx = Arc::new(Transaction::new(id, mutation, callbacks));

        // Derive the optimistic query up front so a malformed response shape
        // fails this call instead of a later refresh.
        let optimistic = trx.optimistic_query(&self.0.builder)?;

        {
            let mut state = self.state();
            state.by_id.insert(id, trx.clone());
            state.order.push(id);
        }
        if let Some(query) = optimistic {
            let payload = trx.optimistic_response().cloned().unwrap_or_default();
            self.0.store.apply(&query, &payload, true);
        }
        debug!("created {id}");
        Ok(TransactionHandle::new(self.clone(), id))
    }

    /// Commit, or queue behind a same-collision-key predecessor. Legal only
    /// from `Uncommitted`.
    pub fn commit(&self, id: TransactionId) -> Result<(), UsageError> {
        let trx = self.get(id)?;
        let status = trx.status();
        if !status.can_commit() {
            return Err(UsageError::IllegalTransition { action: "commit", id, status });
        }
        self.commit_internal(trx)
    }

    /// Retry after a failure. Legal only from `CommitFailed` or
    /// `CollisionCommitFailed`.
    pub fn recommit(&self, id: TransactionId) -> Result<(), UsageError> {
        let trx = self.get(id)?;
        let status = trx.status();
        if !status.can_recommit() {
            return Err(UsageError::IllegalTransition { action: "recommit", id, status });
        }
        self.commit_internal(trx)
    }

    /// Destroy the transaction and withdraw its optimistic effect. Never
    /// triggers callbacks and does not abort an in-flight attempt.
    pub fn rollback(&self, id: TransactionId) -> Result<(), UsageError> {
        let trx = self.get(id)?;
        let status = trx.status();
        if !status.can_rollback() {
            return Err(UsageError::IllegalTransition { action: "rollback", id, status });
        }
        debug!("rolling back {id}");
        self.destroy(id);
        self.schedule_refresh();
        Ok(())
    }

    pub fn status(&self, id: TransactionId) -> Result<TransactionStatus, UsageError> { Ok(self.get(id)?.status()) }

    pub fn error(&self, id: TransactionId) -> Result<Option<WriteError>, UsageError> { Ok(self.get(id)?.error()) }

    /// Ids of all pending transactions, in creation order.
    pub fn pending(&self) -> Vec<TransactionId> { self.state().order.clone() }

    pub fn len(&self) -> usize { self.state().by_id.len() }

    pub fn is_empty(&self) -> bool { self.state().by_id.is_empty() }

    fn state(&self) -> MutexGuard<'_, QueueState> { self.0.state.lock().expect("queue state lock") }

    fn get(&self, id: TransactionId) -> Result<Arc<Transaction>, UsageError> {
        self.state().by_id.get(&id).cloned().ok_or(UsageError::UnknownTransaction(id))
    }

    /// An empty collision key serializes nothing; treat it as absent.
    fn collision_key(trx: &Transaction) -> Option<String> { trx.collision_key().filter(|k| !k.is_empty()) }

    fn commit_internal(&self, trx: Arc<Transaction>) -> Result<(), UsageError> {
        // Memoize the refetch query now so config bugs surface here.
        trx.refetch_query(&self.0.builder)?;

        if let Some(key) = Self::collision_key(&trx) {
            let mut state = self.state();
            if let Some(queue) = state.collision_queues.get_mut(&key) {
                queue.push_back(trx.id);
                drop(state);
                trx.set_error(None);
                trx.set_status(TransactionStatus::CommitQueued);
                debug!("{} queued behind collision key {key:?}", trx.id);
                return Ok(());
            }
            state.collision_queues.insert(key, VecDeque::from([trx.id]));
        }
        self.begin_commit(trx);
        Ok(())
    }

    /// Exactly one network attempt is in flight for a committing transaction.
    fn begin_commit(&self, trx: Arc<Transaction>) {
        trx.set_error(None);
        trx.set_status(TransactionStatus::Committing);
        let request = trx.request_payload(&self.0.config).clone();
        info!("committing {} ({})", trx.id, request.operation);

        let queue = self.clone();
        let transport = self.0.transport.clone();
        let id = trx.id;
        tokio::spawn(async move {
            match transport.send(request).await {
                Ok(response) => queue.resolve_success(id, response),
                Err(error) => queue.resolve_failure(id, Some(error)),
            }
        });
    }

    fn destroy(&self, id: TransactionId) {
        let mut state = self.state();
        state.by_id.remove(&id);
        state.order.retain(|t| *t != id);
    }

    /// Resolution of a successful attempt. A resolution for an id no longer
    /// present is stale (the transaction was destroyed meanwhile) and is
    /// ignored.
    pub(crate) fn resolve_success(&self, id: TransactionId, response: ResponsePayload) {
        let trx = match self.state().by_id.get(&id).cloned() {
            Some(trx) => trx,
            None => {
                warn!("stale success resolution for {id}; ignoring");
                return;
            }
        };
        info!("{} committed", id);

        self.advance_collision_queue(&trx);
        self.destroy(id);

        // Rebuild the optimistic layer without this transaction before the
        // authoritative payload lands, so the two effects never overlap.
        self.refresh_speculative();

        let query = trx.refetch_query(&self.0.builder).expect("refetch query memoized at commit");
        if let Some(query) = query {
            self.0.store.apply(&query, response.data(), false);
        }

        if let Some(on_success) = &trx.callbacks.success {
            on_success(&response);
        }
    }

    /// Resolution of a rejected attempt.
    pub(crate) fn resolve_failure(&self, id: TransactionId, error: Option<WriteError>) {
        let trx = match self.state().by_id.get(&id).cloned() {
            Some(trx) => trx,
            None => {
                warn!("stale failure resolution for {id}; ignoring");
                return;
            }
        };
        self.handle_failure(trx, error);
    }

    /// Shared failure path: `error` is the transaction's own rejection, or
    /// `None` when the failure cascaded from an earlier same-key transaction.
    fn handle_failure(&self, trx: Arc<Transaction>, error: Option<WriteError>) {
        let own_failure = error.is_some();
        trx.set_status(if own_failure {
            TransactionStatus::CommitFailed
        } else {
            TransactionStatus::CollisionCommitFailed
        });
        trx.set_error(error.clone());

        let prevent = PreventRollback::new();
        if let Some(on_failure) = &trx.callbacks.failure {
            on_failure(error.as_ref(), &prevent);
        }

        if own_failure {
            self.fail_collision_queue(&trx);
        }

        // The failure callback may have rolled the transaction back itself.
        if !prevent.prevented() && self.state().by_id.contains_key(&trx.id) {
            self.destroy(trx.id);
        }
        self.schedule_refresh();
    }

    /// Fail everything still waiting behind `trx` under its collision key,
    /// with the cascaded (error-less) flavor, then drop the queue.
    fn fail_collision_queue(&self, trx: &Transaction) {
        let Some(key) = Self::collision_key(trx) else { return };
        let siblings: Vec<Arc<Transaction>> = {
            let mut state = self.state();
            match state.collision_queues.remove(&key) {
                Some(mut queue) => {
                    let head = queue.pop_front();
                    debug_assert_eq!(head, Some(trx.id));
                    let by_id = &state.by_id;
                    queue.iter().filter_map(|id| by_id.get(id).cloned()).collect()
                }
                None => return,
            }
        };
        if !siblings.is_empty() {
            info!("cascading failure of {} to {} queued sibling(s)", trx.id, siblings.len());
        }
        for sibling in siblings {
            self.handle_failure(sibling, None);
        }
    }

    /// Shift the collision queue past `trx`; begin the next head's commit or
    /// drop the empty queue.
    fn advance_collision_queue(&self, trx: &Transaction) {
        let Some(key) = Self::collision_key(trx) else { return };
        let next = {
            let mut state = self.state();
            let next_id = match state.collision_queues.get_mut(&key) {
                Some(queue) => {
                    let head = queue.pop_front();
                    debug_assert_eq!(head, Some(trx.id));
                    queue.front().copied()
                }
                None => return,
            };
            match next_id {
                Some(next_id) => state.by_id.get(&next_id).cloned(),
                None => {
                    state.collision_queues.remove(&key);
                    None
                }
            }
        };
        if let Some(next) = next {
            self.begin_commit(next);
        }
    }

    /// Clear all speculative cache state, then reapply the optimistic effect
    /// of every still-pending transaction in creation order.
    fn refresh_speculative(&self) {
        let pending: Vec<_> = {
            let state = self.state();
            state
                .order
                .iter()
                .filter_map(|id| state.by_id.get(id))
                .filter_map(|trx| {
                    // Memoized when the transaction was created.
                    let query = trx.optimistic_query(&self.0.builder).ok().flatten()?;
                    let payload = trx.optimistic_response().cloned()?;
                    Some((query, payload))
                })
                .collect()
        };
        debug!("rebuilding optimistic layer from {} pending effect(s)", pending.len());
        self.0.store.clear_speculative();
        for (query, payload) in &pending {
            self.0.store.apply(query, payload, true);
        }
    }

    /// Coalesce refresh requests within one synchronous turn into a single
    /// rebuild on the next tick. The success path bypasses this and calls
    /// `refresh_speculative` directly.
    fn schedule_refresh(&self) {
        {
            let mut state = self.state();
            if state.refresh_scheduled {
                return;
            }
            state.refresh_scheduled = true;
        }
        let queue = self.clone();
        tokio::spawn(async move {
            queue.state().refresh_scheduled = false;
            queue.refresh_speculative();
        });
    }
}
