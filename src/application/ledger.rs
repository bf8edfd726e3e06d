//! ExecutionLedger - typed access to an execution's keys in the shared store.
//!
//! Key layout (all under `exec:{execution_id}:`):
//!
//! ```text
//! meta              ExecutionRecord JSON, written once
//! status            ExecutionStatus, forward-only via compare-and-set
//! next_index        index counter (increment-with-initial)
//! slot:{n}          allocator claim for index n (set-if-absent)
//! inv:{n}           Invocation JSON, forward-only via compare-and-set
//! indices           set of every recorded index
//! dispatched        set of dispatched indices
//! completed         set of indices in a terminal dispatch status
//! dispatched_count  counter of dispatches
//! resumption        resumption claim (set-if-absent)
//! failure           reason the stream was abandoned
//! ```
//!
//! plus the global `executions:active` set scanned by the sweeper.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::domain::execution::{ExecutionRecord, ExecutionStatus};
use crate::domain::foundation::{ExecutionId, StateMachine, ValidationError};
use crate::domain::invocation::Invocation;
use crate::ports::{ExecutionStateStore, StateStoreError};

const ACTIVE_EXECUTIONS: &str = "executions:active";

/// Compare-and-set attempts before a record update gives up.
const CAS_ATTEMPTS: usize = 16;

/// Errors raised by ledger operations.
#[derive(Debug, Clone, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Store(#[from] StateStoreError),

    #[error("Execution {0} not found")]
    ExecutionNotFound(ExecutionId),

    #[error("Invocation {index} of execution {execution_id} not found")]
    InvocationNotFound { execution_id: ExecutionId, index: u64 },

    #[error("Execution {0} already exists")]
    AlreadyExists(ExecutionId),

    #[error("Corrupt value at '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    #[error("Gave up updating '{key}' after repeated concurrent writes")]
    Contention { key: String },
}

/// Result of a forward-only update.
#[derive(Debug, Clone, PartialEq)]
pub enum Transition<T> {
    /// The update was written; carries the new value.
    Applied(T),
    /// The current value does not allow the update; carries the current value.
    Rejected(T),
}

impl<T> Transition<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied(_))
    }

    pub fn into_inner(self) -> T {
        match self {
            Transition::Applied(value) | Transition::Rejected(value) => value,
        }
    }
}

/// Key naming for one execution.
pub(crate) mod keys {
    use crate::domain::foundation::ExecutionId;

    pub fn meta(id: ExecutionId) -> String {
        format!("exec:{}:meta", id)
    }

    pub fn status(id: ExecutionId) -> String {
        format!("exec:{}:status", id)
    }

    pub fn next_index(id: ExecutionId) -> String {
        format!("exec:{}:next_index", id)
    }

    pub fn slot(id: ExecutionId, index: u64) -> String {
        format!("exec:{}:slot:{}", id, index)
    }

    pub fn invocation(id: ExecutionId, index: u64) -> String {
        format!("exec:{}:inv:{}", id, index)
    }

    pub fn indices(id: ExecutionId) -> String {
        format!("exec:{}:indices", id)
    }

    pub fn dispatched(id: ExecutionId) -> String {
        format!("exec:{}:dispatched", id)
    }

    pub fn completed(id: ExecutionId) -> String {
        format!("exec:{}:completed", id)
    }

    pub fn dispatched_count(id: ExecutionId) -> String {
        format!("exec:{}:dispatched_count", id)
    }

    pub fn resumption(id: ExecutionId) -> String {
        format!("exec:{}:resumption", id)
    }

    pub fn failure(id: ExecutionId) -> String {
        format!("exec:{}:failure", id)
    }
}

/// Typed facade over [`ExecutionStateStore`].
#[derive(Clone)]
pub struct ExecutionLedger {
    store: Arc<dyn ExecutionStateStore>,
    ttl: Duration,
    retention: Duration,
}

impl ExecutionLedger {
    /// `ttl` is stamped on every live write; `retention` replaces it once
    /// an execution finishes.
    pub fn new(store: Arc<dyn ExecutionStateStore>, ttl: Duration, retention: Duration) -> Self {
        Self {
            store,
            ttl,
            retention,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Execution
    // ═══════════════════════════════════════════════════════════════════════

    /// Writes the header and `streaming` status and marks the execution active.
    pub async fn begin(&self, record: &ExecutionRecord) -> Result<(), LedgerError> {
        let id = record.execution_id;
        let meta = encode(&keys::meta(id), record)?;
        if !self.store.set_if_absent(&keys::meta(id), &meta, self.ttl).await? {
            return Err(LedgerError::AlreadyExists(id));
        }
        self.store
            .set(&keys::status(id), ExecutionStatus::Streaming.as_str(), self.ttl)
            .await?;
        self.store
            .add_member(ACTIVE_EXECUTIONS, &id.to_string(), self.ttl)
            .await?;
        Ok(())
    }

    pub async fn record(&self, id: ExecutionId) -> Result<ExecutionRecord, LedgerError> {
        let key = keys::meta(id);
        let raw = self
            .store
            .get(&key)
            .await?
            .ok_or(LedgerError::ExecutionNotFound(id))?;
        decode(&key, &raw)
    }

    pub async fn status(&self, id: ExecutionId) -> Result<ExecutionStatus, LedgerError> {
        let key = keys::status(id);
        let raw = self
            .store
            .get(&key)
            .await?
            .ok_or(LedgerError::ExecutionNotFound(id))?;
        raw.parse().map_err(|e: ValidationError| LedgerError::Corrupt {
            key,
            reason: e.to_string(),
        })
    }

    /// Moves the execution status forward if the edge exists.
    pub async fn transition_status(
        &self,
        id: ExecutionId,
        target: ExecutionStatus,
    ) -> Result<Transition<ExecutionStatus>, LedgerError> {
        let key = keys::status(id);
        for _ in 0..CAS_ATTEMPTS {
            let current = self.status(id).await?;
            if !current.can_transition_to(&target) {
                return Ok(Transition::Rejected(current));
            }
            if self
                .store
                .compare_and_set(&key, Some(current.as_str()), target.as_str(), self.ttl)
                .await?
            {
                return Ok(Transition::Applied(target));
            }
        }
        Err(LedgerError::Contention { key })
    }

    /// Executions not yet retired.
    pub async fn active_executions(&self) -> Result<Vec<ExecutionId>, LedgerError> {
        let members = self.store.members(ACTIVE_EXECUTIONS).await?;
        Ok(members.iter().filter_map(|m| m.parse().ok()).collect())
    }

    /// Stops the sweeper from visiting an execution.
    pub async fn deactivate(&self, id: ExecutionId) -> Result<(), LedgerError> {
        self.store
            .remove_member(ACTIVE_EXECUTIONS, &id.to_string())
            .await?;
        Ok(())
    }

    /// Shortens every key of a finished execution to the retention TTL.
    pub async fn retire(&self, id: ExecutionId) -> Result<(), LedgerError> {
        let indices = self.indices(id).await?;
        let mut all_keys = vec![
            keys::meta(id),
            keys::status(id),
            keys::next_index(id),
            keys::indices(id),
            keys::dispatched(id),
            keys::completed(id),
            keys::dispatched_count(id),
            keys::resumption(id),
            keys::failure(id),
        ];
        for index in indices {
            all_keys.push(keys::slot(id, index));
            all_keys.push(keys::invocation(id, index));
        }
        for key in &all_keys {
            self.store.expire(key, self.retention).await?;
        }
        self.deactivate(id).await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Index allocation
    // ═══════════════════════════════════════════════════════════════════════

    /// Next value of the execution's index counter, starting at 0.
    ///
    /// `None` means the store produced no value and the caller may retry.
    pub async fn next_index(&self, id: ExecutionId) -> Result<Option<i64>, LedgerError> {
        Ok(self.store.increment(&keys::next_index(id), 0, self.ttl).await?)
    }

    /// Claims an index slot. Returns `false` if another caller holds it.
    pub async fn claim_slot(
        &self,
        id: ExecutionId,
        index: u64,
        owner: &str,
    ) -> Result<bool, LedgerError> {
        Ok(self
            .store
            .set_if_absent(&keys::slot(id, index), owner, self.ttl)
            .await?)
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Invocations
    // ═══════════════════════════════════════════════════════════════════════

    /// Stores a freshly allocated invocation.
    pub async fn put_invocation(&self, invocation: &Invocation) -> Result<(), LedgerError> {
        let id = invocation.execution_id();
        let key = keys::invocation(id, invocation.index());
        let value = encode(&key, invocation)?;
        if !self.store.set_if_absent(&key, &value, self.ttl).await? {
            return Err(LedgerError::Corrupt {
                key,
                reason: "index already holds an invocation".to_string(),
            });
        }
        self.store
            .add_member(&keys::indices(id), &invocation.index().to_string(), self.ttl)
            .await?;
        Ok(())
    }

    pub async fn invocation(&self, id: ExecutionId, index: u64) -> Result<Invocation, LedgerError> {
        self.read_invocation(id, index).await.map(|(inv, _)| inv)
    }

    async fn read_invocation(
        &self,
        id: ExecutionId,
        index: u64,
    ) -> Result<(Invocation, String), LedgerError> {
        let key = keys::invocation(id, index);
        let raw = self
            .store
            .get(&key)
            .await?
            .ok_or(LedgerError::InvocationNotFound {
                execution_id: id,
                index,
            })?;
        let invocation = decode(&key, &raw)?;
        Ok((invocation, raw))
    }

    /// Applies a forward-only change to an invocation record.
    ///
    /// `change` is re-run on a fresh read whenever a concurrent writer got in
    /// first; when it refuses (the status edge does not exist) the current
    /// record is returned as `Rejected`.
    pub async fn update_invocation<F>(
        &self,
        id: ExecutionId,
        index: u64,
        change: F,
    ) -> Result<Transition<Invocation>, LedgerError>
    where
        F: Fn(&mut Invocation) -> Result<(), ValidationError>,
    {
        let key = keys::invocation(id, index);
        for _ in 0..CAS_ATTEMPTS {
            let (current, raw) = self.read_invocation(id, index).await?;
            let mut next = current.clone();
            if change(&mut next).is_err() {
                return Ok(Transition::Rejected(current));
            }
            let encoded = encode(&key, &next)?;
            if self
                .store
                .compare_and_set(&key, Some(&raw), &encoded, self.ttl)
                .await?
            {
                return Ok(Transition::Applied(next));
            }
        }
        Err(LedgerError::Contention { key })
    }

    /// Every recorded invocation, in index order.
    pub async fn invocations(&self, id: ExecutionId) -> Result<Vec<Invocation>, LedgerError> {
        let mut invocations = Vec::new();
        for index in self.indices(id).await? {
            invocations.push(self.invocation(id, index).await?);
        }
        Ok(invocations)
    }

    pub async fn indices(&self, id: ExecutionId) -> Result<BTreeSet<u64>, LedgerError> {
        self.index_set(&keys::indices(id)).await
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Barrier bookkeeping
    // ═══════════════════════════════════════════════════════════════════════

    /// Records a dispatch. Returns `false` if the index was already recorded.
    pub async fn mark_dispatched(&self, id: ExecutionId, index: u64) -> Result<bool, LedgerError> {
        let added = self
            .store
            .add_member(&keys::dispatched(id), &index.to_string(), self.ttl)
            .await?;
        if added {
            self.store
                .increment(&keys::dispatched_count(id), 1, self.ttl)
                .await?;
        }
        Ok(added)
    }

    /// Records that an index reached a terminal dispatch status.
    pub async fn mark_completed(&self, id: ExecutionId, index: u64) -> Result<bool, LedgerError> {
        Ok(self
            .store
            .add_member(&keys::completed(id), &index.to_string(), self.ttl)
            .await?)
    }

    pub async fn dispatched_indices(&self, id: ExecutionId) -> Result<BTreeSet<u64>, LedgerError> {
        self.index_set(&keys::dispatched(id)).await
    }

    pub async fn completed_indices(&self, id: ExecutionId) -> Result<BTreeSet<u64>, LedgerError> {
        self.index_set(&keys::completed(id)).await
    }

    pub async fn dispatched_count(&self, id: ExecutionId) -> Result<u64, LedgerError> {
        let key = keys::dispatched_count(id);
        match self.store.get(&key).await? {
            Some(raw) => raw.parse().map_err(|_| LedgerError::Corrupt {
                key,
                reason: format!("'{}' is not a count", raw),
            }),
            None => Ok(0),
        }
    }

    async fn index_set(&self, key: &str) -> Result<BTreeSet<u64>, LedgerError> {
        self.store
            .members(key)
            .await?
            .iter()
            .map(|m| {
                m.parse().map_err(|_| LedgerError::Corrupt {
                    key: key.to_string(),
                    reason: format!("'{}' is not an index", m),
                })
            })
            .collect()
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Resumption
    // ═══════════════════════════════════════════════════════════════════════

    /// Takes resumption ownership. Exactly one caller per execution gets `true`.
    pub async fn claim_resumption(&self, id: ExecutionId, owner: &str) -> Result<bool, LedgerError> {
        Ok(self
            .store
            .set_if_absent(&keys::resumption(id), owner, self.ttl)
            .await?)
    }

    /// True once any caller holds the resumption claim.
    pub async fn resumption_claimed(&self, id: ExecutionId) -> Result<bool, LedgerError> {
        Ok(self.store.get(&keys::resumption(id)).await?.is_some())
    }

    /// Gives the claim back so a later signal can resume. Only the holder
    /// calls this, before anything was delivered.
    pub async fn release_resumption(&self, id: ExecutionId) -> Result<(), LedgerError> {
        self.store.delete(&keys::resumption(id)).await?;
        Ok(())
    }

    /// Records why the stream was abandoned. The first reason wins.
    pub async fn record_failure(&self, id: ExecutionId, reason: &str) -> Result<bool, LedgerError> {
        Ok(self
            .store
            .set_if_absent(&keys::failure(id), reason, self.ttl)
            .await?)
    }

    pub async fn failure(&self, id: ExecutionId) -> Result<Option<String>, LedgerError> {
        Ok(self.store.get(&keys::failure(id)).await?)
    }
}

impl std::fmt::Debug for ExecutionLedger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionLedger")
            .field("ttl", &self.ttl)
            .field("retention", &self.retention)
            .finish_non_exhaustive()
    }
}

fn encode<T: serde::Serialize>(key: &str, value: &T) -> Result<String, LedgerError> {
    serde_json::to_string(value).map_err(|e| LedgerError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

fn decode<T: serde::de::DeserializeOwned>(key: &str, raw: &str) -> Result<T, LedgerError> {
    serde_json::from_str(raw).map_err(|e| LedgerError::Corrupt {
        key: key.to_string(),
        reason: e.to_string(),
    })
}
