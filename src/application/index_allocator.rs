//! IndexAllocator - unique dispatch indices under concurrent callers.
//!
//! 1. Take a candidate from the execution's counter (retrying a "no value"
//!    reply a bounded number of times, then falling back to 0).
//! 2. Claim the candidate's slot with set-if-absent; on collision probe
//!    forward linearly.
//! 3. If probing is exhausted, claim an emergency index that is unique for
//!    the lifetime of the process.

use once_cell::sync::Lazy;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::CoordinatorConfig;
use crate::domain::foundation::{ExecutionId, InvocationId, Timestamp};

use super::ledger::{ExecutionLedger, LedgerError};

/// Process-wide source of emergency indices, seeded from wall-clock micros
/// so values do not repeat across restarts within an execution's lifetime.
static EMERGENCY_INDEX: Lazy<AtomicU64> = Lazy::new(|| {
    let micros = Timestamp::now().as_datetime().timestamp_micros().max(0) as u64;
    AtomicU64::new(micros)
});

fn emergency_index() -> u64 {
    EMERGENCY_INDEX.fetch_add(1, Ordering::Relaxed)
}

/// Bounds for counter retries and slot probing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AllocationPolicy {
    pub retries: u32,
    pub retry_delay: Duration,
    pub probe_limit: u32,
}

impl Default for AllocationPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            retry_delay: Duration::from_millis(25),
            probe_limit: 50,
        }
    }
}

impl From<&CoordinatorConfig> for AllocationPolicy {
    fn from(config: &CoordinatorConfig) -> Self {
        Self {
            retries: config.allocation_retries,
            retry_delay: config.allocation_retry_delay(),
            probe_limit: config.probe_limit,
        }
    }
}

/// How an index was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocationStrategy {
    /// The counter's candidate was free.
    Counter,
    /// The candidate was taken; a later slot was free.
    Probed { candidate: u64, steps: u32 },
    /// The counter never answered; probing started at 0.
    Fallback { steps: u32 },
    /// Probing was exhausted.
    Emergency,
}

impl AllocationStrategy {
    /// True for every path that had to resolve a conflict.
    pub fn is_conflict(&self) -> bool {
        !matches!(self, AllocationStrategy::Counter)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    pub index: u64,
    pub strategy: AllocationStrategy,
}

#[derive(Debug, Clone, Error)]
pub enum AllocationError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("No free index for execution {0}")]
    Exhausted(ExecutionId),
}

/// Hands out indices unique within one execution.
#[derive(Debug, Clone)]
pub struct IndexAllocator {
    ledger: Arc<ExecutionLedger>,
    policy: AllocationPolicy,
}

impl IndexAllocator {
    pub fn new(ledger: Arc<ExecutionLedger>, policy: AllocationPolicy) -> Self {
        Self { ledger, policy }
    }

    /// Allocates and claims an index for `owner`.
    ///
    /// The slot is claimed before this returns, so any concurrent caller
    /// sees it occupied.
    pub async fn allocate(
        &self,
        execution_id: ExecutionId,
        owner: &InvocationId,
    ) -> Result<Allocation, AllocationError> {
        let candidate = self.candidate(execution_id).await?;
        let start = candidate.unwrap_or(0);

        for step in 0..=self.policy.probe_limit {
            let index = start.saturating_add(u64::from(step));
            if self
                .ledger
                .claim_slot(execution_id, index, owner.as_str())
                .await?
            {
                let strategy = match (candidate, step) {
                    (Some(_), 0) => AllocationStrategy::Counter,
                    (Some(candidate), steps) => AllocationStrategy::Probed { candidate, steps },
                    (None, steps) => AllocationStrategy::Fallback { steps },
                };
                if strategy.is_conflict() {
                    tracing::warn!(
                        execution_id = %execution_id,
                        index,
                        ?strategy,
                        "index conflict resolved"
                    );
                }
                return Ok(Allocation { index, strategy });
            }
        }

        for _ in 0..=self.policy.probe_limit {
            let index = emergency_index();
            if self
                .ledger
                .claim_slot(execution_id, index, owner.as_str())
                .await?
            {
                tracing::warn!(
                    execution_id = %execution_id,
                    index,
                    start,
                    probe_limit = self.policy.probe_limit,
                    "index probing exhausted; using emergency index"
                );
                return Ok(Allocation {
                    index,
                    strategy: AllocationStrategy::Emergency,
                });
            }
        }

        Err(AllocationError::Exhausted(execution_id))
    }

    /// Reads the counter, retrying a "no value" reply.
    async fn candidate(&self, execution_id: ExecutionId) -> Result<Option<u64>, LedgerError> {
        for attempt in 1..=self.policy.retries {
            match self.ledger.next_index(execution_id).await? {
                Some(value) => match u64::try_from(value) {
                    Ok(index) => return Ok(Some(index)),
                    Err(_) => {
                        tracing::warn!(execution_id = %execution_id, value, "negative index counter");
                        return Ok(None);
                    }
                },
                None if attempt < self.policy.retries => {
                    tokio::time::sleep(self.policy.retry_delay).await;
                }
                None => {}
            }
        }
        tracing::warn!(
            execution_id = %execution_id,
            retries = self.policy.retries,
            "index counter unavailable; falling back to candidate 0"
        );
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::storage::InMemoryExecutionStore;
    use crate::ports::{ExecutionStateStore, StateStoreError};
    use async_trait::async_trait;
    use std::collections::HashSet;

    /// Store whose counter never produces a value.
    struct SilentCounter(InMemoryExecutionStore);

    #[async_trait]
    impl ExecutionStateStore for SilentCounter {
        async fn increment(&self, _: &str, _: i64, _: Duration) -> Result<Option<i64>, StateStoreError> {
            Ok(None)
        }
        async fn get(&self, key: &str) -> Result<Option<String>, StateStoreError> {
            self.0.get(key).await
        }
        async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), StateStoreError> {
            self.0.set(key, value, ttl).await
        }
        async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool, StateStoreError> {
            self.0.set_if_absent(key, value, ttl).await
        }
        async fn compare_and_set(
            &self,
            key: &str,
            expected: Option<&str>,
            new: &str,
            ttl: Duration,
        ) -> Result<bool, StateStoreError> {
            self.0.compare_and_set(key, expected, new, ttl).await
        }
        async fn add_member(&self, key: &str, member: &str, ttl: Duration) -> Result<bool, StateStoreError> {
            self.0.add_member(key, member, ttl).await
        }
        async fn remove_member(&self, key: &str, member: &str) -> Result<bool, StateStoreError> {
            self.0.remove_member(key, member).await
        }
        async fn members(&self, key: &str) -> Result<Vec<String>, StateStoreError> {
            self.0.members(key).await
        }
        async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StateStoreError> {
            self.0.expire(key, ttl).await
        }
        async fn delete(&self, key: &str) -> Result<bool, StateStoreError> {
            self.0.delete(key).await
        }
    }

    fn ledger(store: Arc<dyn ExecutionStateStore>) -> Arc<ExecutionLedger> {
        Arc::new(ExecutionLedger::new(
            store,
            Duration::from_secs(600),
            Duration::from_secs(30),
        ))
    }

    fn owner() -> InvocationId {
        InvocationId::generate()
    }

    #[tokio::test]
    async fn sequential_allocations_follow_the_counter() {
        let allocator = IndexAllocator::new(
            ledger(Arc::new(InMemoryExecutionStore::new())),
            AllocationPolicy::default(),
        );
        let exec = ExecutionId::new();

        for expected in 0..4 {
            let allocation = allocator.allocate(exec, &owner()).await.unwrap();
            assert_eq!(allocation.index, expected);
            assert_eq!(allocation.strategy, AllocationStrategy::Counter);
        }
    }

    #[tokio::test]
    async fn taken_slot_is_probed_past() {
        let ledger = ledger(Arc::new(InMemoryExecutionStore::new()));
        let exec = ExecutionId::new();
        ledger.claim_slot(exec, 0, "squatter").await.unwrap();
        ledger.claim_slot(exec, 1, "squatter").await.unwrap();
        let allocator = IndexAllocator::new(ledger, AllocationPolicy::default());

        let allocation = allocator.allocate(exec, &owner()).await.unwrap();

        assert_eq!(allocation.index, 2);
        assert_eq!(
            allocation.strategy,
            AllocationStrategy::Probed {
                candidate: 0,
                steps: 2
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn silent_counter_falls_back_to_zero_then_probes() {
        let store = Arc::new(SilentCounter(InMemoryExecutionStore::new()));
        let allocator = IndexAllocator::new(ledger(store), AllocationPolicy::default());
        let exec = ExecutionId::new();

        let first = allocator.allocate(exec, &owner()).await.unwrap();
        let second = allocator.allocate(exec, &owner()).await.unwrap();

        assert_eq!(first.index, 0);
        assert_eq!(first.strategy, AllocationStrategy::Fallback { steps: 0 });
        assert_eq!(second.index, 1);
        assert_eq!(second.strategy, AllocationStrategy::Fallback { steps: 1 });
    }

    #[tokio::test]
    async fn exhausted_probing_uses_emergency_index() {
        let ledger = ledger(Arc::new(InMemoryExecutionStore::new()));
        let exec = ExecutionId::new();
        for index in 0..=3 {
            ledger.claim_slot(exec, index, "squatter").await.unwrap();
        }
        let policy = AllocationPolicy {
            probe_limit: 3,
            ..Default::default()
        };
        let allocator = IndexAllocator::new(ledger, policy);

        let allocation = allocator.allocate(exec, &owner()).await.unwrap();

        assert_eq!(allocation.strategy, AllocationStrategy::Emergency);
        assert!(allocation.index > 3);
    }

    #[tokio::test]
    async fn emergency_indices_are_distinct() {
        let a = emergency_index();
        let b = emergency_index();
        assert_ne!(a, b);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_allocators_never_share_an_index() {
        let ledger = ledger(Arc::new(InMemoryExecutionStore::new()));
        let exec = ExecutionId::new();

        let mut handles = Vec::new();
        for _ in 0..4 {
            let allocator = IndexAllocator::new(ledger.clone(), AllocationPolicy::default());
            handles.push(tokio::spawn(async move {
                let mut indices = Vec::new();
                for _ in 0..25 {
                    indices.push(allocator.allocate(exec, &owner()).await.unwrap().index);
                }
                indices
            }));
        }

        let mut seen = HashSet::new();
        for handle in handles {
            for index in handle.await.unwrap() {
                assert!(seen.insert(index), "index {} handed out twice", index);
            }
        }
        assert_eq!(seen.len(), 100);
    }
}
