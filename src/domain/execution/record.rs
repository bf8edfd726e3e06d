//! Execution record - the immutable header of one execution.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::domain::foundation::{ExecutionId, Timestamp};

/// Immutable facts about an execution, written once when it begins.
///
/// Mutable state (status, counters, index sets) lives in separate keys so
/// that each can be updated with its own atomic operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub execution_id: ExecutionId,
    pub created_at: Timestamp,
    /// Barrier deadline; non-terminal invocations time out here.
    pub deadline_at: Timestamp,
    /// Lifetime of every key belonging to this execution, in seconds.
    pub ttl_secs: u64,
}

impl ExecutionRecord {
    /// Creates a record whose deadline is `timeout` from now.
    pub fn new(execution_id: ExecutionId, timeout: Duration, ttl: Duration) -> Self {
        let created_at = Timestamp::now();
        Self {
            execution_id,
            created_at,
            deadline_at: created_at.plus(timeout),
            ttl_secs: ttl.as_secs(),
        }
    }

    /// Key lifetime as a Duration.
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Returns true if the barrier deadline has passed.
    pub fn is_expired(&self) -> bool {
        !Timestamp::now().is_before(&self.deadline_at)
    }

    /// Time left until the deadline.
    pub fn remaining(&self) -> Duration {
        self.deadline_at.remaining_from_now()
    }
}
