//! DispatchCoordinator - hands completed invocations to the worker pool.
//!
//! Dispatch is a conditional `pending -> dispatched` write followed by a
//! channel send. It never waits on the executor.
//!
//! The resumption claim is read after the invocation is recorded. If the
//! deadline already resolved the execution, the invocation is timed out in
//! place and never reaches a worker.

use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::domain::invocation::Invocation;
use crate::ports::{StatusEvent, StatusPublisher};

use super::completion_watcher::{CompletionWatcher, WatcherError};
use super::ledger::{ExecutionLedger, LedgerError, Transition};
use super::worker_pool::DispatchJob;

const EXECUTOR_UNREACHABLE: &str = "executor unreachable";
const RESOLVED_BEFORE_DISPATCH: &str = "execution resolved before dispatch";

#[derive(Debug, Clone, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Watcher(#[from] WatcherError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchResult {
    /// Queued for the worker pool.
    Dispatched,
    /// The index had already left `pending`; nothing was queued.
    AlreadyDispatched,
    /// The pool is gone; the invocation was failed in place.
    ExecutorUnreachable,
    /// The execution was already resolved; the invocation was timed out
    /// instead of queued.
    Withdrawn,
}

pub struct DispatchCoordinator {
    ledger: Arc<ExecutionLedger>,
    jobs: mpsc::UnboundedSender<DispatchJob>,
    watcher: Arc<CompletionWatcher>,
    publisher: Arc<dyn StatusPublisher>,
}

impl DispatchCoordinator {
    pub fn new(
        ledger: Arc<ExecutionLedger>,
        jobs: mpsc::UnboundedSender<DispatchJob>,
        watcher: Arc<CompletionWatcher>,
        publisher: Arc<dyn StatusPublisher>,
    ) -> Self {
        Self {
            ledger,
            jobs,
            watcher,
            publisher,
        }
    }

    /// Dispatches a recorded `pending` invocation. Idempotent per index.
    pub async fn dispatch(&self, invocation: &Invocation) -> Result<DispatchResult, DispatchError> {
        let execution_id = invocation.execution_id();
        let index = invocation.index();

        let dispatched = match self
            .ledger
            .update_invocation(execution_id, index, |inv| inv.mark_dispatched())
            .await?
        {
            Transition::Applied(dispatched) => dispatched,
            Transition::Rejected(current) => {
                tracing::debug!(
                    execution_id = %execution_id,
                    index,
                    status = %current.dispatch_status(),
                    "dispatch skipped"
                );
                return Ok(DispatchResult::AlreadyDispatched);
            }
        };
        self.ledger.mark_dispatched(execution_id, index).await?;

        if self.ledger.resumption_claimed(execution_id).await? {
            return self.withdraw(invocation).await;
        }

        tracing::info!(
            execution_id = %execution_id,
            index,
            tool_name = dispatched.tool_name(),
            degraded = dispatched.is_degraded(),
            "invocation dispatched"
        );
        self.publish(vec![
            StatusEvent::invocation(invocation),
            StatusEvent::invocation(&dispatched),
        ])
        .await;

        if self.jobs.send(DispatchJob { execution_id, index }).is_ok() {
            return Ok(DispatchResult::Dispatched);
        }

        tracing::error!(execution_id = %execution_id, index, "worker pool is not accepting jobs");
        if let Transition::Applied(failed) = self
            .ledger
            .update_invocation(execution_id, index, |inv| inv.fail(EXECUTOR_UNREACHABLE))
            .await?
        {
            self.ledger.mark_completed(execution_id, index).await?;
            self.publish(vec![StatusEvent::invocation(&failed)]).await;
        }
        self.watcher.check(execution_id).await?;
        Ok(DispatchResult::ExecutorUnreachable)
    }

    async fn withdraw(&self, invocation: &Invocation) -> Result<DispatchResult, DispatchError> {
        let execution_id = invocation.execution_id();
        let index = invocation.index();
        tracing::warn!(
            execution_id = %execution_id,
            index,
            tool_name = invocation.tool_name(),
            reason = RESOLVED_BEFORE_DISPATCH,
            "invocation withdrawn"
        );
        match self
            .ledger
            .update_invocation(execution_id, index, |inv| inv.time_out())
            .await?
        {
            Transition::Applied(timed_out) => {
                self.ledger.mark_completed(execution_id, index).await?;
                self.publish(vec![
                    StatusEvent::invocation(invocation),
                    StatusEvent::invocation(&timed_out),
                ])
                .await;
            }
            Transition::Rejected(current) if current.dispatch_status().is_complete() => {
                self.ledger.mark_completed(execution_id, index).await?;
            }
            Transition::Rejected(_) => {}
        }
        Ok(DispatchResult::Withdrawn)
    }

    async fn publish(&self, events: Vec<StatusEvent>) {
        if let Err(e) = self.publisher.publish_all(events).await {
            tracing::warn!(error = %e, "failed to publish dispatch status");
        }
    }
}

impl std::fmt::Debug for DispatchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchCoordinator")
            .field("pool_closed", &self.jobs.is_closed())
            .finish_non_exhaustive()
    }
}
