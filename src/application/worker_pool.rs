//! WorkerPool - runs dispatched invocations against the tool executor.
//!
//! Jobs arrive over an unbounded channel so the parsing path never waits.
//! At most `max_concurrent` executor calls run at once; each one is bounded
//! by the time left until its execution's deadline. Executor panics are
//! caught at the task boundary and recorded as failures.

use serde_json::Value;
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tokio::time;

use crate::domain::foundation::ExecutionId;
use crate::domain::invocation::Invocation;
use crate::ports::{StatusEvent, StatusPublisher, ToolExecutor, ToolRequest};

use super::completion_watcher::CompletionWatcher;
use super::ledger::{ExecutionLedger, Transition};

/// One invocation ready to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DispatchJob {
    pub execution_id: ExecutionId,
    pub index: u64,
}

/// How an executor call ended.
#[derive(Debug, Clone, PartialEq)]
enum Completion {
    Succeeded(Value),
    Failed(String),
    TimedOut,
}

/// Bounded-concurrency executor runner.
pub struct WorkerPool {
    ledger: Arc<ExecutionLedger>,
    executor: Arc<dyn ToolExecutor>,
    watcher: Arc<CompletionWatcher>,
    publisher: Arc<dyn StatusPublisher>,
    permits: Arc<Semaphore>,
}

impl WorkerPool {
    pub fn new(
        ledger: Arc<ExecutionLedger>,
        executor: Arc<dyn ToolExecutor>,
        watcher: Arc<CompletionWatcher>,
        publisher: Arc<dyn StatusPublisher>,
        max_concurrent: usize,
    ) -> Self {
        Self {
            ledger,
            executor,
            watcher,
            publisher,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
        }
    }

    /// Starts consuming `jobs`. The pool stops when every sender is dropped.
    pub fn spawn(self, jobs: mpsc::UnboundedReceiver<DispatchJob>) -> JoinHandle<()> {
        tokio::spawn(Arc::new(self).run(jobs))
    }

    async fn run(self: Arc<Self>, mut jobs: mpsc::UnboundedReceiver<DispatchJob>) {
        while let Some(job) = jobs.recv().await {
            let permit = match self.permits.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            let pool = Arc::clone(&self);
            tokio::spawn(async move {
                pool.execute(job).await;
                drop(permit);
            });
        }
        tracing::debug!("worker pool drained");
    }

    /// Runs one job to a terminal status and signals the watcher.
    pub async fn execute(&self, job: DispatchJob) {
        let DispatchJob { execution_id, index } = job;

        let record = match self.ledger.record(execution_id).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(execution_id = %execution_id, index, error = %e, "dropping job");
                return;
            }
        };

        let invocation = match self
            .ledger
            .update_invocation(execution_id, index, |inv| inv.mark_executing())
            .await
        {
            Ok(Transition::Applied(invocation)) => invocation,
            Ok(Transition::Rejected(current)) => {
                tracing::debug!(
                    execution_id = %execution_id,
                    index,
                    status = %current.dispatch_status(),
                    "invocation no longer runnable"
                );
                return;
            }
            Err(e) => {
                tracing::warn!(execution_id = %execution_id, index, error = %e, "dropping job");
                return;
            }
        };
        self.publish(&invocation).await;

        let request = ToolRequest::for_invocation(&invocation);
        let executor = Arc::clone(&self.executor);
        let mut handle = tokio::spawn(async move { executor.execute(request).await });

        let completion = match time::timeout(record.remaining(), &mut handle).await {
            Ok(Ok(Ok(value))) => Completion::Succeeded(value),
            Ok(Ok(Err(e))) => Completion::Failed(e.to_string()),
            Ok(Err(join)) if join.is_panic() => Completion::Failed("executor panicked".to_string()),
            Ok(Err(_)) => Completion::Failed("executor task cancelled".to_string()),
            Err(_) => {
                handle.abort();
                Completion::TimedOut
            }
        };

        self.record_completion(&invocation, completion).await;

        match self.watcher.check(execution_id).await {
            Ok(outcome) => tracing::trace!(execution_id = %execution_id, ?outcome, "barrier checked"),
            Err(e) => tracing::warn!(execution_id = %execution_id, error = %e, "barrier check failed"),
        }
    }

    async fn record_completion(&self, invocation: &Invocation, completion: Completion) {
        let execution_id = invocation.execution_id();
        let index = invocation.index();

        let update = self
            .ledger
            .update_invocation(execution_id, index, |inv| match &completion {
                Completion::Succeeded(value) => inv.succeed(value.clone()),
                Completion::Failed(reason) => inv.fail(reason.clone()),
                Completion::TimedOut => inv.time_out(),
            })
            .await;

        let finished = match update {
            Ok(Transition::Applied(finished)) => finished,
            Ok(Transition::Rejected(current)) => {
                // The deadline sweep got there first.
                tracing::debug!(
                    execution_id = %execution_id,
                    index,
                    status = %current.dispatch_status(),
                    "completion arrived after terminal status"
                );
                return;
            }
            Err(e) => {
                tracing::error!(execution_id = %execution_id, index, error = %e, "failed to record completion");
                return;
            }
        };

        if let Err(e) = self.ledger.mark_completed(execution_id, index).await {
            tracing::error!(execution_id = %execution_id, index, error = %e, "failed to mark completion");
        }

        match &completion {
            Completion::Succeeded(_) => tracing::debug!(
                execution_id = %execution_id,
                index,
                tool_name = finished.tool_name(),
                "invocation succeeded"
            ),
            Completion::Failed(reason) => tracing::warn!(
                execution_id = %execution_id,
                index,
                tool_name = finished.tool_name(),
                reason = %reason,
                "invocation failed"
            ),
            Completion::TimedOut => tracing::warn!(
                execution_id = %execution_id,
                index,
                tool_name = finished.tool_name(),
                "invocation timed out"
            ),
        }
        self.publish(&finished).await;
    }

    async fn publish(&self, invocation: &Invocation) {
        if let Err(e) = self.publisher.publish(StatusEvent::invocation(invocation)).await {
            tracing::warn!(
                execution_id = %invocation.execution_id(),
                index = invocation.index(),
                error = %e,
                "failed to publish status"
            );
        }
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("available_permits", &self.permits.available_permits())
            .finish_non_exhaustive()
    }
}
