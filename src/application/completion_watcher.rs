//! CompletionWatcher - the completion barrier and exactly-once resumption.
//!
//! Three kinds of signal lead here, and any of them may race the others:
//!
//! | Signal | Source | Entry point |
//! |--------|--------|-------------|
//! | worker completion, turn end | event-driven | [`CompletionWatcher::check`] |
//! | deadline timer | one per execution | [`CompletionWatcher::expire`] |
//! | periodic sweep | background loop | [`CompletionWatcher::run`] |
//!
//! Whichever signal finds the barrier satisfied first takes the resumption
//! claim (set-if-absent); every other caller sees the claim taken and backs
//! off. Only the claim holder runs the [`ResumptionDriver`].

use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time;
use uuid::Uuid;

use crate::domain::execution::ExecutionStatus;
use crate::domain::foundation::ExecutionId;
use crate::domain::resumption::{OutcomeStatus, ResumptionOutcome};
use crate::ports::{StatusEvent, StatusPublisher};

use super::ledger::{ExecutionLedger, LedgerError, Transition};
use super::resumption_driver::{ResumptionDriver, ResumptionError};

#[derive(Debug, Clone, Error)]
pub enum WatcherError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Resumption(#[from] ResumptionError),
}

/// What a single barrier check found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Dispatched invocations are still running, or the stream is still open.
    Waiting { outstanding: usize },
    /// This caller won the claim and delivered the outcome.
    Resumed(OutcomeStatus),
    /// The execution is already resuming or finished.
    AlreadyResolved,
    /// The barrier was met but another caller holds the claim.
    LostClaim,
    /// No such execution (never begun, or its keys expired).
    Missing,
}

/// Watches executions until their barrier is met or their deadline passes.
pub struct CompletionWatcher {
    ledger: Arc<ExecutionLedger>,
    resumption: ResumptionDriver,
    publisher: Arc<dyn StatusPublisher>,
    owner: String,
    sweep_interval: Duration,
}

impl CompletionWatcher {
    pub fn new(
        ledger: Arc<ExecutionLedger>,
        resumption: ResumptionDriver,
        publisher: Arc<dyn StatusPublisher>,
        sweep_interval: Duration,
    ) -> Self {
        Self {
            ledger,
            resumption,
            publisher,
            owner: format!("watcher-{}", Uuid::new_v4()),
            sweep_interval,
        }
    }

    /// Re-evaluates the barrier for one execution.
    ///
    /// Resumes when the turn has ended and every dispatched index has
    /// completed. A deadline that has already passed on the wall clock is
    /// handled as by [`expire`](Self::expire).
    pub async fn check(&self, execution_id: ExecutionId) -> Result<CheckOutcome, WatcherError> {
        let status = match self.ledger.status(execution_id).await {
            Ok(status) => status,
            Err(LedgerError::ExecutionNotFound(_)) => return Ok(CheckOutcome::Missing),
            Err(e) => return Err(e.into()),
        };
        if is_resolved(status) {
            return Ok(CheckOutcome::AlreadyResolved);
        }

        let record = self.ledger.record(execution_id).await?;
        if record.is_expired() {
            return self.expire_unresolved(execution_id).await;
        }

        let dispatched = self.ledger.dispatched_indices(execution_id).await?;
        let completed = self.ledger.completed_indices(execution_id).await?;
        let outstanding = dispatched.difference(&completed).count();

        if status != ExecutionStatus::AwaitingTools || outstanding > 0 {
            tracing::debug!(
                execution_id = %execution_id,
                %status,
                outstanding,
                "barrier not met"
            );
            return Ok(CheckOutcome::Waiting { outstanding });
        }

        self.try_resume(execution_id, Trigger::Barrier).await
    }

    /// Deadline path: times out every non-terminal invocation and resumes.
    pub async fn expire(&self, execution_id: ExecutionId) -> Result<CheckOutcome, WatcherError> {
        match self.ledger.status(execution_id).await {
            Ok(status) if is_resolved(status) => Ok(CheckOutcome::AlreadyResolved),
            Ok(_) => self.expire_unresolved(execution_id).await,
            Err(LedgerError::ExecutionNotFound(_)) => Ok(CheckOutcome::Missing),
            Err(e) => Err(e.into()),
        }
    }

    /// Abandons an execution whose stream can no longer be read.
    ///
    /// The first recorded reason wins; the conversation driver receives a
    /// `failed` outcome exactly once.
    pub async fn abort(
        &self,
        execution_id: ExecutionId,
        reason: &str,
    ) -> Result<CheckOutcome, WatcherError> {
        self.ledger.record_failure(execution_id, reason).await?;
        tracing::error!(execution_id = %execution_id, reason, "execution aborted");
        self.try_resume(execution_id, Trigger::Barrier).await
    }

    /// Fires [`expire`](Self::expire) once `after` has elapsed.
    pub fn arm_deadline(self: &Arc<Self>, execution_id: ExecutionId, after: Duration) -> JoinHandle<()> {
        let watcher = Arc::clone(self);
        tokio::spawn(async move {
            time::sleep(after).await;
            match watcher.expire(execution_id).await {
                Ok(outcome) => {
                    tracing::debug!(execution_id = %execution_id, ?outcome, "deadline fired")
                }
                Err(e) => {
                    tracing::warn!(execution_id = %execution_id, error = %e, "deadline check failed")
                }
            }
        })
    }

    /// Runs the sweep loop until shutdown is signalled, then sweeps once more.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut interval = time::interval(self.sweep_interval);
        interval.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        self.sweep_logged().await;
                        tracing::info!("completion sweeper stopped");
                        return;
                    }
                }

                _ = interval.tick() => {
                    self.sweep_logged().await;
                }
            }
        }
    }

    /// Checks every active execution once. Returns how many were resumed.
    pub async fn sweep_once(&self) -> Result<usize, WatcherError> {
        let mut resumed = 0;
        for execution_id in self.ledger.active_executions().await? {
            match self.check(execution_id).await {
                Ok(CheckOutcome::Resumed(_)) => resumed += 1,
                Ok(CheckOutcome::Missing) => {
                    tracing::debug!(execution_id = %execution_id, "dropping vanished execution");
                    self.ledger.deactivate(execution_id).await?;
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(execution_id = %execution_id, error = %e, "sweep check failed");
                }
            }
        }
        Ok(resumed)
    }

    async fn sweep_logged(&self) {
        match self.sweep_once().await {
            Ok(0) => {}
            Ok(resumed) => tracing::info!(resumed, "sweep resumed executions"),
            Err(e) => tracing::warn!(error = %e, "sweep failed"),
        }
    }

    async fn expire_unresolved(&self, execution_id: ExecutionId) -> Result<CheckOutcome, WatcherError> {
        self.try_resume(execution_id, Trigger::Deadline).await
    }

    async fn time_out_outstanding(&self, execution_id: ExecutionId) -> Result<(), WatcherError> {
        for index in self.ledger.indices(execution_id).await? {
            match self
                .ledger
                .update_invocation(execution_id, index, |inv| inv.time_out())
                .await?
            {
                Transition::Applied(invocation) => {
                    self.ledger.mark_completed(execution_id, index).await?;
                    tracing::warn!(
                        execution_id = %execution_id,
                        index,
                        tool_name = invocation.tool_name(),
                        "invocation timed out"
                    );
                    if let Err(e) = self.publisher.publish(StatusEvent::invocation(&invocation)).await {
                        tracing::warn!(execution_id = %execution_id, error = %e, "failed to publish timeout");
                    }
                }
                Transition::Rejected(invocation) if invocation.dispatch_status().is_complete() => {
                    self.ledger.mark_completed(execution_id, index).await?;
                }
                Transition::Rejected(_) => {}
            }
        }
        Ok(())
    }

    /// Claims resumption and delivers the outcome.
    ///
    /// Invocations are timed out and read only after the claim is taken. A
    /// dispatcher checks the claim after recording its invocation, so every
    /// invocation is either seen here or withdrawn by its dispatcher.
    async fn try_resume(
        &self,
        execution_id: ExecutionId,
        trigger: Trigger,
    ) -> Result<CheckOutcome, WatcherError> {
        if !self.ledger.claim_resumption(execution_id, &self.owner).await? {
            return Ok(CheckOutcome::LostClaim);
        }

        let outcome = match self.prepare_claimed(execution_id, trigger).await {
            Ok(Some(outcome)) => outcome,
            Ok(None) => return Ok(CheckOutcome::AlreadyResolved),
            Err(e) => {
                tracing::warn!(
                    execution_id = %execution_id,
                    error = %e,
                    "resumption not ready; releasing claim"
                );
                if let Err(release) = self.ledger.release_resumption(execution_id).await {
                    tracing::error!(
                        execution_id = %execution_id,
                        error = %release,
                        "failed to release resumption claim"
                    );
                }
                return Err(e);
            }
        };

        let outcome = self.resumption.deliver(outcome).await?;
        Ok(CheckOutcome::Resumed(outcome.status))
    }

    /// Everything before delivery. `None` means the execution already finished.
    async fn prepare_claimed(
        &self,
        execution_id: ExecutionId,
        trigger: Trigger,
    ) -> Result<Option<ResumptionOutcome>, WatcherError> {
        if trigger == Trigger::Deadline {
            self.time_out_outstanding(execution_id).await?;
        }
        let outcome = self.resumption.prepare(execution_id).await?;

        if let Transition::Rejected(current) = self
            .ledger
            .transition_status(execution_id, ExecutionStatus::Resuming)
            .await?
        {
            if current.is_finished() {
                return Ok(None);
            }
            tracing::warn!(execution_id = %execution_id, %current, "resuming from unexpected status");
        }
        Ok(Some(outcome))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    Barrier,
    Deadline,
}

fn is_resolved(status: ExecutionStatus) -> bool {
    status.is_finished() || status == ExecutionStatus::Resuming
}

impl std::fmt::Debug for CompletionWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompletionWatcher")
            .field("owner", &self.owner)
            .field("sweep_interval", &self.sweep_interval)
            .finish_non_exhaustive()
    }
}
