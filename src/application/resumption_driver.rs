//! ResumptionDriver - assembles and delivers the one outcome per execution.
//!
//! Callers must hold the execution's resumption claim; the driver itself
//! does not guard against being run twice. [`ResumptionDriver::prepare`] only
//! reads, [`ResumptionDriver::deliver`] is the point of no return.

use std::sync::Arc;
use thiserror::Error;

use crate::domain::execution::ExecutionStatus;
use crate::domain::foundation::ExecutionId;
use crate::domain::resumption::{OutcomeStatus, ResumptionOutcome};
use crate::ports::{ConversationDriver, StatusEvent, StatusPublisher};

use super::ledger::{ExecutionLedger, LedgerError, Transition};

#[derive(Debug, Clone, Error)]
pub enum ResumptionError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// Builds the ordered outcome, hands it to the conversation driver and
/// finishes the execution.
#[derive(Clone)]
pub struct ResumptionDriver {
    ledger: Arc<ExecutionLedger>,
    driver: Arc<dyn ConversationDriver>,
    publisher: Arc<dyn StatusPublisher>,
}

impl ResumptionDriver {
    pub fn new(
        ledger: Arc<ExecutionLedger>,
        driver: Arc<dyn ConversationDriver>,
        publisher: Arc<dyn StatusPublisher>,
    ) -> Self {
        Self {
            ledger,
            driver,
            publisher,
        }
    }

    /// Prepares and delivers in one step.
    pub async fn resume(&self, execution_id: ExecutionId) -> Result<ResumptionOutcome, ResumptionError> {
        let outcome = self.prepare(execution_id).await?;
        self.deliver(outcome).await
    }

    /// Reads the invocation records and builds the outcome. Writes nothing,
    /// so a failure here leaves the execution free to be resumed later.
    pub async fn prepare(&self, execution_id: ExecutionId) -> Result<ResumptionOutcome, ResumptionError> {
        let invocations = self.ledger.invocations(execution_id).await?;
        Ok(match self.ledger.failure(execution_id).await? {
            Some(reason) => ResumptionOutcome::failed(execution_id, reason, invocations),
            None => ResumptionOutcome::assemble(execution_id, invocations),
        })
    }

    /// Delivers the outcome and moves the execution to `complete` or `failed`.
    pub async fn deliver(&self, outcome: ResumptionOutcome) -> Result<ResumptionOutcome, ResumptionError> {
        let execution_id = outcome.execution_id;
        let delivered = match self.driver.on_resumption(outcome.clone()).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(
                    execution_id = %execution_id,
                    error = %e,
                    "conversation driver rejected resumption"
                );
                false
            }
        };

        let final_status = if delivered && outcome.status != OutcomeStatus::Failed {
            ExecutionStatus::Complete
        } else {
            ExecutionStatus::Failed
        };
        if let Transition::Rejected(current) =
            self.ledger.transition_status(execution_id, final_status).await?
        {
            tracing::warn!(
                execution_id = %execution_id,
                %current,
                target = %final_status,
                "execution status did not accept final transition"
            );
        }

        tracing::info!(
            execution_id = %execution_id,
            outcome = ?outcome.status,
            results = outcome.ordered_results.len(),
            diagnostics = outcome.diagnostics.len(),
            "execution resumed"
        );

        let event = StatusEvent::Resumed {
            execution_id,
            outcome: outcome.status,
        };
        if let Err(e) = self.publisher.publish(event).await {
            tracing::warn!(execution_id = %execution_id, error = %e, "failed to publish resumption");
        }

        self.ledger.retire(execution_id).await?;
        Ok(outcome)
    }
}

impl std::fmt::Debug for ResumptionDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResumptionDriver").finish_non_exhaustive()
    }
}
