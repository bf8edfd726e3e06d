//! Conversation driver that records outcomes in the structured log.
//!
//! Used by the standalone binary, where no conversation loop is attached.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::domain::resumption::ResumptionOutcome;
use crate::ports::ConversationDriver;

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingConversationDriver;

impl TracingConversationDriver {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ConversationDriver for TracingConversationDriver {
    async fn on_resumption(&self, outcome: ResumptionOutcome) -> Result<(), DomainError> {
        let payload = serde_json::to_string(&outcome)
            .map_err(|e| DomainError::new(ErrorCode::DriverRejected, e.to_string()))?;
        tracing::info!(
            target: "tool_relay::resumption",
            execution_id = %outcome.execution_id,
            status = ?outcome.status,
            %payload,
            "resumption outcome"
        );
        Ok(())
    }
}
