//! Status publisher that writes every event to the tracing pipeline.
//!
//! Default sink for the binary: observers tail the structured log.

use async_trait::async_trait;

use crate::domain::foundation::{DomainError, ErrorCode};
use crate::ports::{StatusEvent, StatusPublisher};

/// Emits status events as `tracing` records under the `tool_relay::status` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingStatusPublisher;

impl TracingStatusPublisher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StatusPublisher for TracingStatusPublisher {
    async fn publish(&self, event: StatusEvent) -> Result<(), DomainError> {
        let payload = serde_json::to_string(&event)
            .map_err(|e| DomainError::new(ErrorCode::PublishFailed, e.to_string()))?;

        match &event {
            StatusEvent::ProtocolError { .. } => tracing::warn!(
                target: "tool_relay::status",
                event_type = event.event_type(),
                execution_id = %event.execution_id(),
                %payload,
                "status event"
            ),
            _ => tracing::info!(
                target: "tool_relay::status",
                event_type = event.event_type(),
                execution_id = %event.execution_id(),
                %payload,
                "status event"
            ),
        }
        Ok(())
    }
}
