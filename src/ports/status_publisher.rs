//! StatusPublisher port - best-effort observer events.
//!
//! Observers (UIs, audit sinks) see invocation status changes, text segments
//! as they stream, protocol errors and the final resumption. Delivery is best
//! effort: the coordinator logs a publish failure and carries on.

use async_trait::async_trait;
use serde::Serialize;

use crate::domain::foundation::{DomainError, ExecutionId, InvocationId, Timestamp};
use crate::domain::invocation::{DispatchStatus, Invocation};
use crate::domain::resumption::OutcomeStatus;
use crate::domain::stream::TextSegment;

/// One observer event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StatusEvent {
    InvocationStatus {
        execution_id: ExecutionId,
        index: u64,
        invocation_id: InvocationId,
        tool_name: String,
        status: DispatchStatus,
        at: Timestamp,
    },
    Text {
        execution_id: ExecutionId,
        segment: TextSegment,
    },
    ProtocolError {
        execution_id: ExecutionId,
        block_stream_index: Option<u32>,
        message: String,
    },
    Resumed {
        execution_id: ExecutionId,
        outcome: OutcomeStatus,
    },
}

impl StatusEvent {
    /// Snapshot of an invocation's current status.
    pub fn invocation(invocation: &Invocation) -> Self {
        StatusEvent::InvocationStatus {
            execution_id: invocation.execution_id(),
            index: invocation.index(),
            invocation_id: invocation.invocation_id().clone(),
            tool_name: invocation.tool_name().to_string(),
            status: invocation.dispatch_status(),
            at: Timestamp::now(),
        }
    }

    /// Routing key, e.g. `invocation.status`.
    pub fn event_type(&self) -> &'static str {
        match self {
            StatusEvent::InvocationStatus { .. } => "invocation.status",
            StatusEvent::Text { .. } => "stream.text",
            StatusEvent::ProtocolError { .. } => "stream.protocol_error",
            StatusEvent::Resumed { .. } => "execution.resumed",
        }
    }

    pub fn execution_id(&self) -> ExecutionId {
        match self {
            StatusEvent::InvocationStatus { execution_id, .. }
            | StatusEvent::Text { execution_id, .. }
            | StatusEvent::ProtocolError { execution_id, .. }
            | StatusEvent::Resumed { execution_id, .. } => *execution_id,
        }
    }
}

/// Port for publishing observer events.
///
/// # Example
///
/// ```ignore
/// publisher.publish(StatusEvent::invocation(&invocation)).await?;
/// ```
#[async_trait]
pub trait StatusPublisher: Send + Sync {
    /// Publish a single event.
    async fn publish(&self, event: StatusEvent) -> Result<(), DomainError>;

    /// Publish several events in order.
    async fn publish_all(&self, events: Vec<StatusEvent>) -> Result<(), DomainError> {
        for event in events {
            self.publish(event).await?;
        }
        Ok(())
    }
}
