//! In-memory status bus for testing.
//!
//! Captures every published [`StatusEvent`] for assertions. A failure switch
//! lets tests prove that publish errors never disturb coordination.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use crate::domain::foundation::{DomainError, ErrorCode, ExecutionId};
use crate::domain::invocation::DispatchStatus;
use crate::ports::{StatusEvent, StatusPublisher};

/// In-memory status sink.
///
/// # Example
///
/// ```ignore
/// let bus = Arc::new(InMemoryStatusBus::new());
/// coordinator.process_stream(execution_id, stream).await?;
///
/// assert!(bus.has_event("execution.resumed"));
/// assert_eq!(bus.statuses_for(execution_id, 0), vec![Pending, Dispatched, Executing, Succeeded]);
/// ```
#[derive(Debug, Default)]
pub struct InMemoryStatusBus {
    published: RwLock<Vec<StatusEvent>>,
    failing: AtomicBool,
}

impl InMemoryStatusBus {
    /// Creates a new empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent publish fail (events are still captured).
    pub fn fail_publishes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    // === Test Helpers ===

    /// Returns all published events.
    pub fn published_events(&self) -> Vec<StatusEvent> {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns events of a specific type.
    pub fn events_of_type(&self, event_type: &str) -> Vec<StatusEvent> {
        self.published_events()
            .into_iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Returns events for a specific execution.
    pub fn events_for_execution(&self, execution_id: ExecutionId) -> Vec<StatusEvent> {
        self.published_events()
            .into_iter()
            .filter(|e| e.execution_id() == execution_id)
            .collect()
    }

    /// Status progression observed for one invocation, in publish order.
    pub fn statuses_for(&self, execution_id: ExecutionId, index: u64) -> Vec<DispatchStatus> {
        self.events_for_execution(execution_id)
            .into_iter()
            .filter_map(|e| match e {
                StatusEvent::InvocationStatus {
                    index: i, status, ..
                } if i == index => Some(status),
                _ => None,
            })
            .collect()
    }

    /// Returns count of published events.
    pub fn event_count(&self) -> usize {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Checks if a specific event type was published.
    pub fn has_event(&self, event_type: &str) -> bool {
        self.published
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|e| e.event_type() == event_type)
    }

    /// Clears all published events (for test isolation).
    pub fn clear(&self) {
        self.published
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[async_trait]
impl StatusPublisher for InMemoryStatusBus {
    async fn publish(&self, event: StatusEvent) -> Result<(), DomainError> {
        self.published
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);

        if self.failing.load(Ordering::SeqCst) {
            return Err(DomainError::new(
                ErrorCode::PublishFailed,
                "status bus configured to fail",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::resumption::OutcomeStatus;

    fn resumed(execution_id: ExecutionId) -> StatusEvent {
        StatusEvent::Resumed {
            execution_id,
            outcome: OutcomeStatus::Complete,
        }
    }

    #[tokio::test]
    async fn publish_captures_events() {
        let bus = InMemoryStatusBus::new();
        let exec = ExecutionId::new();

        bus.publish(resumed(exec)).await.unwrap();

        assert_eq!(bus.event_count(), 1);
        assert!(bus.has_event("execution.resumed"));
        assert_eq!(bus.events_for_execution(exec).len(), 1);
        assert!(bus.events_for_execution(ExecutionId::new()).is_empty());
    }

    #[tokio::test]
    async fn publish_all_keeps_order() {
        let bus = InMemoryStatusBus::new();
        let first = ExecutionId::new();
        let second = ExecutionId::new();

        bus.publish_all(vec![resumed(first), resumed(second)])
            .await
            .unwrap();

        let events = bus.published_events();
        assert_eq!(events[0].execution_id(), first);
        assert_eq!(events[1].execution_id(), second);
    }

    #[tokio::test]
    async fn failing_bus_returns_error_but_still_captures() {
        let bus = InMemoryStatusBus::new();
        bus.fail_publishes(true);

        let result = bus.publish(resumed(ExecutionId::new())).await;

        assert_eq!(result.unwrap_err().code, ErrorCode::PublishFailed);
        assert_eq!(bus.event_count(), 1);
    }

    #[tokio::test]
    async fn clear_removes_all() {
        let bus = InMemoryStatusBus::new();
        bus.publish(resumed(ExecutionId::new())).await.unwrap();
        bus.clear();
        assert_eq!(bus.event_count(), 0);
    }
}
