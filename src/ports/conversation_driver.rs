//! Conversation Driver Port - receives the single resumption per execution.

use async_trait::async_trait;

use crate::domain::foundation::DomainError;
use crate::domain::resumption::ResumptionOutcome;

/// Port for the component that continues the conversation after tools ran.
///
/// Called exactly once per execution, whether the outcome is complete,
/// partial or failed.
#[async_trait]
pub trait ConversationDriver: Send + Sync {
    /// Deliver the outcome.
    ///
    /// An error does not cause a second delivery; the execution is marked
    /// failed instead.
    async fn on_resumption(&self, outcome: ResumptionOutcome) -> Result<(), DomainError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(dead_code)]
    fn assert_object_safe(_: &dyn ConversationDriver) {}
}
