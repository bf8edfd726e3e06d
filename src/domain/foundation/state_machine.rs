//! State machine trait for status enums.
//!
//! Execution and invocation statuses only ever move forward. Implementors
//! list their legal edges; everything else is rejected.

use super::ValidationError;

/// Trait for status enums that represent forward-only state machines.
///
/// # Example
///
/// ```ignore
/// let next = DispatchStatus::Dispatched.transition_to(DispatchStatus::Executing)?;
/// assert!(DispatchStatus::Dispatched.transition_to(DispatchStatus::Pending).is_err());
/// ```
pub trait StateMachine: Sized + Copy + PartialEq + std::fmt::Debug {
    /// Returns true if transition from self to target is valid.
    fn can_transition_to(&self, target: &Self) -> bool {
        self.valid_transitions().contains(target)
    }

    /// Returns all valid target states from current state.
    fn valid_transitions(&self) -> Vec<Self>;

    /// Performs transition with validation, returning error if invalid.
    fn transition_to(&self, target: Self) -> Result<Self, ValidationError> {
        if self.can_transition_to(&target) {
            Ok(target)
        } else {
            Err(ValidationError::invalid_format(
                "state_transition",
                format!("Cannot transition from {:?} to {:?}", self, target),
            ))
        }
    }

    /// Checks if current state is terminal (no valid outgoing transitions).
    fn is_terminal(&self) -> bool {
        self.valid_transitions().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    enum Light {
        Queued,
        Running,
        Done,
    }

    impl StateMachine for Light {
        fn valid_transitions(&self) -> Vec<Self> {
            match self {
                Light::Queued => vec![Light::Running, Light::Done],
                Light::Running => vec![Light::Done],
                Light::Done => vec![],
            }
        }
    }

    #[test]
    fn transition_to_succeeds_for_valid_edge() {
        assert_eq!(Light::Queued.transition_to(Light::Running), Ok(Light::Running));
    }

    #[test]
    fn transition_to_rejects_backwards_edge() {
        let err = Light::Running.transition_to(Light::Queued).unwrap_err();
        assert!(err.to_string().contains("Running"));
    }

    #[test]
    fn self_transition_is_rejected() {
        assert!(Light::Running.transition_to(Light::Running).is_err());
    }

    #[test]
    fn terminal_state_has_no_edges() {
        assert!(Light::Done.is_terminal());
        assert!(!Light::Queued.is_terminal());
    }
}
