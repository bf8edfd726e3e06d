//! DispatchStatus enum - forward-only lifecycle of one invocation.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::foundation::StateMachine;

/// Where an invocation is in its dispatch lifecycle.
///
/// ```text
/// pending -> dispatched -> executing -> succeeded | failed | timed_out
///    |            |-> failed (executor unreachable)
///    +------------+-> timed_out (execution deadline)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DispatchStatus {
    #[default]
    Pending,
    Dispatched,
    Executing,
    Succeeded,
    Failed,
    TimedOut,
}

impl DispatchStatus {
    /// Returns true for succeeded, failed and timed out.
    pub fn is_complete(&self) -> bool {
        self.is_terminal()
    }

    /// Returns true only for a successful result.
    pub fn is_success(&self) -> bool {
        matches!(self, DispatchStatus::Succeeded)
    }

    /// Lowercase label used in status events and logs.
    pub fn label(&self) -> &'static str {
        match self {
            DispatchStatus::Pending => "pending",
            DispatchStatus::Dispatched => "dispatched",
            DispatchStatus::Executing => "executing",
            DispatchStatus::Succeeded => "succeeded",
            DispatchStatus::Failed => "failed",
            DispatchStatus::TimedOut => "timed_out",
        }
    }
}

impl StateMachine for DispatchStatus {
    fn valid_transitions(&self) -> Vec<Self> {
        use DispatchStatus::*;
        match self {
            Pending => vec![Dispatched, TimedOut],
            Dispatched => vec![Executing, Failed, TimedOut],
            Executing => vec![Succeeded, Failed, TimedOut],
            Succeeded | Failed | TimedOut => vec![],
        }
    }
}

impl fmt::Display for DispatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use DispatchStatus::*;

    const ALL: [DispatchStatus; 6] = [Pending, Dispatched, Executing, Succeeded, Failed, TimedOut];

    #[test]
    fn happy_path_is_forward() {
        let status = Pending
            .transition_to(Dispatched)
            .and_then(|s| s.transition_to(Executing))
            .and_then(|s| s.transition_to(Succeeded));
        assert_eq!(status, Ok(Succeeded));
    }

    #[test]
    fn no_status_regresses() {
        let rank = |s: DispatchStatus| match s {
            Pending => 0,
            Dispatched => 1,
            Executing => 2,
            Succeeded | Failed | TimedOut => 3,
        };
        for from in ALL {
            for to in from.valid_transitions() {
                assert!(rank(to) > rank(from), "{:?} -> {:?} regresses", from, to);
            }
        }
    }

    #[test]
    fn cannot_dispatch_twice() {
        assert!(Dispatched.transition_to(Dispatched).is_err());
    }

    #[test]
    fn terminal_states_are_complete() {
        assert!(Succeeded.is_complete());
        assert!(Failed.is_complete());
        assert!(TimedOut.is_complete());
        assert!(!Executing.is_complete());
    }

    #[test]
    fn every_live_state_can_time_out() {
        for status in [Pending, Dispatched, Executing] {
            assert!(status.can_transition_to(&TimedOut));
        }
    }

    #[test]
    fn serializes_snake_case() {
        assert_eq!(serde_json::to_string(&TimedOut).unwrap(), "\"timed_out\"");
    }
}
