//! ExecutionStatus enum for tracking the lifecycle of one execution.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::domain::foundation::{StateMachine, ValidationError};

/// Lifecycle status of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// The model stream is still being read.
    #[default]
    Streaming,
    /// The turn ended; waiting for dispatched invocations to finish.
    AwaitingTools,
    /// Resumption was claimed and results are being assembled.
    Resuming,
    Complete,
    Failed,
}

impl ExecutionStatus {
    /// Storage representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Streaming => "streaming",
            ExecutionStatus::AwaitingTools => "awaiting_tools",
            ExecutionStatus::Resuming => "resuming",
            ExecutionStatus::Complete => "complete",
            ExecutionStatus::Failed => "failed",
        }
    }

    /// Returns true once the execution can no longer change.
    pub fn is_finished(&self) -> bool {
        matches!(self, ExecutionStatus::Complete | ExecutionStatus::Failed)
    }
}

impl StateMachine for ExecutionStatus {
    fn valid_transitions(&self) -> Vec<Self> {
        use ExecutionStatus::*;
        match self {
            // Streaming -> Resuming only when the deadline expires mid-stream.
            Streaming => vec![AwaitingTools, Resuming, Failed],
            AwaitingTools => vec![Resuming, Failed],
            Resuming => vec![Complete, Failed],
            Complete | Failed => vec![],
        }
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "streaming" => Ok(ExecutionStatus::Streaming),
            "awaiting_tools" => Ok(ExecutionStatus::AwaitingTools),
            "resuming" => Ok(ExecutionStatus::Resuming),
            "complete" => Ok(ExecutionStatus::Complete),
            "failed" => Ok(ExecutionStatus::Failed),
            other => Err(ValidationError::invalid_format(
                "execution_status",
                format!("unknown status '{}'", other),
            )),
        }
    }
}
