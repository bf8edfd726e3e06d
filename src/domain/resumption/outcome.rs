//! ResumptionOutcome - what the conversation driver receives once per execution.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::foundation::{ExecutionId, InvocationId};
use crate::domain::invocation::{DispatchStatus, Invocation};

/// Overall verdict of an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Every invocation succeeded with structured arguments.
    Complete,
    /// At least one invocation failed, timed out, or had degraded arguments.
    Partial,
    /// The stream itself could not be read to the end.
    Failed,
}

/// One invocation's result, in dispatch order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderedResult {
    pub index: u64,
    pub invocation_id: InvocationId,
    pub tool_name: String,
    pub status: DispatchStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Why an invocation keeps the outcome from being complete.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosticKind {
    DegradedArguments { raw_arguments: String },
    Failed { reason: String },
    TimedOut,
    /// Still non-terminal at resumption; only seen for failed executions.
    Unfinished { status: DispatchStatus },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationDiagnostic {
    pub index: u64,
    pub invocation_id: InvocationId,
    pub tool_name: String,
    #[serde(flatten)]
    pub kind: DiagnosticKind,
}

/// Result set handed to the conversation driver exactly once per execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumptionOutcome {
    pub execution_id: ExecutionId,
    pub status: OutcomeStatus,
    pub ordered_results: Vec<OrderedResult>,
    pub diagnostics: Vec<InvocationDiagnostic>,
    /// Why the stream was abandoned, for `Failed` outcomes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl ResumptionOutcome {
    /// Builds the outcome from the execution's invocation records.
    ///
    /// Records may arrive in any order; results are sorted by `index`.
    pub fn assemble(execution_id: ExecutionId, invocations: Vec<Invocation>) -> Self {
        let (ordered_results, diagnostics) = collect(invocations);
        let status = if diagnostics.is_empty() {
            OutcomeStatus::Complete
        } else {
            OutcomeStatus::Partial
        };
        Self {
            execution_id,
            status,
            ordered_results,
            diagnostics,
            failure: None,
        }
    }

    /// Builds a failed outcome for an execution whose stream was abandoned.
    pub fn failed(
        execution_id: ExecutionId,
        reason: impl Into<String>,
        invocations: Vec<Invocation>,
    ) -> Self {
        let (ordered_results, diagnostics) = collect(invocations);
        Self {
            execution_id,
            status: OutcomeStatus::Failed,
            ordered_results,
            diagnostics,
            failure: Some(reason.into()),
        }
    }

    /// Results that succeeded, in index order.
    pub fn successes(&self) -> impl Iterator<Item = &OrderedResult> {
        self.ordered_results.iter().filter(|r| r.status.is_success())
    }
}

fn collect(mut invocations: Vec<Invocation>) -> (Vec<OrderedResult>, Vec<InvocationDiagnostic>) {
    invocations.sort_by_key(Invocation::index);

    let mut diagnostics = Vec::new();
    let results = invocations
        .iter()
        .map(|inv| {
            let mut diagnose = |kind| {
                diagnostics.push(InvocationDiagnostic {
                    index: inv.index(),
                    invocation_id: inv.invocation_id().clone(),
                    tool_name: inv.tool_name().to_string(),
                    kind,
                })
            };
            if inv.is_degraded() {
                diagnose(DiagnosticKind::DegradedArguments {
                    raw_arguments: inv.raw_arguments().to_string(),
                });
            }
            match inv.dispatch_status() {
                DispatchStatus::Succeeded => {}
                DispatchStatus::Failed => diagnose(DiagnosticKind::Failed {
                    reason: inv.error().unwrap_or("unknown failure").to_string(),
                }),
                DispatchStatus::TimedOut => diagnose(DiagnosticKind::TimedOut),
                status => diagnose(DiagnosticKind::Unfinished { status }),
            }
            OrderedResult {
                index: inv.index(),
                invocation_id: inv.invocation_id().clone(),
                tool_name: inv.tool_name().to_string(),
                status: inv.dispatch_status(),
                result: inv.result().cloned(),
                error: inv.error().map(str::to_string),
            }
        })
        .collect();

    (results, diagnostics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::foundation::SequenceTimestamp;
    use crate::domain::invocation::ToolArguments;
    use crate::domain::stream::CompletedToolCall;
    use serde_json::json;

    fn invocation(exec: ExecutionId, index: u64, raw: &str) -> Invocation {
        let arguments = ToolArguments::from_fragment(raw);
        Invocation::new(
            exec,
            index,
            CompletedToolCall {
                block_stream_index: index as u32,
                invocation_id: InvocationId::new(format!("toolu_{}", index)).unwrap(),
                tool_name: format!("tool_{}", index),
                raw_arguments: raw.to_string(),
                degraded: arguments.is_degraded(),
                arguments,
                opened_at: SequenceTimestamp::new(1, index as u32),
                closed_at: SequenceTimestamp::new(2, index as u32),
            },
        )
    }

    fn succeeded(exec: ExecutionId, index: u64, raw: &str) -> Invocation {
        let mut inv = invocation(exec, index, raw);
        inv.mark_dispatched().unwrap();
        inv.mark_executing().unwrap();
        inv.succeed(json!({"index": index})).unwrap();
        inv
    }

    #[test]
    fn all_successes_make_complete_outcome_in_index_order() {
        let exec = ExecutionId::new();
        let outcome = ResumptionOutcome::assemble(
            exec,
            vec![succeeded(exec, 2, "{}"), succeeded(exec, 0, "{}"), succeeded(exec, 1, "{}")],
        );

        assert_eq!(outcome.status, OutcomeStatus::Complete);
        let indices: Vec<_> = outcome.ordered_results.iter().map(|r| r.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(outcome.diagnostics.is_empty());
        assert_eq!(outcome.successes().count(), 3);
    }

    #[test]
    fn timeout_makes_partial_outcome() {
        let exec = ExecutionId::new();
        let mut slow = invocation(exec, 1, "{}");
        slow.mark_dispatched().unwrap();
        slow.time_out().unwrap();

        let outcome = ResumptionOutcome::assemble(exec, vec![succeeded(exec, 0, "{}"), slow]);

        assert_eq!(outcome.status, OutcomeStatus::Partial);
        assert_eq!(outcome.diagnostics.len(), 1);
        assert_eq!(outcome.diagnostics[0].index, 1);
        assert_eq!(outcome.diagnostics[0].kind, DiagnosticKind::TimedOut);
        assert_eq!(outcome.successes().count(), 1);
    }

    #[test]
    fn degraded_success_is_still_partial() {
        let exec = ExecutionId::new();
        let outcome = ResumptionOutcome::assemble(exec, vec![succeeded(exec, 0, r#"{"a":"#)]);

        assert_eq!(outcome.status, OutcomeStatus::Partial);
        assert_eq!(
            outcome.diagnostics[0].kind,
            DiagnosticKind::DegradedArguments {
                raw_arguments: r#"{"a":"#.to_string()
            }
        );
        assert_eq!(outcome.ordered_results[0].status, DispatchStatus::Succeeded);
    }

    #[test]
    fn failed_outcome_keeps_reason_and_unfinished_work() {
        let exec = ExecutionId::new();
        let outcome = ResumptionOutcome::failed(exec, "stream truncated", vec![invocation(exec, 0, "{}")]);

        assert_eq!(outcome.status, OutcomeStatus::Failed);
        assert_eq!(outcome.failure.as_deref(), Some("stream truncated"));
        assert_eq!(
            outcome.diagnostics[0].kind,
            DiagnosticKind::Unfinished {
                status: DispatchStatus::Pending
            }
        );
    }

    #[test]
    fn empty_execution_is_complete() {
        let outcome = ResumptionOutcome::assemble(ExecutionId::new(), vec![]);
        assert_eq!(outcome.status, OutcomeStatus::Complete);
        assert!(outcome.ordered_results.is_empty());
    }
}
