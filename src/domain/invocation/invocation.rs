//! Invocation entity - one recognized tool call within an execution.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::foundation::{
    ExecutionId, InvocationId, SequenceTimestamp, StateMachine, Timestamp, ValidationError,
};
use crate::domain::stream::CompletedToolCall;

use super::{DispatchStatus, ToolArguments};

/// A tool call that finished streaming and received a dispatch index.
///
/// # Invariants
///
/// - `index` is unique within the execution and never reassigned
/// - `dispatch_status` only moves forward along [`DispatchStatus`] edges
/// - `result` is present only when `dispatch_status` is `Succeeded`
/// - `error` is present only when `dispatch_status` is `Failed` or `TimedOut`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    execution_id: ExecutionId,

    /// Dispatch order within the execution.
    index: u64,

    invocation_id: InvocationId,
    tool_name: String,

    /// Position of the block in the model's stream.
    block_stream_index: u32,

    raw_arguments: String,
    arguments: ToolArguments,
    degraded: bool,

    dispatch_status: DispatchStatus,
    result: Option<Value>,
    error: Option<String>,

    /// Presentation order relative to text segments.
    sequence: SequenceTimestamp,

    created_at: Timestamp,
    dispatched_at: Option<Timestamp>,
    completed_at: Option<Timestamp>,
}

impl Invocation {
    /// Creates a pending invocation from a completed stream block.
    pub fn new(execution_id: ExecutionId, index: u64, call: CompletedToolCall) -> Self {
        Self {
            execution_id,
            index,
            invocation_id: call.invocation_id,
            tool_name: call.tool_name,
            block_stream_index: call.block_stream_index,
            raw_arguments: call.raw_arguments,
            arguments: call.arguments,
            degraded: call.degraded,
            dispatch_status: DispatchStatus::Pending,
            result: None,
            error: None,
            sequence: call.opened_at,
            created_at: Timestamp::now(),
            dispatched_at: None,
            completed_at: None,
        }
    }

    /// Moves to `dispatched`.
    pub fn mark_dispatched(&mut self) -> Result<(), ValidationError> {
        self.advance(DispatchStatus::Dispatched)?;
        self.dispatched_at = Some(Timestamp::now());
        Ok(())
    }

    /// Moves to `executing`.
    pub fn mark_executing(&mut self) -> Result<(), ValidationError> {
        self.advance(DispatchStatus::Executing)
    }

    /// Records a successful result.
    pub fn succeed(&mut self, result: Value) -> Result<(), ValidationError> {
        self.advance(DispatchStatus::Succeeded)?;
        self.result = Some(result);
        self.completed_at = Some(Timestamp::now());
        Ok(())
    }

    /// Records a failure with its reason.
    pub fn fail(&mut self, reason: impl Into<String>) -> Result<(), ValidationError> {
        self.advance(DispatchStatus::Failed)?;
        self.error = Some(reason.into());
        self.completed_at = Some(Timestamp::now());
        Ok(())
    }

    /// Records that the execution deadline passed first.
    pub fn time_out(&mut self) -> Result<(), ValidationError> {
        self.advance(DispatchStatus::TimedOut)?;
        self.error = Some("execution deadline exceeded".to_string());
        self.completed_at = Some(Timestamp::now());
        Ok(())
    }

    fn advance(&mut self, target: DispatchStatus) -> Result<(), ValidationError> {
        self.dispatch_status = self.dispatch_status.transition_to(target)?;
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════
    // Getters
    // ═══════════════════════════════════════════════════════════════════════

    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    pub fn index(&self) -> u64 {
        self.index
    }

    pub fn invocation_id(&self) -> &InvocationId {
        &self.invocation_id
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    pub fn block_stream_index(&self) -> u32 {
        self.block_stream_index
    }

    pub fn raw_arguments(&self) -> &str {
        &self.raw_arguments
    }

    pub fn arguments(&self) -> &ToolArguments {
        &self.arguments
    }

    /// True when the arguments could not be parsed as JSON.
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    pub fn dispatch_status(&self) -> DispatchStatus {
        self.dispatch_status
    }

    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn sequence(&self) -> SequenceTimestamp {
        self.sequence
    }

    pub fn created_at(&self) -> Timestamp {
        self.created_at
    }

    pub fn dispatched_at(&self) -> Option<Timestamp> {
        self.dispatched_at
    }

    pub fn completed_at(&self) -> Option<Timestamp> {
        self.completed_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(raw: &str) -> CompletedToolCall {
        let arguments = ToolArguments::from_fragment(raw);
        CompletedToolCall {
            block_stream_index: 2,
            invocation_id: InvocationId::new("toolu_9").unwrap(),
            tool_name: "search".to_string(),
            raw_arguments: raw.to_string(),
            degraded: arguments.is_degraded(),
            arguments,
            opened_at: SequenceTimestamp::new(100, 0),
            closed_at: SequenceTimestamp::new(100, 4),
        }
    }

    #[test]
    fn new_invocation_is_pending() {
        let inv = Invocation::new(ExecutionId::new(), 3, call(r#"{"q":"x"}"#));
        assert_eq!(inv.index(), 3);
        assert_eq!(inv.block_stream_index(), 2);
        assert_eq!(inv.dispatch_status(), DispatchStatus::Pending);
        assert_eq!(inv.sequence(), SequenceTimestamp::new(100, 0));
        assert!(!inv.is_degraded());
        assert!(inv.dispatched_at().is_none());
    }

    #[test]
    fn happy_path_records_result() {
        let mut inv = Invocation::new(ExecutionId::new(), 0, call("{}"));
        inv.mark_dispatched().unwrap();
        inv.mark_executing().unwrap();
        inv.succeed(json!({"hits": 2})).unwrap();

        assert_eq!(inv.dispatch_status(), DispatchStatus::Succeeded);
        assert_eq!(inv.result(), Some(&json!({"hits": 2})));
        assert!(inv.error().is_none());
        assert!(inv.completed_at().is_some());
    }

    #[test]
    fn terminal_state_is_final() {
        let mut inv = Invocation::new(ExecutionId::new(), 0, call("{}"));
        inv.mark_dispatched().unwrap();
        inv.time_out().unwrap();

        assert!(inv.mark_executing().is_err());
        assert!(inv.succeed(json!(1)).is_err());
        assert_eq!(inv.dispatch_status(), DispatchStatus::TimedOut);
        assert!(inv.result().is_none());
    }

    #[test]
    fn cannot_execute_before_dispatch() {
        let mut inv = Invocation::new(ExecutionId::new(), 0, call("{}"));
        assert!(inv.mark_executing().is_err());
        assert_eq!(inv.dispatch_status(), DispatchStatus::Pending);
    }

    #[test]
    fn dispatched_invocation_can_fail_without_executing() {
        let mut inv = Invocation::new(ExecutionId::new(), 0, call("{}"));
        inv.mark_dispatched().unwrap();
        inv.fail("executor unreachable").unwrap();
        assert_eq!(inv.error(), Some("executor unreachable"));
    }

    #[test]
    fn degraded_arguments_survive_serialization() {
        let inv = Invocation::new(ExecutionId::new(), 1, call(r#"{"q":"#));
        let json = serde_json::to_string(&inv).unwrap();
        let back: Invocation = serde_json::from_str(&json).unwrap();
        assert!(back.is_degraded());
        assert_eq!(back.arguments(), &ToolArguments::Raw(r#"{"q":"#.to_string()));
    }
}
