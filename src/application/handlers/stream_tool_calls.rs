//! Stream tool calls handler.
//!
//! Reads one execution's raw event stream in order, passes text straight
//! through to observers, and dispatches every tool call the moment its block
//! closes. The handler never waits on tool execution.

use futures::{pin_mut, Stream, StreamExt};
use std::sync::Arc;
use thiserror::Error;

use crate::domain::execution::ExecutionStatus;
use crate::domain::foundation::ExecutionId;
use crate::domain::invocation::Invocation;
use crate::domain::stream::{
    order_for_presentation, BufferOutput, CompletedToolCall, ContentSegment, InvocationBuffer,
    ParseError, ProtocolError, RawStreamEvent, StopReason, StreamEvent, StreamEventParser,
    StreamFault, TextSegment, ToolSegment,
};
use crate::ports::{StatusEvent, StatusPublisher};

use crate::application::completion_watcher::{CompletionWatcher, WatcherError};
use crate::application::dispatch_coordinator::{DispatchCoordinator, DispatchError, DispatchResult};
use crate::application::index_allocator::{AllocationError, IndexAllocator};
use crate::application::ledger::{ExecutionLedger, LedgerError, Transition};

/// Command to consume the model stream of a begun execution.
#[derive(Debug, Clone, Copy)]
pub struct StreamToolCallsCommand {
    pub execution_id: ExecutionId,
}

impl StreamToolCallsCommand {
    pub fn new(execution_id: ExecutionId) -> Self {
        Self { execution_id }
    }
}

#[derive(Debug, Clone, Error)]
pub enum StreamToolCallsError {
    #[error("Execution {0} is not accepting stream events")]
    NotStreaming(ExecutionId),

    #[error("Stream aborted: {0}")]
    Aborted(StreamFault),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Watcher(#[from] WatcherError),
}

/// What the handler saw while consuming the stream.
#[derive(Debug, Clone, Default)]
pub struct StreamToolCallsResult {
    /// Text and tool segments in presentation (sequence) order.
    pub segments: Vec<ContentSegment>,
    /// Indices in the order they were dispatched.
    pub dispatched: Vec<u64>,
    pub stop_reason: Option<StopReason>,
    pub protocol_errors: usize,
    /// True when the deadline resolved the execution before the stream ended;
    /// the remaining events were not read.
    pub cut_off: bool,
}

impl StreamToolCallsResult {
    /// Concatenated text of every text segment.
    pub fn text(&self) -> String {
        self.segments
            .iter()
            .filter_map(|s| match s {
                ContentSegment::Text(t) => Some(t.text.as_str()),
                ContentSegment::Tool(_) => None,
            })
            .collect()
    }
}

/// Handler for [`StreamToolCallsCommand`].
pub struct StreamToolCallsHandler {
    ledger: Arc<ExecutionLedger>,
    allocator: IndexAllocator,
    dispatcher: Arc<DispatchCoordinator>,
    watcher: Arc<CompletionWatcher>,
    publisher: Arc<dyn StatusPublisher>,
}

impl StreamToolCallsHandler {
    pub fn new(
        ledger: Arc<ExecutionLedger>,
        allocator: IndexAllocator,
        dispatcher: Arc<DispatchCoordinator>,
        watcher: Arc<CompletionWatcher>,
        publisher: Arc<dyn StatusPublisher>,
    ) -> Self {
        Self {
            ledger,
            allocator,
            dispatcher,
            watcher,
            publisher,
        }
    }

    /// Consumes `events` until it ends.
    ///
    /// A fatal stream condition aborts the execution (the conversation driver
    /// receives a `failed` outcome) and is returned as `Aborted`.
    pub async fn handle<S>(
        &self,
        cmd: StreamToolCallsCommand,
        events: S,
    ) -> Result<StreamToolCallsResult, StreamToolCallsError>
    where
        S: Stream<Item = Result<RawStreamEvent, StreamFault>>,
    {
        let execution_id = cmd.execution_id;

        // 1. Only a streaming execution accepts events
        if self.ledger.status(execution_id).await? != ExecutionStatus::Streaming {
            return Err(StreamToolCallsError::NotStreaming(execution_id));
        }

        let mut parser = StreamEventParser::new();
        let mut buffer = InvocationBuffer::new();
        let mut result = StreamToolCallsResult::default();

        // 2. Parse, buffer and dispatch in arrival order
        pin_mut!(events);
        while let Some(item) = events.next().await {
            let raw = match item {
                Ok(raw) => raw,
                Err(fault) => return self.abort(execution_id, fault).await,
            };

            let event = match parser.parse(raw) {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(ParseError::Protocol(err)) => {
                    result.protocol_errors += 1;
                    self.report_protocol_error(execution_id, err).await;
                    continue;
                }
                Err(ParseError::Fatal(fault)) => return self.abort(execution_id, fault).await,
            };

            match buffer.apply(&event) {
                Some(BufferOutput::Text(segment)) => self.pass_text(execution_id, segment, &mut result).await,
                Some(BufferOutput::ToolCall(call)) => {
                    if !self.accepts_dispatch(execution_id).await? {
                        result.cut_off = true;
                        break;
                    }
                    if !self.start_invocation(execution_id, call, &mut result).await? {
                        result.cut_off = true;
                        break;
                    }
                }
                None => {}
            }

            if let StreamEvent::TurnEnd { stop_reason, .. } = event {
                if buffer.open_blocks() > 0 {
                    tracing::warn!(
                        execution_id = %execution_id,
                        open_blocks = buffer.open_blocks(),
                        "turn ended with unclosed blocks; dropping them"
                    );
                }
                result.stop_reason = Some(stop_reason);
                if !self.end_turn(execution_id).await? {
                    result.cut_off = true;
                    break;
                }
            }
        }

        // 3. A stream that stops without a turn end cannot be trusted
        if !result.cut_off && !parser.turn_ended() {
            return self.abort(execution_id, StreamFault::Truncated).await;
        }

        order_for_presentation(&mut result.segments);
        tracing::info!(
            execution_id = %execution_id,
            dispatched = result.dispatched.len(),
            protocol_errors = result.protocol_errors,
            stop_reason = ?result.stop_reason,
            cut_off = result.cut_off,
            "stream consumed"
        );
        Ok(result)
    }

    /// Records and dispatches one tool call. `false` when the execution was
    /// resolved underneath it and the call was withdrawn.
    async fn start_invocation(
        &self,
        execution_id: ExecutionId,
        call: CompletedToolCall,
        result: &mut StreamToolCallsResult,
    ) -> Result<bool, StreamToolCallsError> {
        if call.degraded {
            tracing::warn!(
                execution_id = %execution_id,
                block_stream_index = call.block_stream_index,
                tool_name = %call.tool_name,
                "tool arguments are not valid JSON; dispatching raw text"
            );
        }

        let allocation = self.allocator.allocate(execution_id, &call.invocation_id).await?;
        let invocation = Invocation::new(execution_id, allocation.index, call);
        self.ledger.put_invocation(&invocation).await?;

        if self.dispatcher.dispatch(&invocation).await? == DispatchResult::Withdrawn {
            return Ok(false);
        }

        result.segments.push(ContentSegment::Tool(ToolSegment {
            index: invocation.index(),
            block_stream_index: invocation.block_stream_index(),
            invocation_id: invocation.invocation_id().clone(),
            tool_name: invocation.tool_name().to_string(),
            sequence: invocation.sequence(),
        }));
        result.dispatched.push(invocation.index());
        Ok(true)
    }

    async fn pass_text(
        &self,
        execution_id: ExecutionId,
        segment: TextSegment,
        result: &mut StreamToolCallsResult,
    ) {
        let event = StatusEvent::Text {
            execution_id,
            segment: segment.clone(),
        };
        if let Err(e) = self.publisher.publish(event).await {
            tracing::warn!(execution_id = %execution_id, error = %e, "failed to publish text");
        }
        result.segments.push(ContentSegment::Text(segment));
    }

    async fn report_protocol_error(&self, execution_id: ExecutionId, err: ProtocolError) {
        tracing::warn!(execution_id = %execution_id, error = %err, "protocol error; event dropped");
        let event = StatusEvent::ProtocolError {
            execution_id,
            block_stream_index: err.block_stream_index(),
            message: err.to_string(),
        };
        if let Err(e) = self.publisher.publish(event).await {
            tracing::warn!(execution_id = %execution_id, error = %e, "failed to publish protocol error");
        }
    }

    /// False once the deadline has moved the execution past `streaming`.
    async fn accepts_dispatch(&self, execution_id: ExecutionId) -> Result<bool, StreamToolCallsError> {
        let status = self.ledger.status(execution_id).await?;
        if status != ExecutionStatus::Streaming {
            tracing::warn!(
                execution_id = %execution_id,
                %status,
                "execution resolved mid-stream; ignoring remaining events"
            );
            return Ok(false);
        }
        Ok(true)
    }

    /// Moves to `awaiting_tools` and checks the barrier. Returns false if the
    /// execution had already been resolved.
    async fn end_turn(&self, execution_id: ExecutionId) -> Result<bool, StreamToolCallsError> {
        match self
            .ledger
            .transition_status(execution_id, ExecutionStatus::AwaitingTools)
            .await?
        {
            Transition::Applied(_) => {
                // The turn is recorded; a failed check is retried by the sweep.
                match self.watcher.check(execution_id).await {
                    Ok(outcome) => tracing::debug!(execution_id = %execution_id, ?outcome, "turn ended"),
                    Err(e) => tracing::warn!(execution_id = %execution_id, error = %e, "barrier check failed at turn end"),
                }
                Ok(true)
            }
            Transition::Rejected(current) => {
                tracing::warn!(execution_id = %execution_id, %current, "turn ended after resolution");
                Ok(false)
            }
        }
    }

    async fn abort(
        &self,
        execution_id: ExecutionId,
        fault: StreamFault,
    ) -> Result<StreamToolCallsResult, StreamToolCallsError> {
        self.watcher.abort(execution_id, &fault.to_string()).await?;
        Err(StreamToolCallsError::Aborted(fault))
    }
}

impl std::fmt::Debug for StreamToolCallsHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamToolCallsHandler").finish_non_exhaustive()
    }
}
