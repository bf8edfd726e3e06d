//! InvocationBuffer - per-block accumulation of streamed fragments.

use std::collections::HashMap;

use crate::domain::foundation::{InvocationId, SequenceTimestamp};
use crate::domain::invocation::ToolArguments;

use super::events::{BlockKind, Fragment, StreamEvent};
use super::segment::TextSegment;

/// A tool-use block whose arguments finished streaming.
#[derive(Debug, Clone, PartialEq)]
pub struct CompletedToolCall {
    pub block_stream_index: u32,
    pub invocation_id: InvocationId,
    pub tool_name: String,
    /// Every fragment concatenated in arrival order.
    pub raw_arguments: String,
    pub arguments: ToolArguments,
    /// Set when `raw_arguments` did not parse as JSON.
    pub degraded: bool,
    /// Sequence of the block's start, used to order it against text.
    pub opened_at: SequenceTimestamp,
    pub closed_at: SequenceTimestamp,
}

/// What the buffer hands forward after consuming one event.
#[derive(Debug, Clone, PartialEq)]
pub enum BufferOutput {
    Text(TextSegment),
    ToolCall(CompletedToolCall),
}

#[derive(Debug)]
enum PendingBlock {
    Text,
    Tool {
        invocation_id: InvocationId,
        tool_name: String,
        fragment: String,
        opened_at: SequenceTimestamp,
    },
}

/// Accumulates tool argument fragments keyed by `block_stream_index`.
///
/// Text deltas are not buffered; they pass straight through so the consumer
/// can render them while tool arguments are still arriving.
#[derive(Debug, Default)]
pub struct InvocationBuffer {
    blocks: HashMap<u32, PendingBlock>,
}

impl InvocationBuffer {
    /// Creates an empty buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of blocks still open.
    pub fn open_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Consumes one typed event.
    pub fn apply(&mut self, event: &StreamEvent) -> Option<BufferOutput> {
        match event {
            StreamEvent::BlockStart {
                block_stream_index,
                kind,
                sequence,
            } => {
                let block = match kind {
                    BlockKind::Text => PendingBlock::Text,
                    BlockKind::ToolUse {
                        tool_name,
                        tool_call_id,
                    } => PendingBlock::Tool {
                        invocation_id: tool_call_id
                            .as_deref()
                            .and_then(|id| InvocationId::new(id).ok())
                            .unwrap_or_else(InvocationId::generate),
                        tool_name: tool_name.clone(),
                        fragment: String::new(),
                        opened_at: *sequence,
                    },
                };
                self.blocks.insert(*block_stream_index, block);
                None
            }
            StreamEvent::BlockDelta {
                block_stream_index,
                fragment,
                sequence,
            } => match (self.blocks.get_mut(block_stream_index)?, fragment) {
                (PendingBlock::Text, Fragment::Text(text)) => Some(BufferOutput::Text(TextSegment {
                    block_stream_index: *block_stream_index,
                    text: text.clone(),
                    sequence: *sequence,
                })),
                (PendingBlock::Tool { fragment: buf, .. }, Fragment::Json(json)) => {
                    buf.push_str(json);
                    None
                }
                _ => None,
            },
            StreamEvent::BlockStop {
                block_stream_index,
                sequence,
            } => match self.blocks.remove(block_stream_index)? {
                PendingBlock::Text => None,
                PendingBlock::Tool {
                    invocation_id,
                    tool_name,
                    fragment,
                    opened_at,
                } => {
                    let arguments = ToolArguments::from_fragment(&fragment);
                    Some(BufferOutput::ToolCall(CompletedToolCall {
                        block_stream_index: *block_stream_index,
                        invocation_id,
                        tool_name,
                        degraded: arguments.is_degraded(),
                        raw_arguments: fragment,
                        arguments,
                        opened_at,
                        closed_at: *sequence,
                    }))
                }
            },
            StreamEvent::TurnEnd { .. } => None,
        }
    }
}
