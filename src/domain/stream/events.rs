//! Typed stream events emitted by the parser.
//!
//! The set is closed: every consumer matches exhaustively on [`StreamEvent`].

use serde::{Deserialize, Serialize};

use crate::domain::foundation::SequenceTimestamp;

/// What kind of block a `BlockStart` opens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockKind {
    Text,
    ToolUse {
        tool_name: String,
        tool_call_id: Option<String>,
    },
}

/// Payload carried by a `BlockDelta`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Text(String),
    Json(String),
}

/// Why the producer ended its turn.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    ToolUse,
    EndTurn,
    MaxTokens,
    StopSequence,
    /// Stream closed without ever stating a reason.
    Unspecified,
    Other(String),
}

impl StopReason {
    /// Maps the producer's wire value.
    pub fn from_wire(value: &str) -> Self {
        match value {
            "tool_use" => StopReason::ToolUse,
            "end_turn" => StopReason::EndTurn,
            "max_tokens" => StopReason::MaxTokens,
            "stop_sequence" => StopReason::StopSequence,
            other => StopReason::Other(other.to_string()),
        }
    }
}

/// One typed protocol event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    BlockStart {
        block_stream_index: u32,
        kind: BlockKind,
        sequence: SequenceTimestamp,
    },
    BlockDelta {
        block_stream_index: u32,
        fragment: Fragment,
        sequence: SequenceTimestamp,
    },
    BlockStop {
        block_stream_index: u32,
        sequence: SequenceTimestamp,
    },
    TurnEnd {
        stop_reason: StopReason,
        sequence: SequenceTimestamp,
    },
}

impl StreamEvent {
    /// Sequence timestamp assigned at parse time.
    pub fn sequence(&self) -> SequenceTimestamp {
        match self {
            StreamEvent::BlockStart { sequence, .. }
            | StreamEvent::BlockDelta { sequence, .. }
            | StreamEvent::BlockStop { sequence, .. }
            | StreamEvent::TurnEnd { sequence, .. } => *sequence,
        }
    }

    /// Producer-assigned block position, absent for `TurnEnd`.
    pub fn block_stream_index(&self) -> Option<u32> {
        match self {
            StreamEvent::BlockStart { block_stream_index, .. }
            | StreamEvent::BlockDelta { block_stream_index, .. }
            | StreamEvent::BlockStop { block_stream_index, .. } => Some(*block_stream_index),
            StreamEvent::TurnEnd { .. } => None,
        }
    }
}
