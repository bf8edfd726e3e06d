//! Ordered content segments for presentation.
//!
//! Text and tool segments share one ordering space: the execution's
//! sequence timestamps. Dispatch order (`index`) and stream position
//! (`block_stream_index`) are carried alongside but never used for this sort.

use serde::{Deserialize, Serialize};

use crate::domain::foundation::{InvocationId, SequenceTimestamp};

/// A text fragment passed straight through from the stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextSegment {
    pub block_stream_index: u32,
    pub text: String,
    pub sequence: SequenceTimestamp,
}

/// A recognized tool call placed in the presentation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolSegment {
    pub index: u64,
    pub block_stream_index: u32,
    pub invocation_id: InvocationId,
    pub tool_name: String,
    pub sequence: SequenceTimestamp,
}

/// One entry in the interleaved text/tool presentation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "segment", rename_all = "snake_case")]
pub enum ContentSegment {
    Text(TextSegment),
    Tool(ToolSegment),
}

impl ContentSegment {
    pub fn sequence(&self) -> SequenceTimestamp {
        match self {
            ContentSegment::Text(t) => t.sequence,
            ContentSegment::Tool(t) => t.sequence,
        }
    }
}

/// Sorts segments into presentation order.
pub fn order_for_presentation(segments: &mut [ContentSegment]) {
    segments.sort_by_key(ContentSegment::sequence);
}
