//! Stream module - incremental reconstruction of tool calls.
//!
//! ```text
//! RawStreamEvent --StreamEventParser--> StreamEvent --InvocationBuffer--> BufferOutput
//! ```
//!
//! ## Key Types
//!
//! - [`RawStreamEvent`] - Producer wire event (one SSE `data:` payload)
//! - [`StreamEventParser`] - Validates block bookkeeping, stamps sequences
//! - [`StreamEvent`] - Closed set of typed protocol events
//! - [`InvocationBuffer`] - Accumulates argument fragments per block
//! - [`CompletedToolCall`] - A tool block whose arguments finished streaming
//! - [`ContentSegment`] - Interleaved text/tool presentation entries

mod buffer;
mod events;
mod parser;
mod segment;
mod wire;

pub use buffer::{BufferOutput, CompletedToolCall, InvocationBuffer};
pub use events::{BlockKind, Fragment, StopReason, StreamEvent};
pub use parser::{ParseError, ProtocolError, StreamEventParser, StreamFault};
pub use segment::{order_for_presentation, ContentSegment, TextSegment, ToolSegment};
pub use wire::{RawContentBlock, RawDelta, RawError, RawMessageDelta, RawStreamEvent};
