//! Application handlers.
//!
//! Command handlers that orchestrate domain operations over the ports.

mod stream_tool_calls;

pub use stream_tool_calls::{
    StreamToolCallsCommand, StreamToolCallsError, StreamToolCallsHandler, StreamToolCallsResult,
};
