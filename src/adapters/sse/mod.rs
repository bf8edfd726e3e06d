//! SSE adapter - turns the model client's byte stream into raw events.

mod decoder;

pub use decoder::{decode_stream, SseDecoder};
