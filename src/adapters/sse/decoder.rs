//! Server-Sent-Events framing for the model's byte stream.
//!
//! Network chunks split anywhere: mid-line, mid-field, even inside a UTF-8
//! sequence. The decoder buffers bytes until a full line is available and
//! emits one [`RawStreamEvent`] per blank-line-terminated SSE event.
//!
//! ```text
//! event: content_block_delta
//! data: {"type":"content_block_delta","index":0,"delta":{...}}
//!
//! ```

use futures::future;
use futures::stream::{self, Stream, StreamExt};
use std::fmt::Display;

use crate::domain::stream::{RawStreamEvent, StreamFault};

/// Incremental SSE decoder for one stream.
#[derive(Debug, Default)]
pub struct SseDecoder {
    pending: Vec<u8>,
    event: Option<String>,
    data: Vec<String>,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds one network chunk, returning every event it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<RawStreamEvent, StreamFault>> {
        self.pending.extend_from_slice(chunk);

        let mut out = Vec::new();
        while let Some(pos) = self.pending.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line);
            let line = line.trim_end_matches(['\n', '\r']);
            if let Some(event) = self.feed_line(line) {
                out.push(event);
            }
        }
        out
    }

    /// Flushes an event left unterminated when the stream ends.
    pub fn finish(&mut self) -> Vec<Result<RawStreamEvent, StreamFault>> {
        let mut out = Vec::new();
        if !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            let line = String::from_utf8_lossy(&rest).trim_end_matches('\r').to_string();
            if let Some(event) = self.feed_line(&line) {
                out.push(event);
            }
        }
        if let Some(event) = self.dispatch() {
            out.push(event);
        }
        out
    }

    fn feed_line(&mut self, line: &str) -> Option<Result<RawStreamEvent, StreamFault>> {
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "event" => self.event = Some(value.to_string()),
            "data" => self.data.push(value.to_string()),
            // id, retry and unknown fields carry nothing for us
            _ => {}
        }
        None
    }

    fn dispatch(&mut self) -> Option<Result<RawStreamEvent, StreamFault>> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = std::mem::take(&mut self.data).join("\n");
        Some(RawStreamEvent::from_json(&data).map_err(|e| {
            StreamFault::Malformed(format!(
                "{} event: {}",
                event.as_deref().unwrap_or("unnamed"),
                e
            ))
        }))
    }
}

/// Adapts a chunked byte stream into raw stream events.
///
/// A transport error becomes [`StreamFault::Transport`]; the consumer is
/// expected to stop reading there.
pub fn decode_stream<S, B, E>(chunks: S) -> impl Stream<Item = Result<RawStreamEvent, StreamFault>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Display,
{
    chunks
        .map(Some)
        .chain(stream::once(future::ready(None)))
        .scan(SseDecoder::new(), |decoder, chunk| {
            let events = match chunk {
                Some(Ok(bytes)) => decoder.push(bytes.as_ref()),
                Some(Err(e)) => vec![Err(StreamFault::Transport(e.to_string()))],
                None => decoder.finish(),
            };
            future::ready(Some(events))
        })
        .flat_map(stream::iter)
}
