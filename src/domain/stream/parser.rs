//! StreamEventParser - raw wire events to typed protocol events.
//!
//! The parser is the single ordered consumer of one execution's stream. It
//! validates block bookkeeping (a delta or stop must reference an open block)
//! and stamps every emitted event with a strictly increasing sequence
//! timestamp from the execution's own clock.

use std::collections::HashMap;
use thiserror::Error;

use crate::domain::foundation::SequenceClock;

use super::events::{BlockKind, Fragment, StopReason, StreamEvent};
use super::wire::{RawContentBlock, RawDelta, RawStreamEvent};

/// A recoverable protocol violation: the offending event is dropped and
/// parsing continues.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Block {block_stream_index} referenced before its start")]
    UnknownBlock { block_stream_index: u32 },

    #[error("Block {block_stream_index} started twice")]
    DuplicateBlock { block_stream_index: u32 },

    #[error("Block {block_stream_index} received a {fragment} fragment it cannot hold")]
    FragmentMismatch {
        block_stream_index: u32,
        fragment: &'static str,
    },

    #[error("Block {block_stream_index} has an unsupported type")]
    UnsupportedBlock { block_stream_index: u32 },

    #[error("Event received after the turn ended")]
    AfterTurnEnd,
}

impl ProtocolError {
    /// The block the error refers to, if any.
    pub fn block_stream_index(&self) -> Option<u32> {
        match self {
            ProtocolError::UnknownBlock { block_stream_index }
            | ProtocolError::DuplicateBlock { block_stream_index }
            | ProtocolError::FragmentMismatch { block_stream_index, .. }
            | ProtocolError::UnsupportedBlock { block_stream_index } => Some(*block_stream_index),
            ProtocolError::AfterTurnEnd => None,
        }
    }
}

/// A stream condition that makes the rest of the execution unreadable.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StreamFault {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Producer reported an error: {0}")]
    Producer(String),

    #[error("Undecodable event: {0}")]
    Malformed(String),

    #[error("Stream ended before the turn ended")]
    Truncated,
}

/// Outcome of parsing one raw event that produced no typed event.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Fatal(#[from] StreamFault),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenBlock {
    Text,
    Tool,
}

/// Converts raw events into [`StreamEvent`]s for one execution.
#[derive(Debug, Default)]
pub struct StreamEventParser {
    clock: SequenceClock,
    open: HashMap<u32, OpenBlock>,
    turn_ended: bool,
}

impl StreamEventParser {
    /// Creates a parser with a fresh sequence clock.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true once a `TurnEnd` has been emitted.
    pub fn turn_ended(&self) -> bool {
        self.turn_ended
    }

    /// Blocks that started but have not stopped yet.
    pub fn open_blocks(&self) -> usize {
        self.open.len()
    }

    /// Parses one raw event.
    ///
    /// Returns `Ok(None)` for events that carry nothing for the coordinator
    /// (`message_start`, `ping`, unknown types, a `message_stop` after the
    /// stop reason was already seen).
    pub fn parse(&mut self, raw: RawStreamEvent) -> Result<Option<StreamEvent>, ParseError> {
        match raw {
            RawStreamEvent::MessageStart { .. } | RawStreamEvent::Ping {} | RawStreamEvent::Unknown => {
                Ok(None)
            }
            RawStreamEvent::Error { error } => Err(StreamFault::Producer(
                error.message.unwrap_or_else(|| "unspecified stream error".to_string()),
            )
            .into()),
            RawStreamEvent::ContentBlockStart {
                index,
                content_block,
            } => {
                self.ensure_open_turn()?;
                if self.open.contains_key(&index) {
                    return Err(ProtocolError::DuplicateBlock {
                        block_stream_index: index,
                    }
                    .into());
                }
                let (open, kind) = match content_block {
                    RawContentBlock::Text { .. } => (OpenBlock::Text, BlockKind::Text),
                    RawContentBlock::ToolUse { id, name } => (
                        OpenBlock::Tool,
                        BlockKind::ToolUse {
                            tool_name: name,
                            tool_call_id: id.filter(|id| !id.is_empty()),
                        },
                    ),
                    RawContentBlock::Other => {
                        return Err(ProtocolError::UnsupportedBlock {
                            block_stream_index: index,
                        }
                        .into())
                    }
                };
                self.open.insert(index, open);
                Ok(Some(StreamEvent::BlockStart {
                    block_stream_index: index,
                    kind,
                    sequence: self.clock.tick(),
                }))
            }
            RawStreamEvent::ContentBlockDelta { index, delta } => {
                self.ensure_open_turn()?;
                let open = *self.open.get(&index).ok_or(ProtocolError::UnknownBlock {
                    block_stream_index: index,
                })?;
                let fragment = match (open, delta) {
                    (OpenBlock::Text, RawDelta::TextDelta { text }) => Fragment::Text(text),
                    (OpenBlock::Tool, RawDelta::InputJsonDelta { partial_json }) => {
                        Fragment::Json(partial_json)
                    }
                    // Delta kinds the coordinator does not track.
                    (_, RawDelta::Other) => return Ok(None),
                    (_, RawDelta::TextDelta { .. }) => {
                        return Err(ProtocolError::FragmentMismatch {
                            block_stream_index: index,
                            fragment: "text",
                        }
                        .into())
                    }
                    (_, RawDelta::InputJsonDelta { .. }) => {
                        return Err(ProtocolError::FragmentMismatch {
                            block_stream_index: index,
                            fragment: "json",
                        }
                        .into())
                    }
                };
                Ok(Some(StreamEvent::BlockDelta {
                    block_stream_index: index,
                    fragment,
                    sequence: self.clock.tick(),
                }))
            }
            RawStreamEvent::ContentBlockStop { index } => {
                self.ensure_open_turn()?;
                self.open.remove(&index).ok_or(ProtocolError::UnknownBlock {
                    block_stream_index: index,
                })?;
                Ok(Some(StreamEvent::BlockStop {
                    block_stream_index: index,
                    sequence: self.clock.tick(),
                }))
            }
            RawStreamEvent::MessageDelta { delta } => match delta.stop_reason {
                Some(reason) => Ok(self.end_turn(StopReason::from_wire(&reason))),
                None => Ok(None),
            },
            RawStreamEvent::MessageStop {} => Ok(self.end_turn(StopReason::Unspecified)),
        }
    }

    fn ensure_open_turn(&self) -> Result<(), ProtocolError> {
        if self.turn_ended {
            Err(ProtocolError::AfterTurnEnd)
        } else {
            Ok(())
        }
    }

    fn end_turn(&mut self, stop_reason: StopReason) -> Option<StreamEvent> {
        if self.turn_ended {
            return None;
        }
        self.turn_ended = true;
        Some(StreamEvent::TurnEnd {
            stop_reason,
            sequence: self.clock.tick(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(parser: &mut StreamEventParser, events: Vec<RawStreamEvent>) -> Vec<StreamEvent> {
        events
            .into_iter()
            .filter_map(|e| parser.parse(e).ok().flatten())
            .collect()
    }

    #[test]
    fn tool_block_produces_start_delta_stop() {
        let mut parser = StreamEventParser::new();
        let events = parse_all(
            &mut parser,
            vec![
                RawStreamEvent::tool_start(0, "toolu_1", "search"),
                RawStreamEvent::json_delta(0, "{}"),
                RawStreamEvent::stop(0),
            ],
        );

        assert_eq!(events.len(), 3);
        assert!(matches!(
            &events[0],
            StreamEvent::BlockStart { kind: BlockKind::ToolUse { tool_name, tool_call_id }, .. }
                if tool_name == "search" && tool_call_id.as_deref() == Some("toolu_1")
        ));
        assert!(matches!(events[2], StreamEvent::BlockStop { block_stream_index: 0, .. }));
        assert_eq!(parser.open_blocks(), 0);
    }

    #[test]
    fn sequences_strictly_increase() {
        let mut parser = StreamEventParser::new();
        let mut raw = vec![RawStreamEvent::text_start(0)];
        for i in 0..200 {
            raw.push(RawStreamEvent::text_delta(0, format!("t{}", i)));
        }
        raw.push(RawStreamEvent::stop(0));
        raw.push(RawStreamEvent::turn_end("end_turn"));

        let events = parse_all(&mut parser, raw);
        assert_eq!(events.len(), 203);
        assert!(events.windows(2).all(|w| w[0].sequence() < w[1].sequence()));
    }

    #[test]
    fn delta_for_unknown_block_is_protocol_error() {
        let mut parser = StreamEventParser::new();
        let err = parser.parse(RawStreamEvent::json_delta(7, "{")).unwrap_err();
        assert_eq!(
            err,
            ParseError::Protocol(ProtocolError::UnknownBlock {
                block_stream_index: 7
            })
        );
    }

    #[test]
    fn stop_for_unknown_block_is_protocol_error() {
        let mut parser = StreamEventParser::new();
        assert!(matches!(
            parser.parse(RawStreamEvent::stop(3)),
            Err(ParseError::Protocol(ProtocolError::UnknownBlock { .. }))
        ));
    }

    #[test]
    fn duplicate_start_is_protocol_error() {
        let mut parser = StreamEventParser::new();
        parser.parse(RawStreamEvent::text_start(0)).unwrap();
        assert!(matches!(
            parser.parse(RawStreamEvent::text_start(0)),
            Err(ParseError::Protocol(ProtocolError::DuplicateBlock { .. }))
        ));
    }

    #[test]
    fn json_fragment_on_text_block_is_rejected() {
        let mut parser = StreamEventParser::new();
        parser.parse(RawStreamEvent::text_start(0)).unwrap();
        let err = parser.parse(RawStreamEvent::json_delta(0, "{")).unwrap_err();
        assert_eq!(err.to_string(), "Block 0 received a json fragment it cannot hold");
    }

    #[test]
    fn parsing_continues_after_protocol_error() {
        let mut parser = StreamEventParser::new();
        assert!(parser.parse(RawStreamEvent::stop(9)).is_err());
        assert!(parser.parse(RawStreamEvent::text_start(0)).unwrap().is_some());
    }

    #[test]
    fn producer_error_is_fatal() {
        let mut parser = StreamEventParser::new();
        let err = parser
            .parse(RawStreamEvent::Error {
                error: super::super::wire::RawError {
                    message: Some("overloaded".to_string()),
                },
            })
            .unwrap_err();
        assert_eq!(err, ParseError::Fatal(StreamFault::Producer("overloaded".to_string())));
    }

    #[test]
    fn message_stop_after_stop_reason_is_silent() {
        let mut parser = StreamEventParser::new();
        let end = parser.parse(RawStreamEvent::turn_end("tool_use")).unwrap();
        assert!(matches!(
            end,
            Some(StreamEvent::TurnEnd { stop_reason: StopReason::ToolUse, .. })
        ));
        assert_eq!(parser.parse(RawStreamEvent::MessageStop {}).unwrap(), None);
        assert!(parser.turn_ended());
    }

    #[test]
    fn message_stop_alone_ends_turn() {
        let mut parser = StreamEventParser::new();
        assert!(matches!(
            parser.parse(RawStreamEvent::MessageStop {}).unwrap(),
            Some(StreamEvent::TurnEnd { stop_reason: StopReason::Unspecified, .. })
        ));
    }

    #[test]
    fn blocks_after_turn_end_are_rejected() {
        let mut parser = StreamEventParser::new();
        parser.parse(RawStreamEvent::turn_end("end_turn")).unwrap();
        assert_eq!(
            parser.parse(RawStreamEvent::text_start(0)),
            Err(ParseError::Protocol(ProtocolError::AfterTurnEnd))
        );
    }

    #[test]
    fn ping_and_message_start_emit_nothing() {
        let mut parser = StreamEventParser::new();
        assert_eq!(parser.parse(RawStreamEvent::Ping {}).unwrap(), None);
        assert_eq!(
            parser
                .parse(RawStreamEvent::MessageStart { message: None })
                .unwrap(),
            None
        );
    }
}
