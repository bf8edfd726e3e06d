//! Raw stream events in the producer's wire format.
//!
//! Each SSE `data:` payload deserializes into one [`RawStreamEvent`]:
//!
//! ```text
//! event: content_block_delta
//! data: {"type":"content_block_delta","index":1,"delta":{"type":"input_json_delta","partial_json":"{\"q\""}}
//! ```

use serde::Deserialize;
use serde_json::Value;

/// One raw event as sent by the model client.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawStreamEvent {
    MessageStart {
        #[serde(default)]
        message: Option<Value>,
    },
    ContentBlockStart {
        index: u32,
        content_block: RawContentBlock,
    },
    ContentBlockDelta {
        index: u32,
        delta: RawDelta,
    },
    ContentBlockStop {
        index: u32,
    },
    MessageDelta {
        delta: RawMessageDelta,
    },
    MessageStop {},
    Ping {},
    Error {
        error: RawError,
    },
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawContentBlock {
    Text {
        #[serde(default)]
        text: String,
    },
    ToolUse {
        #[serde(default)]
        id: Option<String>,
        name: String,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RawDelta {
    TextDelta { text: String },
    InputJsonDelta { partial_json: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawMessageDelta {
    #[serde(default)]
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RawError {
    #[serde(default)]
    pub message: Option<String>,
}

impl RawStreamEvent {
    /// Decodes one `data:` payload.
    pub fn from_json(data: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(data)
    }

    /// Opens a tool-use block.
    pub fn tool_start(index: u32, id: impl Into<String>, name: impl Into<String>) -> Self {
        RawStreamEvent::ContentBlockStart {
            index,
            content_block: RawContentBlock::ToolUse {
                id: Some(id.into()),
                name: name.into(),
            },
        }
    }

    /// Opens a text block.
    pub fn text_start(index: u32) -> Self {
        RawStreamEvent::ContentBlockStart {
            index,
            content_block: RawContentBlock::Text {
                text: String::new(),
            },
        }
    }

    /// Appends a JSON argument fragment.
    pub fn json_delta(index: u32, partial_json: impl Into<String>) -> Self {
        RawStreamEvent::ContentBlockDelta {
            index,
            delta: RawDelta::InputJsonDelta {
                partial_json: partial_json.into(),
            },
        }
    }

    /// Appends a text fragment.
    pub fn text_delta(index: u32, text: impl Into<String>) -> Self {
        RawStreamEvent::ContentBlockDelta {
            index,
            delta: RawDelta::TextDelta { text: text.into() },
        }
    }

    /// Closes a block.
    pub fn stop(index: u32) -> Self {
        RawStreamEvent::ContentBlockStop { index }
    }

    /// Ends the turn with the given wire stop reason.
    pub fn turn_end(stop_reason: impl Into<String>) -> Self {
        RawStreamEvent::MessageDelta {
            delta: RawMessageDelta {
                stop_reason: Some(stop_reason.into()),
            },
        }
    }
}
