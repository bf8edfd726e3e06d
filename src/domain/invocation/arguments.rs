//! Tool arguments reconstructed from streamed JSON fragments.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Arguments handed to the executor.
///
/// `Raw` carries the accumulated fragment text verbatim when it could not be
/// parsed as JSON; the executor contract accepts either form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ToolArguments {
    Structured(Value),
    Raw(String),
}

impl ToolArguments {
    /// Parses the full accumulated fragment text of one tool block.
    ///
    /// An empty or whitespace-only buffer means the tool takes no input and
    /// becomes an empty object.
    pub fn from_fragment(raw: &str) -> Self {
        if raw.trim().is_empty() {
            return ToolArguments::Structured(Value::Object(Default::default()));
        }
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => ToolArguments::Structured(value),
            Err(_) => ToolArguments::Raw(raw.to_string()),
        }
    }

    /// True when parsing failed and the raw string was kept.
    pub fn is_degraded(&self) -> bool {
        matches!(self, ToolArguments::Raw(_))
    }

    /// The structured value, if parsing succeeded.
    pub fn as_structured(&self) -> Option<&Value> {
        match self {
            ToolArguments::Structured(value) => Some(value),
            ToolArguments::Raw(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn valid_json_is_structured() {
        let args = ToolArguments::from_fragment(r#"{"query":"rust"}"#);
        assert_eq!(args, ToolArguments::Structured(json!({"query": "rust"})));
        assert!(!args.is_degraded());
    }

    #[test]
    fn empty_buffer_is_empty_object() {
        let args = ToolArguments::from_fragment("");
        assert_eq!(args.as_structured(), Some(&json!({})));
    }

    #[test]
    fn truncated_json_keeps_raw_text() {
        let args = ToolArguments::from_fragment(r#"{"query":"ru"#);
        assert_eq!(args, ToolArguments::Raw(r#"{"query":"ru"#.to_string()));
        assert!(args.is_degraded());
        assert!(args.as_structured().is_none());
    }

    #[test]
    fn serialized_form_is_tagged() {
        let json = serde_json::to_value(ToolArguments::Raw("x".into())).unwrap();
        assert_eq!(json, json!({"kind": "raw", "value": "x"}));
    }
}
