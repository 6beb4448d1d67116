//! Conversion between canonical types and vendor wire formats
//!
//! Each submodule covers one vendor: tool schemas, conversation history,
//! response parsing and stream frame decoding.

pub mod anthropic;
pub mod google;
pub mod openai;

use serde_json::{Map, Value};
use tracing::warn;

/// Parse JSON-encoded tool arguments into an object
///
/// Fails open: empty, non-object or malformed input yields an empty map so
/// the caller can still see which tool the model asked for.
pub fn parse_arguments(raw: &str, tool_name: &str) -> Map<String, Value> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Map::new();
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => map,
        Ok(other) => {
            warn!(tool = tool_name, parsed = %other, "tool arguments are not an object, using empty arguments");
            Map::new()
        }
        Err(e) => {
            warn!(
                tool = tool_name,
                error = %e,
                preview = %trimmed.chars().take(100).collect::<String>(),
                "failed to parse tool arguments, using empty arguments"
            );
            Map::new()
        }
    }
}

/// Take the object out of a JSON value, or an empty map for anything else
pub(crate) fn object_or_empty(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
