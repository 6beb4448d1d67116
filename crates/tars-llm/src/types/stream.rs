use serde::{Deserialize, Serialize};

use super::response::ToolCall;

/// Event yielded to callers while a completion streams
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StreamEvent {
    /// Newly generated text
    TextDelta(String),
}

/// Normalized fragment decoded from one vendor stream frame
///
/// Produced by the vendor decoders in [`crate::convert`] and folded into a
/// response by [`crate::stream::ResponseAccumulator`].
#[derive(Debug, Clone, PartialEq)]
pub enum StreamChunk {
    /// Text fragment
    Text(String),
    /// Partial tool call keyed by its position in the response
    ToolCallDelta {
        /// Position of the call; fragments with the same index belong together
        index: u32,
        /// Call identifier (first fragment only)
        id: Option<String>,
        /// Tool name (first fragment only)
        name: Option<String>,
        /// Fragment of the JSON-encoded arguments
        arguments: String,
    },
    /// Tool call delivered whole
    ToolCall(ToolCall),
    /// Usage counters; absent fields leave the running value untouched
    Usage {
        input_tokens: Option<u32>,
        output_tokens: Option<u32>,
    },
    /// The vendor signalled the end of generation
    Finished,
}
