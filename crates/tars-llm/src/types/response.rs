use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Call identifier, echoed back in the matching tool result
    pub id: String,
    /// Tool name
    pub name: String,
    /// Structured arguments
    pub arguments: Map<String, Value>,
}

impl ToolCall {
    /// Create a tool call
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }
}

/// One unit of model output
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    /// Generated text
    Text {
        /// The text
        text: String,
    },
    /// Tool invocation request
    ToolCall(ToolCall),
}

impl ContentBlock {
    /// Create a text block
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    /// Create a tool call block
    pub fn tool_call(id: impl Into<String>, name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self::ToolCall(ToolCall::new(id, name, arguments))
    }

    /// Whether this block asks for a tool to be executed
    pub const fn is_tool_call(&self) -> bool {
        matches!(self, Self::ToolCall(_))
    }
}

/// Token usage reported by the vendor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    /// Prompt tokens
    pub input_tokens: u32,
    /// Generated tokens
    pub output_tokens: u32,
}

impl Usage {
    /// Create usage statistics
    pub const fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }
}

/// Why the model ended its turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    /// The model wants one or more tools executed
    ToolCall,
    /// The model finished speaking
    EndTurn,
}

/// Vendor-independent completion result
///
/// The stop reason is derived from the content: it is `ToolCall` exactly
/// when at least one block is a tool call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LlmResponse {
    content: Vec<ContentBlock>,
    stop_reason: StopReason,
    usage: Usage,
}

impl LlmResponse {
    /// Build a response, deriving the stop reason from `content`
    pub fn new(content: Vec<ContentBlock>, usage: Usage) -> Self {
        let stop_reason = if content.iter().any(ContentBlock::is_tool_call) {
            StopReason::ToolCall
        } else {
            StopReason::EndTurn
        };

        Self {
            content,
            stop_reason,
            usage,
        }
    }

    /// Ordered output blocks
    pub fn content(&self) -> &[ContentBlock] {
        &self.content
    }

    /// Consume the response, returning its blocks
    pub fn into_content(self) -> Vec<ContentBlock> {
        self.content
    }

    pub const fn stop_reason(&self) -> StopReason {
        self.stop_reason
    }

    pub const fn usage(&self) -> Usage {
        self.usage
    }

    /// Concatenated text of all text blocks
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                ContentBlock::ToolCall(_) => None,
            })
            .collect()
    }

    /// Tool calls in output order
    pub fn tool_calls(&self) -> impl Iterator<Item = &ToolCall> {
        self.content.iter().filter_map(|block| match block {
            ContentBlock::ToolCall(call) => Some(call),
            ContentBlock::Text { .. } => None,
        })
    }
}

/// Generate an identifier for a tool call the vendor did not label
pub fn generate_call_id() -> String {
    let hex = uuid::Uuid::new_v4().simple().to_string();
    format!("call_{}", &hex[..24])
}
