//! Chat completions wire format shared by every OpenAI-compatible vendor
//!
//! Request types only serialize and response types only deserialize; tool
//! calls travel both ways.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::SchemaNode;

#[derive(Debug, Clone, Serialize)]
pub struct OpenAiRequest {
    pub model: String,
    /// System message first, then the converted history
    pub messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<OpenAiTool>>,
    /// `"auto"`, `"required"`, `"none"` or a `{"type": "function", ...}` object
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_options: Option<OpenAiStreamOptions>,
}

/// Asks the vendor for a trailing usage frame
#[derive(Debug, Clone, Copy, Serialize)]
pub struct OpenAiStreamOptions {
    pub include_usage: bool,
}

/// One history entry
///
/// `content` is always serialized: assistant turns that only carry tool
/// calls send an explicit `null`.
#[derive(Debug, Clone, Serialize)]
pub struct OpenAiMessage {
    /// `system`, `user`, `assistant` or `tool`
    pub role: String,
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<OpenAiToolCall>>,
    /// Set on `tool` messages
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl OpenAiMessage {
    /// Message with text content only
    pub fn text(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_owned(),
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenAiTool {
    #[serde(rename = "type")]
    pub tool_type: String,
    pub function: OpenAiFunction,
}

#[derive(Debug, Clone, Serialize)]
pub struct OpenAiFunction {
    pub name: String,
    pub description: String,
    /// Always carries `properties`, even when empty
    pub parameters: SchemaNode,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiToolCall {
    pub id: String,
    #[serde(rename = "type", default = "function_type")]
    pub tool_type: String,
    pub function: OpenAiFunctionCall,
}

fn function_type() -> String {
    "function".to_owned()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiFunctionCall {
    pub name: String,
    /// JSON-encoded argument object; may be malformed
    #[serde(default)]
    pub arguments: String,
}

// -- Responses --

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OpenAiResponse {
    pub choices: Vec<OpenAiChoice>,
    pub usage: Option<OpenAiUsage>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OpenAiChoice {
    pub message: OpenAiChoiceMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OpenAiChoiceMessage {
    pub content: Option<String>,
    pub tool_calls: Option<Vec<OpenAiToolCall>>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct OpenAiUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
}

// -- Stream frames --

/// One `data:` frame of a streamed completion
///
/// The usage-only frame sent under `include_usage` has no choices.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OpenAiStreamChunk {
    pub choices: Vec<OpenAiStreamChoice>,
    pub usage: Option<OpenAiUsage>,
    /// Failure reported after the stream opened, in the same shape as an
    /// HTTP error body's `error` object
    pub error: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OpenAiStreamChoice {
    pub delta: OpenAiStreamDelta,
    /// Present on the last frame of the choice
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OpenAiStreamDelta {
    pub content: Option<String>,
    pub tool_calls: Option<Vec<OpenAiStreamToolCall>>,
}

/// Fragment of a tool call; `id` and `name` arrive on the first fragment only
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OpenAiStreamToolCall {
    pub index: u32,
    pub id: Option<String>,
    pub function: Option<OpenAiStreamFunctionCall>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct OpenAiStreamFunctionCall {
    pub name: Option<String>,
    pub arguments: Option<String>,
}
