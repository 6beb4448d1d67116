use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::response::{ContentBlock, LlmResponse, ToolCall};

/// Author of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Caller-side turn (prompts and tool results)
    User,
    /// Model turn
    Assistant,
}

/// One conversation turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Role of the author
    pub role: Role,
    /// Turn content
    pub content: MessageContent,
}

impl Message {
    /// Plain-text user turn
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Text(text.into()),
        }
    }

    /// Plain-text assistant turn
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(text.into()),
        }
    }

    /// User turn carrying tool results
    pub fn tool_results(results: impl IntoIterator<Item = ToolResult>) -> Self {
        Self {
            role: Role::User,
            content: MessageContent::Parts(results.into_iter().map(MessagePart::ToolResult).collect()),
        }
    }

    /// Structured turn with explicit parts
    pub const fn parts(role: Role, parts: Vec<MessagePart>) -> Self {
        Self {
            role,
            content: MessageContent::Parts(parts),
        }
    }
}

impl From<&LlmResponse> for Message {
    /// Record a model response as an assistant turn for the next request
    fn from(response: &LlmResponse) -> Self {
        let parts = response
            .content()
            .iter()
            .map(|block| match block {
                ContentBlock::Text { text } => MessagePart::Text { text: text.clone() },
                ContentBlock::ToolCall(call) => MessagePart::ToolCall(call.clone()),
            })
            .collect();

        Self::parts(Role::Assistant, parts)
    }
}

/// Turn content, either plain text or structured parts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain text
    Text(String),
    /// Ordered parts
    Parts(Vec<MessagePart>),
}

/// Individual part within a structured turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePart {
    /// Text
    Text {
        /// The text
        text: String,
    },
    /// Tool call previously issued by the model
    ToolCall(ToolCall),
    /// Result of executing a tool call
    ToolResult(ToolResult),
}

/// Result of executing one tool call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResult {
    /// Identifier of the call this result answers
    pub call_id: String,
    /// Tool output
    pub output: ToolOutput,
    /// Optional image produced by the tool (e.g. a screenshot)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<InlineImage>,
}

impl ToolResult {
    /// Text result
    pub fn text(call_id: impl Into<String>, output: impl Into<String>) -> Self {
        Self {
            call_id: call_id.into(),
            output: ToolOutput::Text(output.into()),
            image: None,
        }
    }

    /// Structured result
    pub fn json(call_id: impl Into<String>, output: Map<String, Value>) -> Self {
        Self {
            call_id: call_id.into(),
            output: ToolOutput::Json(output),
            image: None,
        }
    }

    /// Attach an image to the result
    #[must_use]
    pub fn with_image(mut self, image: InlineImage) -> Self {
        self.image = Some(image);
        self
    }
}

/// Tool output payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolOutput {
    /// Free text
    Text(String),
    /// Structured object
    Json(Map<String, Value>),
}

impl ToolOutput {
    /// Render the output as text, serializing structured results as JSON
    pub fn as_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Json(map) => Value::Object(map.clone()).to_string(),
        }
    }

    /// Render the output as a JSON object, wrapping text under `result`
    pub fn as_object(&self) -> Map<String, Value> {
        match self {
            Self::Text(text) => {
                let mut map = Map::new();
                map.insert("result".to_owned(), Value::String(text.clone()));
                map
            }
            Self::Json(map) => map.clone(),
        }
    }
}

/// Raw image bytes attached to a tool result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineImage {
    /// MIME type (e.g. "image/png")
    pub mime_type: String,
    /// Unencoded image bytes
    pub data: Vec<u8>,
}

impl InlineImage {
    /// Create an inline image
    pub fn new(mime_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            mime_type: mime_type.into(),
            data,
        }
    }
}
