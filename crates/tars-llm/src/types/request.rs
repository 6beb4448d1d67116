use serde::{Deserialize, Serialize};

use super::message::Message;
use super::tool::{ToolChoice, ToolSchema};

/// Canonical completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Vendor model identifier
    pub model: String,
    /// Maximum tokens to generate
    pub max_tokens: u32,
    /// System prompt, carried separately from the turns
    #[serde(default)]
    pub system: String,
    /// Tools available to the model
    #[serde(default)]
    pub tools: Vec<ToolSchema>,
    /// Conversation turns, oldest first
    pub messages: Vec<Message>,
    /// Sampling temperature; `None` lets the vendor default apply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    /// Tool selection override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
}

impl ChatRequest {
    /// Request with no system prompt, tools or turns
    pub fn new(model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            model: model.into(),
            max_tokens,
            system: String::new(),
            tools: Vec::new(),
            messages: Vec::new(),
            temperature: None,
            tool_choice: None,
        }
    }

    #[must_use]
    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self
    }

    #[must_use]
    pub fn with_tools(mut self, tools: Vec<ToolSchema>) -> Self {
        self.tools = tools;
        self
    }

    #[must_use]
    pub fn with_messages(mut self, messages: Vec<Message>) -> Self {
        self.messages = messages;
        self
    }

    #[must_use]
    pub fn with_message(mut self, message: Message) -> Self {
        self.messages.push(message);
        self
    }

    #[must_use]
    pub const fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    #[must_use]
    pub fn with_tool_choice(mut self, tool_choice: ToolChoice) -> Self {
        self.tool_choice = Some(tool_choice);
        self
    }
}
