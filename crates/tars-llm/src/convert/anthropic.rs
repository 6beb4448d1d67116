//! Conversion between canonical types and Anthropic wire format
//!
//! The canonical model mirrors Anthropic's, so most of this is field
//! renaming.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;

use super::object_or_empty;
use crate::protocol::anthropic::{
    AnthropicContent, AnthropicContentBlock, AnthropicErrorDetail, AnthropicImageSource, AnthropicMessage,
    AnthropicRequest, AnthropicResponse, AnthropicResponseBlock, AnthropicStreamContentBlock, AnthropicStreamDelta,
    AnthropicStreamEvent, AnthropicTool, AnthropicToolChoice, AnthropicToolResultContent,
};
use crate::types::{
    ChatRequest, ContentBlock, LlmResponse, Message, MessageContent, MessagePart, Role, StreamChunk, ToolCall,
    ToolChoice, ToolResult, ToolSchema, Usage,
};

// -- Outbound: canonical request -> Anthropic wire request --

impl From<&ChatRequest> for AnthropicRequest {
    fn from(req: &ChatRequest) -> Self {
        let tools = tools_to_anthropic(&req.tools);
        let tool_choice = tools
            .as_ref()
            .and(req.tool_choice.as_ref())
            .map(tool_choice_to_anthropic);

        Self {
            model: req.model.clone(),
            max_tokens: req.max_tokens,
            system: (!req.system.is_empty()).then(|| req.system.clone()),
            messages: req.messages.iter().map(message_to_anthropic).collect(),
            temperature: req.temperature,
            stream: None,
            tools,
            tool_choice,
        }
    }
}

/// Pass canonical tool schemas through unchanged
pub fn tools_to_anthropic(tools: &[ToolSchema]) -> Option<Vec<AnthropicTool>> {
    if tools.is_empty() {
        return None;
    }

    Some(
        tools
            .iter()
            .map(|tool| AnthropicTool {
                name: tool.name.clone(),
                description: (!tool.description.is_empty()).then(|| tool.description.clone()),
                input_schema: tool.parameters.clone(),
            })
            .collect(),
    )
}

fn message_to_anthropic(message: &Message) -> AnthropicMessage {
    let role = match message.role {
        Role::User => "user",
        Role::Assistant => "assistant",
    };

    let content = match &message.content {
        MessageContent::Text(text) => AnthropicContent::Text(text.clone()),
        MessageContent::Parts(parts) => AnthropicContent::Blocks(parts.iter().map(part_to_anthropic).collect()),
    };

    AnthropicMessage {
        role: role.to_owned(),
        content,
    }
}

fn part_to_anthropic(part: &MessagePart) -> AnthropicContentBlock {
    match part {
        MessagePart::Text { text } => AnthropicContentBlock::Text { text: text.clone() },
        MessagePart::ToolCall(call) => AnthropicContentBlock::ToolUse {
            id: call.id.clone(),
            name: call.name.clone(),
            input: Value::Object(call.arguments.clone()),
        },
        MessagePart::ToolResult(result) => tool_result_to_anthropic(result),
    }
}

/// Tool result block; an attached image rides inside the result content
fn tool_result_to_anthropic(result: &ToolResult) -> AnthropicContentBlock {
    let text = result.output.as_text();

    let content = match &result.image {
        Some(image) => AnthropicToolResultContent::Blocks(vec![
            AnthropicContentBlock::Text { text },
            AnthropicContentBlock::Image {
                source: AnthropicImageSource {
                    source_type: "base64".to_owned(),
                    media_type: image.mime_type.clone(),
                    data: STANDARD.encode(&image.data),
                },
            },
        ]),
        None => AnthropicToolResultContent::Text(text),
    };

    AnthropicContentBlock::ToolResult {
        tool_use_id: result.call_id.clone(),
        content,
    }
}

fn tool_choice_to_anthropic(choice: &ToolChoice) -> AnthropicToolChoice {
    let (choice_type, name) = match choice {
        ToolChoice::Auto => ("auto", None),
        ToolChoice::Required => ("any", None),
        ToolChoice::None => ("none", None),
        ToolChoice::Tool(name) => ("tool", Some(name.clone())),
    };

    AnthropicToolChoice {
        choice_type: choice_type.to_owned(),
        name,
    }
}

// -- Inbound: Anthropic wire response -> canonical types --

impl From<AnthropicResponse> for LlmResponse {
    fn from(resp: AnthropicResponse) -> Self {
        let content = resp
            .content
            .into_iter()
            .filter_map(|block| match block {
                AnthropicResponseBlock::Text { text } => Some(ContentBlock::Text { text }),
                AnthropicResponseBlock::ToolUse { id, name, input } => {
                    Some(ContentBlock::ToolCall(ToolCall::new(id, name, object_or_empty(input))))
                }
                AnthropicResponseBlock::Other => None,
            })
            .collect();

        Self::new(
            content,
            Usage::new(resp.usage.input_tokens, resp.usage.output_tokens),
        )
    }
}

// -- Stream conversion --

/// Decode one Anthropic SSE event into normalized stream chunks
///
/// Tool input streams as `input_json_delta` fragments keyed by content block
/// index. An in-stream `error` event is handed back for classification.
pub fn anthropic_event_to_chunks(event: AnthropicStreamEvent) -> Result<Vec<StreamChunk>, AnthropicErrorDetail> {
    let chunks = match event {
        AnthropicStreamEvent::MessageStart { message } => message
            .usage
            .map(|usage| StreamChunk::Usage {
                input_tokens: Some(usage.input_tokens),
                output_tokens: Some(usage.output_tokens),
            })
            .into_iter()
            .collect(),
        AnthropicStreamEvent::ContentBlockStart { index, content_block } => match content_block {
            AnthropicStreamContentBlock::Text { text } if !text.is_empty() => vec![StreamChunk::Text(text)],
            AnthropicStreamContentBlock::ToolUse { id, name } => vec![StreamChunk::ToolCallDelta {
                index,
                id: Some(id),
                name: Some(name),
                arguments: String::new(),
            }],
            AnthropicStreamContentBlock::Text { .. } | AnthropicStreamContentBlock::Other => Vec::new(),
        },
        AnthropicStreamEvent::ContentBlockDelta { index, delta } => match delta {
            AnthropicStreamDelta::TextDelta { text } => vec![StreamChunk::Text(text)],
            AnthropicStreamDelta::InputJsonDelta { partial_json } => vec![StreamChunk::ToolCallDelta {
                index,
                id: None,
                name: None,
                arguments: partial_json,
            }],
            AnthropicStreamDelta::Other => Vec::new(),
        },
        AnthropicStreamEvent::MessageDelta { usage, .. } => usage
            .map(|usage| StreamChunk::Usage {
                input_tokens: None,
                output_tokens: usage.output_tokens,
            })
            .into_iter()
            .collect(),
        AnthropicStreamEvent::MessageStop => vec![StreamChunk::Finished],
        AnthropicStreamEvent::ContentBlockStop { .. } | AnthropicStreamEvent::Ping => Vec::new(),
        AnthropicStreamEvent::Error { error } => return Err(error),
    };

    Ok(chunks)
}
