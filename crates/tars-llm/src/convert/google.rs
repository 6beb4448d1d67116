//! Conversion between canonical types and Google wire format

use std::collections::HashMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::Value;
use tracing::warn;

use super::object_or_empty;
use crate::protocol::google::{
    GoogleContent, GoogleFunctionCall, GoogleFunctionCallingConfig, GoogleFunctionDeclaration, GoogleFunctionResponse,
    GoogleGenerationConfig, GoogleInlineData, GooglePart, GoogleRequest, GoogleResponse, GoogleSchema, GoogleTool,
    GoogleToolConfig, GoogleType,
};
use crate::types::{
    ChatRequest, ContentBlock, LlmResponse, Message, MessageContent, MessagePart, Role, SchemaNode, SchemaType,
    StreamChunk, ToolCall, ToolChoice, ToolResult, ToolSchema, Usage, generate_call_id,
};

/// Text placed after a tool screenshot so the model knows to look at it
pub const SCREENSHOT_NOTE: &str =
    "The image above is a screenshot returned by the preceding tool call. Inspect it visually before answering.";

// -- Outbound: canonical request -> Google wire request --

impl From<&ChatRequest> for GoogleRequest {
    fn from(req: &ChatRequest) -> Self {
        let tools = tools_to_google(&req.tools);
        let tool_config = tools
            .as_ref()
            .and(req.tool_choice.as_ref())
            .map(tool_choice_to_google);

        let system_instruction = (!req.system.is_empty()).then(|| GoogleContent {
            role: None,
            parts: vec![GooglePart::text(req.system.as_str())],
        });

        Self {
            contents: history_to_google(&req.messages),
            system_instruction,
            generation_config: Some(GoogleGenerationConfig {
                temperature: req.temperature,
                max_output_tokens: Some(req.max_tokens),
            }),
            tools,
            tool_config,
        }
    }
}

/// Translate canonical tool schemas into one Google function-declarations tool
pub fn tools_to_google(tools: &[ToolSchema]) -> Option<Vec<GoogleTool>> {
    if tools.is_empty() {
        return None;
    }

    let function_declarations = tools
        .iter()
        .map(|tool| GoogleFunctionDeclaration {
            name: tool.name.clone(),
            description: tool.description.clone(),
            parameters: schema_to_google(&tool.parameters),
        })
        .collect();

    Some(vec![GoogleTool { function_declarations }])
}

/// Recursively translate a schema node into Google's `Schema` object
pub fn schema_to_google(node: &SchemaNode) -> GoogleSchema {
    GoogleSchema {
        schema_type: match node.schema_type {
            SchemaType::String => GoogleType::String,
            SchemaType::Number => GoogleType::Number,
            SchemaType::Integer => GoogleType::Integer,
            SchemaType::Boolean => GoogleType::Boolean,
            SchemaType::Array => GoogleType::Array,
            SchemaType::Object => GoogleType::Object,
        },
        description: node.description.clone(),
        enum_values: node.enum_values.clone(),
        properties: node.properties.as_ref().map(|properties| {
            properties
                .iter()
                .map(|(name, child)| (name.clone(), schema_to_google(child)))
                .collect()
        }),
        required: node.required.clone(),
        items: node.items.as_deref().map(|items| Box::new(schema_to_google(items))),
    }
}

/// Convert canonical turns into Google contents
///
/// The system prompt is not part of the contents; it travels in
/// `systemInstruction`.
pub fn history_to_google(messages: &[Message]) -> Vec<GoogleContent> {
    let call_names: HashMap<&str, &str> = messages
        .iter()
        .filter(|message| message.role == Role::Assistant)
        .filter_map(|message| match &message.content {
            MessageContent::Parts(parts) => Some(parts),
            MessageContent::Text(_) => None,
        })
        .flatten()
        .filter_map(|part| match part {
            MessagePart::ToolCall(call) => Some((call.id.as_str(), call.name.as_str())),
            _ => None,
        })
        .collect();

    messages
        .iter()
        .map(|message| {
            let role = match message.role {
                Role::User => "user",
                Role::Assistant => "model",
            };
            let parts = match &message.content {
                MessageContent::Text(text) => vec![GooglePart::text(text.as_str())],
                MessageContent::Parts(parts) => parts
                    .iter()
                    .flat_map(|part| part_to_google(part, &call_names))
                    .collect(),
            };

            GoogleContent {
                role: Some(role.to_owned()),
                parts,
            }
        })
        .collect()
}

fn part_to_google(part: &MessagePart, call_names: &HashMap<&str, &str>) -> Vec<GooglePart> {
    match part {
        MessagePart::Text { text } => vec![GooglePart::text(text.as_str())],
        MessagePart::ToolCall(call) => vec![GooglePart {
            function_call: Some(GoogleFunctionCall {
                name: call.name.clone(),
                args: Value::Object(call.arguments.clone()),
            }),
            ..GooglePart::default()
        }],
        MessagePart::ToolResult(result) => tool_result_to_google(result, call_names),
    }
}

/// Function response, then the image and its explanatory note when present
fn tool_result_to_google(result: &ToolResult, call_names: &HashMap<&str, &str>) -> Vec<GooglePart> {
    let name = call_names
        .get(result.call_id.as_str())
        .map_or_else(
            || {
                warn!(call_id = %result.call_id, "tool result has no matching tool call, naming it by call id");
                result.call_id.clone()
            },
            |name| (*name).to_owned(),
        );

    let mut parts = vec![GooglePart {
        function_response: Some(GoogleFunctionResponse {
            name,
            response: Value::Object(result.output.as_object()),
        }),
        ..GooglePart::default()
    }];

    if let Some(image) = &result.image {
        parts.push(GooglePart {
            inline_data: Some(GoogleInlineData {
                mime_type: image.mime_type.clone(),
                data: STANDARD.encode(&image.data),
            }),
            ..GooglePart::default()
        });
        parts.push(GooglePart::text(SCREENSHOT_NOTE));
    }

    parts
}

fn tool_choice_to_google(choice: &ToolChoice) -> GoogleToolConfig {
    let (mode, allowed_function_names) = match choice {
        ToolChoice::Auto => ("AUTO", None),
        ToolChoice::Required => ("ANY", None),
        ToolChoice::None => ("NONE", None),
        ToolChoice::Tool(name) => ("ANY", Some(vec![name.clone()])),
    };

    GoogleToolConfig {
        function_calling_config: GoogleFunctionCallingConfig {
            mode: mode.to_owned(),
            allowed_function_names,
        },
    }
}

// -- Inbound: Google wire response -> canonical types --

/// Parse a Google response into a canonical response
///
/// Google never labels function calls, so each one gets a generated id.
impl From<GoogleResponse> for LlmResponse {
    fn from(resp: GoogleResponse) -> Self {
        let usage = resp
            .usage_metadata
            .as_ref()
            .map(|u| {
                Usage::new(
                    u.prompt_token_count.unwrap_or_default(),
                    u.candidates_token_count.unwrap_or_default(),
                )
            })
            .unwrap_or_default();

        let content = first_candidate_parts(resp)
            .into_iter()
            .filter_map(|part| {
                if let Some(call) = part.function_call {
                    Some(ContentBlock::ToolCall(function_call_to_tool_call(call)))
                } else {
                    part.text.filter(|text| !text.is_empty()).map(|text| ContentBlock::Text { text })
                }
            })
            .collect();

        Self::new(content, usage)
    }
}

fn first_candidate_parts(resp: GoogleResponse) -> Vec<GooglePart> {
    resp.candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| content.parts)
        .unwrap_or_default()
}

fn function_call_to_tool_call(call: GoogleFunctionCall) -> ToolCall {
    ToolCall::new(generate_call_id(), call.name, object_or_empty(call.args))
}

// -- Stream conversion --

/// Decode one streamed Google response into normalized stream chunks
///
/// Function calls always arrive whole.
pub fn google_chunk_to_chunks(resp: GoogleResponse) -> Vec<StreamChunk> {
    let mut chunks = Vec::new();

    let finished = resp
        .candidates
        .first()
        .is_some_and(|candidate| candidate.finish_reason.is_some());

    if let Some(usage) = &resp.usage_metadata {
        chunks.push(StreamChunk::Usage {
            input_tokens: usage.prompt_token_count,
            output_tokens: usage.candidates_token_count,
        });
    }

    for part in first_candidate_parts(resp) {
        if let Some(call) = part.function_call {
            chunks.push(StreamChunk::ToolCall(function_call_to_tool_call(call)));
        } else if let Some(text) = part.text.filter(|text| !text.is_empty()) {
            chunks.push(StreamChunk::Text(text));
        }
    }

    if finished {
        chunks.push(StreamChunk::Finished);
    }

    chunks
}
