//! Conversion between canonical types and `OpenAI` wire format

use indexmap::IndexMap;
use serde_json::{Value, json};
use tracing::debug;

use super::parse_arguments;
use crate::protocol::openai::{
    OpenAiFunction, OpenAiFunctionCall, OpenAiMessage, OpenAiRequest, OpenAiResponse, OpenAiStreamChunk, OpenAiTool,
    OpenAiToolCall,
};
use crate::types::{
    ChatRequest, ContentBlock, LlmResponse, Message, MessageContent, MessagePart, Role, StreamChunk, ToolCall,
    ToolChoice, ToolSchema, Usage, generate_call_id,
};

// -- Outbound: canonical request -> OpenAI wire request --

impl From<&ChatRequest> for OpenAiRequest {
    fn from(req: &ChatRequest) -> Self {
        let tools = tools_to_openai(&req.tools);
        let tool_choice = tools
            .as_ref()
            .and(req.tool_choice.as_ref())
            .map(tool_choice_to_openai_value);

        Self {
            model: req.model.clone(),
            messages: history_to_openai(&req.messages, &req.system),
            temperature: req.temperature,
            max_tokens: Some(req.max_tokens),
            stream: None,
            tools,
            tool_choice,
            stream_options: None,
        }
    }
}

/// Wrap canonical tool schemas as `OpenAI` function tools
///
/// A top-level `properties` key is always present; an empty list yields
/// `None` so no empty `tools` array is sent.
pub fn tools_to_openai(tools: &[ToolSchema]) -> Option<Vec<OpenAiTool>> {
    if tools.is_empty() {
        return None;
    }

    Some(
        tools
            .iter()
            .map(|tool| {
                let mut parameters = tool.parameters.clone();
                parameters.properties.get_or_insert_with(IndexMap::new);

                OpenAiTool {
                    tool_type: "function".to_owned(),
                    function: OpenAiFunction {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        parameters,
                    },
                }
            })
            .collect(),
    )
}

/// Convert the system prompt and canonical turns into `OpenAI` messages
pub fn history_to_openai(messages: &[Message], system: &str) -> Vec<OpenAiMessage> {
    let mut out = Vec::with_capacity(messages.len() + 1);
    out.push(OpenAiMessage::text("system", system));

    for message in messages {
        match (&message.role, &message.content) {
            (Role::User, MessageContent::Text(text)) => out.push(OpenAiMessage::text("user", text.as_str())),
            (Role::User, MessageContent::Parts(parts)) => user_parts_to_openai(parts, &mut out),
            (Role::Assistant, MessageContent::Text(text)) => {
                out.push(OpenAiMessage::text("assistant", text.as_str()));
            }
            (Role::Assistant, MessageContent::Parts(parts)) => out.push(assistant_parts_to_openai(parts)),
        }
    }

    out
}

/// One `tool` message per result, then any user text as a single message
fn user_parts_to_openai(parts: &[MessagePart], out: &mut Vec<OpenAiMessage>) {
    let mut texts = Vec::new();

    for part in parts {
        match part {
            MessagePart::ToolResult(result) => {
                if result.image.is_some() {
                    debug!(call_id = %result.call_id, "dropping tool result image, tool messages are text-only");
                }
                out.push(OpenAiMessage {
                    role: "tool".to_owned(),
                    content: Some(result.output.as_text()),
                    tool_calls: None,
                    tool_call_id: Some(result.call_id.clone()),
                });
            }
            MessagePart::Text { text } => texts.push(text.as_str()),
            MessagePart::ToolCall(_) => {}
        }
    }

    if !texts.is_empty() {
        out.push(OpenAiMessage::text("user", texts.join("\n")));
    }
}

fn assistant_parts_to_openai(parts: &[MessagePart]) -> OpenAiMessage {
    let mut texts = Vec::new();
    let mut tool_calls = Vec::new();

    for part in parts {
        match part {
            MessagePart::Text { text } => texts.push(text.as_str()),
            MessagePart::ToolCall(call) => tool_calls.push(OpenAiToolCall {
                id: call.id.clone(),
                tool_type: "function".to_owned(),
                function: OpenAiFunctionCall {
                    name: call.name.clone(),
                    arguments: Value::Object(call.arguments.clone()).to_string(),
                },
            }),
            MessagePart::ToolResult(_) => {}
        }
    }

    let content = if texts.is_empty() && !tool_calls.is_empty() {
        None
    } else {
        Some(texts.join("\n"))
    };

    OpenAiMessage {
        role: "assistant".to_owned(),
        content,
        tool_calls: (!tool_calls.is_empty()).then_some(tool_calls),
        tool_call_id: None,
    }
}

/// Convert a tool choice to `OpenAI`'s flexible `tool_choice` value
fn tool_choice_to_openai_value(choice: &ToolChoice) -> Value {
    match choice {
        ToolChoice::Auto => Value::String("auto".to_owned()),
        ToolChoice::Required => Value::String("required".to_owned()),
        ToolChoice::None => Value::String("none".to_owned()),
        ToolChoice::Tool(name) => json!({"type": "function", "function": {"name": name}}),
    }
}

// -- Inbound: OpenAI wire response -> canonical types --

/// Parse an `OpenAI` response into a canonical response
impl From<OpenAiResponse> for LlmResponse {
    fn from(resp: OpenAiResponse) -> Self {
        let mut content = Vec::new();

        if let Some(choice) = resp.choices.into_iter().next() {
            if let Some(text) = choice.message.content.filter(|text| !text.is_empty()) {
                content.push(ContentBlock::Text { text });
            }

            for call in choice.message.tool_calls.unwrap_or_default() {
                let arguments = parse_arguments(&call.function.arguments, &call.function.name);
                let id = if call.id.is_empty() { generate_call_id() } else { call.id };
                content.push(ContentBlock::ToolCall(ToolCall::new(id, call.function.name, arguments)));
            }
        }

        let usage = resp
            .usage
            .map(|u| Usage::new(u.prompt_tokens, u.completion_tokens))
            .unwrap_or_default();

        Self::new(content, usage)
    }
}

// -- Stream conversion --

/// Decode an `OpenAI` stream chunk into normalized stream chunks
///
/// Tool calls arrive as indexed argument fragments; reassembly happens in
/// the accumulator.
pub fn openai_chunk_to_chunks(chunk: OpenAiStreamChunk) -> Vec<StreamChunk> {
    let mut chunks = Vec::new();

    for choice in chunk.choices {
        if let Some(text) = choice.delta.content.filter(|text| !text.is_empty()) {
            chunks.push(StreamChunk::Text(text));
        }

        for call in choice.delta.tool_calls.unwrap_or_default() {
            let (name, arguments) = call
                .function
                .map(|f| (f.name, f.arguments.unwrap_or_default()))
                .unwrap_or_default();
            chunks.push(StreamChunk::ToolCallDelta {
                index: call.index,
                id: call.id,
                name,
                arguments,
            });
        }

        if choice.finish_reason.is_some() {
            chunks.push(StreamChunk::Finished);
        }
    }

    if let Some(usage) = chunk.usage {
        chunks.push(StreamChunk::Usage {
            input_tokens: Some(usage.prompt_tokens),
            output_tokens: Some(usage.completion_tokens),
        });
    }

    chunks
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::types::{InlineImage, SchemaNode, SchemaType, StopReason, ToolResult};

    fn args(value: Value) -> serde_json::Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn tools_keep_name_and_description_and_gain_properties() {
        let tools = vec![ToolSchema::new("ping", "Check liveness", SchemaNode::of(SchemaType::Object))];
        let converted = tools_to_openai(&tools).unwrap();
        let value = serde_json::to_value(&converted).unwrap();

        assert_eq!(value[0]["type"], "function");
        assert_eq!(value[0]["function"]["name"], "ping");
        assert_eq!(value[0]["function"]["description"], "Check liveness");
        assert_eq!(value[0]["function"]["parameters"]["properties"], json!({}));
    }

    #[test]
    fn empty_tool_list_is_absent() {
        assert!(tools_to_openai(&[]).is_none());

        let mut req = ChatRequest::new("m", 10).with_tool_choice(ToolChoice::Required);
        req.messages.push(Message::user("hi"));
        let wire = serde_json::to_value(OpenAiRequest::from(&req)).unwrap();
        assert!(wire.get("tools").is_none());
        assert!(wire.get("tool_choice").is_none());
    }

    #[test]
    fn system_prompt_leads_history() {
        let history = history_to_openai(&[Message::user("hello")], "be brief");
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, "system");
        assert_eq!(history[0].content.as_deref(), Some("be brief"));
        assert_eq!(history[1].role, "user");
    }

    #[test]
    fn each_tool_result_becomes_its_own_message() {
        let results = Message::tool_results([
            ToolResult::text("call_a", "sunny"),
            ToolResult::json("call_b", args(json!({"temp": 21})))
                .with_image(InlineImage::new("image/png", vec![1, 2, 3])),
        ]);
        let history = history_to_openai(&[results], "");

        assert_eq!(history.len(), 3);
        assert_eq!(history[1].role, "tool");
        assert_eq!(history[1].tool_call_id.as_deref(), Some("call_a"));
        assert_eq!(history[1].content.as_deref(), Some("sunny"));
        assert_eq!(history[2].tool_call_id.as_deref(), Some("call_b"));
        assert_eq!(history[2].content.as_deref(), Some(r#"{"temp":21}"#));
    }

    #[test]
    fn assistant_tool_calls_without_text_send_null_content() {
        let turn = Message::parts(
            Role::Assistant,
            vec![MessagePart::ToolCall(ToolCall::new(
                "call_1",
                "get_weather",
                args(json!({"city": "Tokyo"})),
            ))],
        );
        let history = history_to_openai(&[turn], "sys");
        let value = serde_json::to_value(&history[1]).unwrap();

        assert_eq!(value["content"], Value::Null);
        assert_eq!(value["tool_calls"][0]["function"]["arguments"], r#"{"city":"Tokyo"}"#);
    }

    #[test]
    fn assistant_texts_are_newline_joined() {
        let turn = Message::parts(
            Role::Assistant,
            vec![
                MessagePart::Text { text: "one".to_owned() },
                MessagePart::Text { text: "two".to_owned() },
            ],
        );
        let history = history_to_openai(&[turn], "");
        assert_eq!(history[1].content.as_deref(), Some("one\ntwo"));
        assert!(history[1].tool_calls.is_none());
    }

    #[test]
    fn named_tool_choice_is_a_function_object() {
        let req = ChatRequest::new("m", 10)
            .with_tools(vec![ToolSchema::new("goto", "", SchemaNode::of(SchemaType::Object))])
            .with_tool_choice(ToolChoice::Tool("goto".to_owned()));
        let wire = serde_json::to_value(OpenAiRequest::from(&req)).unwrap();
        assert_eq!(wire["tool_choice"], json!({"type": "function", "function": {"name": "goto"}}));
    }

    #[test]
    fn response_with_tool_call_parses_arguments() {
        let resp: OpenAiResponse = serde_json::from_value(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": {"name": "get_weather", "arguments": "{\"city\":\"Tokyo\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }],
            "usage": {"prompt_tokens": 12, "completion_tokens": 7}
        }))
        .unwrap();

        let response = LlmResponse::from(resp);
        assert_eq!(
            response.content(),
            &[ContentBlock::tool_call("call_9", "get_weather", args(json!({"city": "Tokyo"})))]
        );
        assert_eq!(response.stop_reason(), StopReason::ToolCall);
        assert_eq!(response.usage(), Usage::new(12, 7));
    }

    #[test]
    fn stream_chunk_yields_text_fragments_and_finish() {
        let chunk: OpenAiStreamChunk = serde_json::from_value(json!({
            "choices": [{
                "delta": {
                    "content": "Hel",
                    "tool_calls": [{"index": 0, "id": "call_1", "function": {"name": "goto", "arguments": "{\"u"}}]
                },
                "finish_reason": "tool_calls"
            }]
        }))
        .unwrap();

        assert_eq!(
            openai_chunk_to_chunks(chunk),
            vec![
                StreamChunk::Text("Hel".to_owned()),
                StreamChunk::ToolCallDelta {
                    index: 0,
                    id: Some("call_1".to_owned()),
                    name: Some("goto".to_owned()),
                    arguments: "{\"u".to_owned(),
                },
                StreamChunk::Finished,
            ]
        );
    }
}
