#![allow(dead_code)]

pub mod mock_vendor;

use std::time::Duration;

use secrecy::SecretString;
use serde_json::{Value, json};
use tars_config::{BackoffConfig, LlmConfig, RetryConfig};
use tars_llm::{ChatRequest, Gateway, Message, SchemaNode, SchemaType, ToolSchema};
use url::Url;

pub const MODEL: &str = "mock-model-1";

/// Gateway for `provider` pointed at a mock, with zero backoff
pub fn gateway(provider: &str, base_url: &str, max_attempts: u32) -> Gateway {
    gateway_with_key(provider, base_url, "test-key", max_attempts)
}

pub fn gateway_with_key(provider: &str, base_url: &str, api_key: &str, max_attempts: u32) -> Gateway {
    let instant = BackoffConfig {
        base: Duration::ZERO,
        cap: Duration::ZERO,
    };
    let config = LlmConfig {
        provider: provider.to_owned(),
        api_key: SecretString::from(api_key),
        base_url: Some(Url::parse(base_url).unwrap()),
        retry: RetryConfig {
            max_attempts,
            rate_limit: instant,
            server_error: instant,
        },
    };
    Gateway::new(&config).unwrap()
}

pub fn weather_tool() -> ToolSchema {
    ToolSchema::new(
        "get_weather",
        "Current weather for a city",
        SchemaNode::object([(
            "city".to_owned(),
            SchemaNode::of(SchemaType::String).with_description("City name"),
        )])
        .with_required(["city"]),
    )
}

pub fn weather_request() -> ChatRequest {
    ChatRequest::new(MODEL, 256)
        .with_system("You are a weather assistant.")
        .with_tools(vec![weather_tool()])
        .with_message(Message::user("What's the weather in Tokyo?"))
}

pub fn hello_request() -> ChatRequest {
    ChatRequest::new(MODEL, 256).with_message(Message::user("Say hello"))
}

// -- OpenAI-compatible bodies --

pub fn openai_text(text: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "object": "chat.completion",
        "model": MODEL,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": text},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 12, "completion_tokens": 3, "total_tokens": 15}
    })
}

pub fn openai_tool_call(id: &str, name: &str, arguments: &str) -> Value {
    json!({
        "id": "chatcmpl-2",
        "object": "chat.completion",
        "model": MODEL,
        "choices": [{
            "index": 0,
            "message": {
                "role": "assistant",
                "content": null,
                "tool_calls": [{
                    "id": id,
                    "type": "function",
                    "function": {"name": name, "arguments": arguments}
                }]
            },
            "finish_reason": "tool_calls"
        }],
        "usage": {"prompt_tokens": 40, "completion_tokens": 9, "total_tokens": 49}
    })
}

pub fn openai_text_delta(text: &str) -> Value {
    json!({"choices": [{"index": 0, "delta": {"content": text}, "finish_reason": null}]})
}

pub fn openai_tool_delta(index: u32, id: Option<&str>, name: Option<&str>, arguments: &str) -> Value {
    let mut call = json!({"index": index, "function": {"arguments": arguments}});
    if let Some(id) = id {
        call["id"] = json!(id);
        call["type"] = json!("function");
    }
    if let Some(name) = name {
        call["function"]["name"] = json!(name);
    }
    json!({"choices": [{"index": 0, "delta": {"tool_calls": [call]}, "finish_reason": null}]})
}

pub fn openai_finish(reason: &str) -> Value {
    json!({"choices": [{"index": 0, "delta": {}, "finish_reason": reason}]})
}

/// Groq-style rejection of a malformed tool call
pub fn tool_use_failed(failed_generation: &str) -> Value {
    json!({
        "error": {
            "message": "Failed to call a function. Please adjust your prompt. See 'failed_generation' for more details.",
            "type": "invalid_request_error",
            "code": "tool_use_failed",
            "failed_generation": failed_generation
        }
    })
}

// -- Anthropic bodies --

pub fn anthropic_tool_use(id: &str, name: &str, input: Value) -> Value {
    json!({
        "id": "msg_01",
        "type": "message",
        "role": "assistant",
        "model": MODEL,
        "content": [
            {"type": "text", "text": "Let me check."},
            {"type": "tool_use", "id": id, "name": name, "input": input}
        ],
        "stop_reason": "tool_use",
        "usage": {"input_tokens": 30, "output_tokens": 12}
    })
}

pub fn anthropic_stream_start() -> Value {
    json!({"type": "message_start", "message": {"id": "msg_02", "usage": {"input_tokens": 20, "output_tokens": 1}}})
}

pub fn anthropic_text_start(index: u32) -> Value {
    json!({"type": "content_block_start", "index": index, "content_block": {"type": "text", "text": ""}})
}

pub fn anthropic_text_delta(index: u32, text: &str) -> Value {
    json!({"type": "content_block_delta", "index": index, "delta": {"type": "text_delta", "text": text}})
}

pub fn anthropic_tool_start(index: u32, id: &str, name: &str) -> Value {
    json!({
        "type": "content_block_start",
        "index": index,
        "content_block": {"type": "tool_use", "id": id, "name": name, "input": {}}
    })
}

pub fn anthropic_json_delta(index: u32, partial_json: &str) -> Value {
    json!({
        "type": "content_block_delta",
        "index": index,
        "delta": {"type": "input_json_delta", "partial_json": partial_json}
    })
}

pub fn anthropic_block_stop(index: u32) -> Value {
    json!({"type": "content_block_stop", "index": index})
}

pub fn anthropic_stream_end(stop_reason: &str, output_tokens: u32) -> [Value; 2] {
    [
        json!({"type": "message_delta", "delta": {"stop_reason": stop_reason}, "usage": {"output_tokens": output_tokens}}),
        json!({"type": "message_stop"}),
    ]
}

// -- Google bodies --

pub fn google_function_call(name: &str, args: Value) -> Value {
    json!({
        "candidates": [{
            "content": {"role": "model", "parts": [{"functionCall": {"name": name, "args": args}}]},
            "finishReason": "STOP"
        }],
        "usageMetadata": {"promptTokenCount": 25, "candidatesTokenCount": 6}
    })
}

pub fn google_text_chunk(text: &str, finish: bool) -> Value {
    let mut candidate = json!({"content": {"role": "model", "parts": [{"text": text}]}});
    if finish {
        candidate["finishReason"] = json!("STOP");
    }
    json!({"candidates": [candidate]})
}
