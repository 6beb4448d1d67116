//! Multi-vendor LLM gateway for TARS
//!
//! Gives callers one request/response contract for model completions over
//! three wire protocols: the Anthropic Messages API, Google's
//! `generateContent` API, and OpenAI-compatible chat completions (`OpenAI`,
//! Groq, Together, `OpenRouter`, `DeepSeek`, ...). Transient failures are
//! retried with full-jitter backoff, streams are restarted transparently,
//! and malformed tool calls rejected by OpenAI-compatible vendors are
//! recovered from the rejected generation text.

#![allow(clippy::must_use_candidate, clippy::missing_errors_doc)]

pub mod backoff;
pub mod convert;
pub mod error;
pub mod gateway;
pub mod protocol;
pub mod provider;
pub mod recovery;
pub mod retry;
pub mod stream;
pub mod types;

pub use error::LlmError;
pub use gateway::Gateway;
pub use provider::{Provider, Vendor};
pub use retry::RetryPolicy;
pub use stream::StreamSession;
pub use types::{
    ChatRequest, ContentBlock, InlineImage, LlmResponse, Message, MessageContent, MessagePart, Role, SchemaNode,
    SchemaType, StopReason, StreamEvent, ToolCall, ToolChoice, ToolOutput, ToolResult, ToolSchema, Usage,
};
