//! Canonical request/response types
//!
//! Every vendor converts to and from these shapes; callers never see a
//! vendor's wire format.

pub mod message;
pub mod request;
pub mod response;
pub mod stream;
pub mod tool;

pub use message::{InlineImage, Message, MessageContent, MessagePart, Role, ToolOutput, ToolResult};
pub use request::ChatRequest;
pub use response::{ContentBlock, LlmResponse, StopReason, ToolCall, Usage, generate_call_id};
pub use stream::{StreamChunk, StreamEvent};
pub use tool::{SchemaNode, SchemaType, ToolChoice, ToolSchema};
