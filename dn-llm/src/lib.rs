//! Chat-completion client for DeepNovel.
//!
//! Speaks the OpenAI-compatible chat wire format, either straight to the
//! upstream API or through the DeepNovel relay.

mod client;
mod error;
mod openai;
mod relay;
mod types;

pub use client::{ChatTransport, Endpoint, LlmClient, validate_tool_name};
pub use error::{FALLBACK_ERROR_MESSAGE, LlmError, Result};
pub use openai::{OpenAiClient, WireMessage, WireTool, parse_wire_message};
pub use relay::{RelayChatRequest, RelayClient};
pub use types::{
    ChatMessage, ChatRequest, ChatResponse, ResponseFormat, Role, ToolCall, ToolDefinition, Usage,
};
