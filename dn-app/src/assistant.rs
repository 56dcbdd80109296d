//! Completion client: one chat turn with at most one round of tool calls.

use crate::config::ApiConfig;
use crate::structured::StructuredReply;
use dn_llm::{ChatMessage, ChatRequest, ChatTransport, LlmClient, LlmError, ResponseFormat};
use dn_tools::ToolRegistry;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

pub const ASSISTANT_PROMPT: &str = "You are a helpful assistant.";

pub const STRUCTURED_ASSISTANT_PROMPT: &str = r#"You are a helpful AI assistant for novel writing. Reply in JSON format.

Example output:
{
  "content": "your reply",
  "type": "text|code|suggestion",
  "metadata": {
    "confidence": 0.9,
    "sources": ["optional source references"],
    "tags": ["related tags"]
  }
}"#;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("API not initialized")]
    Uninitialized,

    #[error("{0}")]
    Upstream(String),
}

impl From<LlmError> for ChatError {
    fn from(e: LlmError) -> Self {
        Self::Upstream(e.user_message())
    }
}

#[derive(Debug, Clone)]
pub struct CompletionResponse {
    pub message: ChatMessage,
    /// Present when structured output was requested and the reply passed validation.
    pub structured: Option<StructuredReply>,
}

impl CompletionResponse {
    /// Text to show the user: the envelope's content when there is one.
    pub fn display_text(&self) -> &str {
        match &self.structured {
            Some(reply) => &reply.content,
            None => &self.message.content,
        }
    }
}

pub struct CompletionClient {
    api: ApiConfig,
    tools: ToolRegistry,
    transport: Option<Arc<dyn ChatTransport>>,
}

impl CompletionClient {
    pub fn new(api: ApiConfig, tools: ToolRegistry) -> Self {
        Self {
            api,
            tools,
            transport: None,
        }
    }

    /// Bind a fresh client to `credential`. An empty credential unbinds.
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn initialize(&mut self, credential: &str) {
        if credential.trim().is_empty() {
            tracing::debug!("empty credential; completion client left uninitialized");
            self.transport = None;
            return;
        }
        match LlmClient::new(credential, self.api.endpoint(), self.api.request_timeout()) {
            Ok(client) => self.bind(Arc::new(client)),
            Err(e) => {
                tracing::warn!(error = %e, "failed to build completion client");
                self.transport = None;
            }
        }
    }

    pub fn bind(&mut self, transport: Arc<dyn ChatTransport>) {
        self.transport = Some(transport);
    }

    pub fn is_initialized(&self) -> bool {
        self.transport.is_some()
    }

    fn system_prompt(&self) -> &'static str {
        if self.api.structured_output {
            STRUCTURED_ASSISTANT_PROMPT
        } else {
            ASSISTANT_PROMPT
        }
    }

    fn response_format(&self) -> Option<ResponseFormat> {
        if self.api.structured_output {
            Some(ResponseFormat::JsonObject)
        } else {
            None
        }
    }

    #[tracing::instrument(level = "info", skip_all, fields(transcript_len = transcript.len()))]
    pub async fn send(
        &self,
        transcript: &[ChatMessage],
        temperature: f64,
    ) -> Result<CompletionResponse, ChatError> {
        let Some(transport) = self.transport.as_ref() else {
            return Err(ChatError::Uninitialized);
        };

        let mut messages = Vec::with_capacity(transcript.len() + 1);
        messages.push(ChatMessage::system(self.system_prompt()));
        messages.extend(transcript.iter().cloned());

        let response_format = self.response_format();
        let first = ChatRequest::new(messages.clone())
            .with_temperature(temperature)
            .with_response_format(response_format)
            .with_tools(self.tools.definitions());

        let started = Instant::now();
        let response = transport.chat(&first).await?;
        tracing::info!(
            latency_ms = started.elapsed().as_millis() as u64,
            prompt_tokens = response.usage.prompt_tokens,
            completion_tokens = response.usage.completion_tokens,
            tool_calls = response.message.tool_calls.len(),
            "completion call finished"
        );

        if response.message.tool_calls.is_empty() {
            return Ok(self.finish(response.message));
        }

        let mut followup = messages;
        followup.push(response.message.clone());
        for call in &response.message.tool_calls {
            let content = self.tools.dispatch(call).await;
            followup.push(ChatMessage::tool_result(call.id.clone(), content));
        }

        // Tools are not offered again, so this round is the last one.
        let second = ChatRequest::new(followup)
            .with_temperature(temperature)
            .with_response_format(response_format);
        let started = Instant::now();
        let last = transport.chat(&second).await?;
        tracing::info!(
            latency_ms = started.elapsed().as_millis() as u64,
            prompt_tokens = last.usage.prompt_tokens,
            completion_tokens = last.usage.completion_tokens,
            "tool follow-up call finished"
        );
        if !last.message.tool_calls.is_empty() {
            tracing::warn!(
                tool_calls = last.message.tool_calls.len(),
                "follow-up reply requested more tools; returning it unresolved"
            );
        }

        Ok(self.finish(last.message))
    }

    fn finish(&self, message: ChatMessage) -> CompletionResponse {
        let structured = if self.api.structured_output {
            StructuredReply::parse(&message.content)
        } else {
            None
        };
        CompletionResponse {
            message,
            structured,
        }
    }
}
