use crate::error::{LlmError, Result};
use crate::openai::OpenAiClient;
use crate::relay::RelayClient;
use crate::types::{ChatRequest, ChatResponse};
use async_trait::async_trait;
use std::time::Duration;

/// Anything that can carry one completion request to a model.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse>;
}

/// Where completion requests go.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Straight to an OpenAI-compatible API.
    Direct { base_url: String, model: String },
    /// Through a DeepNovel relay, which picks the upstream and model itself.
    Relay { base_url: String },
}

#[derive(Clone)]
pub struct LlmClient {
    endpoint: Endpoint,
    credential: String,
    client: reqwest::Client,
}

impl LlmClient {
    #[tracing::instrument(level = "debug", skip_all)]
    pub fn new(credential: &str, endpoint: Endpoint, timeout: Duration) -> Result<Self> {
        if credential.trim().is_empty() {
            return Err(LlmError::InvalidInput("credential is empty".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(%e, "reqwest client build failed; falling back to default client");
                reqwest::Client::new()
            });
        Ok(Self {
            endpoint,
            credential: credential.to_string(),
            client,
        })
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
}

#[async_trait]
impl ChatTransport for LlmClient {
    #[tracing::instrument(level = "info", skip_all)]
    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse> {
        match &self.endpoint {
            Endpoint::Direct { base_url, model } => {
                let c = OpenAiClient::new(self.client.clone(), &self.credential, model, base_url);
                c.chat(request).await
            }
            Endpoint::Relay { base_url } => {
                let c = RelayClient::new(self.client.clone(), &self.credential, base_url);
                c.chat(request).await
            }
        }
    }
}

/// Tool names must match `^[a-zA-Z0-9_-]{1,64}$` on OpenAI-compatible APIs.
pub fn validate_tool_name(name: &str) -> Result<()> {
    if name.is_empty() || name.len() > 64 {
        return Err(LlmError::InvalidInput(format!(
            "tool name {name:?} must be 1..=64 characters"
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|ch| !(ch.is_ascii_alphanumeric() || *ch == '_' || *ch == '-'))
    {
        return Err(LlmError::InvalidInput(format!(
            "tool name {name:?} contains invalid character {bad:?}"
        )));
    }
    Ok(())
}
