use thiserror::Error;

pub type Result<T> = std::result::Result<T, LlmError>;

/// Message used when the upstream failed without saying why.
pub const FALLBACK_ERROR_MESSAGE: &str = "Failed to send message";

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("http error: {0}")]
    Http(String),

    /// Non-2xx answer from the completion endpoint or the relay.
    #[error("{message}")]
    Upstream { status: u16, message: String },

    #[error("unexpected response format: {0}")]
    ResponseFormat(String),
}

impl LlmError {
    /// Text suitable for showing to a user or returning from the relay.
    pub fn user_message(&self) -> String {
        let message = match self {
            Self::Upstream { message, .. } => message.trim().to_string(),
            other => other.to_string(),
        };
        if message.is_empty() {
            FALLBACK_ERROR_MESSAGE.to_string()
        } else {
            message
        }
    }

    /// Build an upstream error from a non-2xx body, preferring the
    /// `{"error":{"message":..}}` and `{"message":..}` shapes.
    pub(crate) fn from_upstream_body(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| {
                v.pointer("/error/message")
                    .or_else(|| v.get("message"))
                    .or_else(|| v.get("error").filter(|e| e.is_string()))
                    .and_then(|m| m.as_str())
                    .map(|m| m.to_string())
            })
            .unwrap_or_else(|| body.trim().to_string());
        let message = if message.is_empty() {
            FALLBACK_ERROR_MESSAGE.to_string()
        } else {
            message
        };
        Self::Upstream { status, message }
    }
}

impl From<reqwest::Error> for LlmError {
    fn from(e: reqwest::Error) -> Self {
        Self::Http(e.to_string())
    }
}

impl From<serde_json::Error> for LlmError {
    fn from(e: serde_json::Error) -> Self {
        Self::ResponseFormat(e.to_string())
    }
}
