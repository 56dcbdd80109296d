use thiserror::Error;

pub type Result<T> = std::result::Result<T, ToolError>;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

impl From<dn_llm::LlmError> for ToolError {
    fn from(e: dn_llm::LlmError) -> Self {
        Self::InvalidArguments(e.to_string())
    }
}
