//! The JSON reply envelope the assistant is asked to produce. The model is
//! free to ignore the request, so nothing here is trusted until it parses
//! and passes [`StructuredReply::check`].

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyKind {
    Text,
    Code,
    Suggestion,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplyMetadata {
    pub confidence: f64,
    #[serde(default)]
    pub sources: Option<Vec<String>>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructuredReply {
    pub content: String,
    #[serde(rename = "type")]
    pub kind: ReplyKind,
    pub metadata: ReplyMetadata,
}

impl StructuredReply {
    /// Parse assistant content, tolerating a surrounding ```json fence.
    pub fn parse(content: &str) -> Option<Self> {
        let body = strip_code_fence(content.trim());
        let reply: StructuredReply = match serde_json::from_str(body) {
            Ok(v) => v,
            Err(e) => {
                tracing::debug!(error = %e, "assistant content is not a structured reply");
                return None;
            }
        };
        match reply.check() {
            Ok(()) => Some(reply),
            Err(reason) => {
                tracing::warn!(%reason, "structured reply failed validation");
                None
            }
        }
    }

    fn check(&self) -> Result<(), String> {
        let confidence = self.metadata.confidence;
        if !confidence.is_finite() || !(0.0..=1.0).contains(&confidence) {
            return Err(format!("confidence {confidence} is outside [0, 1]"));
        }
        Ok(())
    }
}

fn strip_code_fence(s: &str) -> &str {
    let Some(rest) = s.strip_prefix("```") else {
        return s;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
