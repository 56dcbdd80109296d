use crate::error::{Result, ToolError};
use crate::traits::{Tool, ToolSpec, optional_count, require_string};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;

pub const DEFAULT_SEARCH_LIMIT: usize = 5;
const MAX_SEARCH_LIMIT: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KnowledgeHit {
    /// Collection the hit came from, e.g. `character`.
    pub source: String,
    pub id: String,
    pub title: String,
    pub excerpt: String,
}

/// Searchable store of story material.
pub trait KnowledgeBase: Send + Sync {
    /// At most `limit` hits, best first.
    fn search(&self, query: &str, limit: usize) -> Vec<KnowledgeHit>;
}

pub struct SearchKnowledgeTool {
    knowledge: Arc<dyn KnowledgeBase>,
}

impl SearchKnowledgeTool {
    pub fn new(knowledge: Arc<dyn KnowledgeBase>) -> Self {
        Self { knowledge }
    }
}

#[async_trait]
impl Tool for SearchKnowledgeTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "search_knowledge".to_string(),
            description: "Search the novel knowledge base (characters, worlds, plots, scenes) \
                          for relevant material."
                .to_string(),
            parameters_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": { "type": "string", "description": "Search keywords" },
                    "limit": { "type": "number", "description": "Maximum number of results" }
                },
                "required": ["query"]
            }),
        }
    }

    #[tracing::instrument(level = "info", skip_all)]
    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value> {
        let query = require_string(&arguments, "query")?.trim().to_string();
        if query.is_empty() {
            return Err(ToolError::InvalidArguments(
                "query must not be empty".to_string(),
            ));
        }
        let requested = optional_count(&arguments, "limit")?.unwrap_or(DEFAULT_SEARCH_LIMIT);
        if requested == 0 {
            return Err(ToolError::InvalidArguments(
                "limit must be at least 1".to_string(),
            ));
        }
        let limit = requested.min(MAX_SEARCH_LIMIT);

        let results = self.knowledge.search(&query, limit);
        tracing::debug!(
            query_len = query.len(),
            requested,
            limit,
            hits = results.len(),
            "knowledge search finished"
        );
        Ok(serde_json::json!({
            "query": query,
            "limit": limit,
            "total": results.len(),
            "results": results,
        }))
    }
}
