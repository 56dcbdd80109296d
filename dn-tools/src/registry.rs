use crate::error::{Result, ToolError};
use crate::traits::{Tool, to_llm_tool_def};
use dn_llm::{ToolCall, ToolDefinition};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;

/// Ordered set of tools offered to the model, dispatched by name.
#[derive(Clone, Default)]
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<()> {
        let name = tool.spec().name;
        dn_llm::validate_tool_name(&name)?;
        if self.find(&name).is_some() {
            return Err(ToolError::InvalidArguments(format!(
                "tool already registered: {name}"
            )));
        }
        self.tools.push(tool);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| to_llm_tool_def(t.as_ref())).collect()
    }

    fn find(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.spec().name == name)
    }

    /// Run one model-issued call and return the tool message content.
    /// Failures become `{"error": ..}` content so the conversation can go on.
    #[tracing::instrument(
        level = "info",
        skip_all,
        fields(tool_call_id = %call.id, tool_name = %call.name)
    )]
    pub async fn dispatch(&self, call: &ToolCall) -> String {
        let started = Instant::now();
        match self.execute(call).await {
            Ok(out) => {
                let content = out.to_string();
                tracing::info!(
                    latency_ms = started.elapsed().as_millis() as u64,
                    output_len = content.len(),
                    "tool call executed"
                );
                content
            }
            Err(e) => {
                tracing::warn!(error = %e, "tool call failed");
                json!({ "error": e.to_string() }).to_string()
            }
        }
    }

    async fn execute(&self, call: &ToolCall) -> Result<serde_json::Value> {
        let Some(tool) = self.find(&call.name) else {
            return Err(ToolError::UnknownTool(call.name.clone()));
        };
        let arguments = if call.arguments.trim().is_empty() {
            json!({})
        } else {
            serde_json::from_str(&call.arguments).map_err(|e| {
                ToolError::InvalidArguments(format!(
                    "arguments for {} are not JSON: {e}",
                    call.name
                ))
            })?
        };
        tool.execute(arguments).await
    }
}
