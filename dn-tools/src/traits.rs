use crate::error::{Result, ToolError};
use async_trait::async_trait;

pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters_schema: serde_json::Value,
}

#[async_trait]
pub trait Tool: Send + Sync {
    fn spec(&self) -> ToolSpec;
    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value>;
}

pub fn to_llm_tool_def(tool: &dyn Tool) -> dn_llm::ToolDefinition {
    let spec = tool.spec();
    dn_llm::ToolDefinition {
        name: spec.name,
        description: spec.description,
        parameters: spec.parameters_schema,
    }
}

pub(crate) fn require_string(args: &serde_json::Value, key: &str) -> Result<String> {
    let Some(v) = args.get(key) else {
        return Err(ToolError::InvalidArguments(format!("missing key: {key}")));
    };
    match v {
        serde_json::Value::String(s) => Ok(s.clone()),
        other => Err(ToolError::InvalidArguments(format!(
            "key {key} must be string, got {other:?}"
        ))),
    }
}

pub(crate) fn optional_string(args: &serde_json::Value, key: &str) -> Result<Option<String>> {
    let Some(v) = args.get(key) else {
        return Ok(None);
    };
    match v {
        serde_json::Value::Null => Ok(None),
        serde_json::Value::String(s) => Ok(Some(s.clone())),
        other => Err(ToolError::InvalidArguments(format!(
            "key {key} must be string, got {other:?}"
        ))),
    }
}

/// Models sometimes send whole numbers as `5.0`; accept those too.
pub(crate) fn optional_count(args: &serde_json::Value, key: &str) -> Result<Option<usize>> {
    let Some(v) = args.get(key) else {
        return Ok(None);
    };
    if v.is_null() {
        return Ok(None);
    }
    let n = v
        .as_u64()
        .or_else(|| v.as_f64().filter(|f| f.fract() == 0.0 && *f >= 0.0).map(|f| f as u64))
        .ok_or_else(|| {
            ToolError::InvalidArguments(format!(
                "key {key} must be a non-negative integer, got {v:?}"
            ))
        })?;
    usize::try_from(n)
        .map(Some)
        .map_err(|_| ToolError::InvalidArguments(format!("key {key} is out of range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn optional_count_accepts_integral_floats() {
        assert_eq!(optional_count(&json!({"limit": 3}), "limit").expect("int"), Some(3));
        assert_eq!(optional_count(&json!({"limit": 3.0}), "limit").expect("float"), Some(3));
        assert_eq!(optional_count(&json!({}), "limit").expect("absent"), None);
        assert!(optional_count(&json!({"limit": 2.5}), "limit").is_err());
        assert!(optional_count(&json!({"limit": "3"}), "limit").is_err());
    }

    #[test]
    fn require_string_reports_missing_key() {
        let err = require_string(&json!({}), "query").expect_err("missing key");
        assert!(err.to_string().contains("missing key: query"));
    }
}
