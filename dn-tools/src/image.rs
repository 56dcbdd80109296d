use crate::error::{Result, ToolError};
use crate::traits::{Tool, ToolSpec, optional_string, require_string};
use async_trait::async_trait;
use serde::Serialize;

const PLACEHOLDER_IMAGE_URL: &str = "https://example.com/generated-image.jpg";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageStyle {
    #[default]
    Realistic,
    Artistic,
    Cartoon,
}

impl ImageStyle {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "realistic" => Some(Self::Realistic),
            "artistic" => Some(Self::Artistic),
            "cartoon" => Some(Self::Cartoon),
            _ => None,
        }
    }
}

/// Illustration requests. No image backend is wired up yet, so results carry
/// a placeholder URL alongside the resolved prompt and style.
pub struct GenerateImageTool {
    image_url: String,
}

impl GenerateImageTool {
    pub fn new() -> Self {
        Self {
            image_url: PLACEHOLDER_IMAGE_URL.to_string(),
        }
    }
}

impl Default for GenerateImageTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for GenerateImageTool {
    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: "generate_image".to_string(),
            description: "Generate an illustration for the story.".to_string(),
            parameters_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "prompt": { "type": "string", "description": "Image generation prompt" },
                    "style": {
                        "type": "string",
                        "description": "Image style",
                        "enum": ["realistic", "artistic", "cartoon"]
                    }
                },
                "required": ["prompt"]
            }),
        }
    }

    #[tracing::instrument(level = "info", skip_all)]
    async fn execute(&self, arguments: serde_json::Value) -> Result<serde_json::Value> {
        let prompt = require_string(&arguments, "prompt")?;
        let style = match optional_string(&arguments, "style")? {
            None => ImageStyle::default(),
            Some(raw) => ImageStyle::parse(&raw).ok_or_else(|| {
                ToolError::InvalidArguments(format!(
                    "unknown style: {raw}; expected realistic, artistic or cartoon"
                ))
            })?,
        };
        Ok(serde_json::json!({
            "url": self.image_url,
            "prompt": prompt,
            "style": style,
        }))
    }
}
