//! Local tools the model may call during a chat turn.

mod error;
mod image;
mod knowledge;
mod registry;
mod traits;

pub use error::{Result, ToolError};
pub use image::{GenerateImageTool, ImageStyle};
pub use knowledge::{DEFAULT_SEARCH_LIMIT, KnowledgeBase, KnowledgeHit, SearchKnowledgeTool};
pub use registry::ToolRegistry;
pub use traits::{Tool, ToolSpec, to_llm_tool_def};
