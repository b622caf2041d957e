//! Retrieval tools and the registry that gates and executes them.

pub mod context;
pub mod executor;
pub mod fetch;
pub mod registry;
pub mod search;
pub mod text;

pub use context::RetrievalContext;
pub use executor::{
    MAX_TOOL_OUTPUT_CHARS, Tool, ToolCall, ToolData, ToolError, ToolResult, deserialize_params,
    truncate_tool_output,
};
pub use fetch::FetchGroupTool;
pub use registry::{Capabilities, ToolDef, ToolRegistry, format_definitions};
pub use search::{KeywordSearchTool, SearchTarget, VectorSearchTool};
pub use text::{BooleanSearchTool, RegexSearchTool, TextSearchTool};
