use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sift_corpus::VectorSearchError;

use crate::context::RetrievalContext;
use crate::registry::ToolDef;

/// Structured tool invocation from the reasoning step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    #[serde(alias = "tool")]
    pub tool_id: String,
    #[serde(default)]
    pub params: Map<String, Value>,
}

impl ToolCall {
    #[must_use]
    pub fn new(tool_id: impl Into<String>, params: Map<String, Value>) -> Self {
        Self {
            tool_id: tool_id.into(),
            params,
        }
    }
}

/// Successful tool output.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ToolData {
    /// Text appended to the session context.
    pub text: String,
    /// Number of hits or fetched items.
    pub result_count: usize,
    /// Provenance labels such as `chunk:c3` or `group:group-2`.
    pub sources: Vec<String>,
}

/// Outcome of one call as seen by the agent: `{success, data | error}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResult {
    pub tool_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<ToolData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResult {
    #[must_use]
    pub fn ok(tool_id: impl Into<String>, data: ToolData) -> Self {
        Self {
            tool_id: tool_id.into(),
            success: true,
            data: Some(data),
            error: None,
        }
    }

    #[must_use]
    pub fn failure(tool_id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            tool_id: tool_id.into(),
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    #[must_use]
    pub fn result_count(&self) -> usize {
        self.data.as_ref().map_or(0, |d| d.result_count)
    }

    /// Characters of retrieved text.
    #[must_use]
    pub fn content_len(&self) -> usize {
        self.data.as_ref().map_or(0, |d| d.text.chars().count())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("unknown tool: {0}")]
    UnknownTool(String),

    #[error("invalid tool parameters: {message}")]
    InvalidParams { message: String },

    #[error("tool timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    #[error("capability unavailable: {0}")]
    Unavailable(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("vector search failed: {0}")]
    Vector(#[from] VectorSearchError),

    #[error("tool panicked: {0}")]
    Panicked(String),
}

/// Deserialize tool call params into a typed struct.
///
/// # Errors
///
/// Returns `ToolError::InvalidParams` when deserialization fails.
pub fn deserialize_params<T: serde::de::DeserializeOwned>(
    params: &Map<String, Value>,
) -> Result<T, ToolError> {
    serde_json::from_value(Value::Object(params.clone())).map_err(|e| ToolError::InvalidParams {
        message: e.to_string(),
    })
}

/// A retrieval capability. Implementations only read from the context.
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDef;

    fn execute<'a>(
        &'a self,
        ctx: &'a RetrievalContext,
        params: &'a Map<String, Value>,
    ) -> BoxFuture<'a, Result<ToolData, ToolError>>;
}

pub const MAX_TOOL_OUTPUT_CHARS: usize = 12_000;

/// Truncate output longer than `max_chars` characters with a head+tail split.
#[must_use]
pub fn truncate_tool_output(output: &str, max_chars: usize) -> String {
    let total = output.chars().count();
    if total <= max_chars {
        return output.to_string();
    }

    let half = max_chars / 2;
    let head_end = output
        .char_indices()
        .nth(half)
        .map_or(output.len(), |(i, _)| i);
    let tail_start = output
        .char_indices()
        .nth(total - half)
        .map_or(output.len(), |(i, _)| i);
    let truncated = total - 2 * half;

    format!(
        "{}\n\n... [truncated {truncated} chars, showing first and last ~{half} chars] ...\n\n{}",
        &output[..head_end],
        &output[tail_start..]
    )
}
