use std::fmt::Write;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tracing::Instrument;

use crate::context::RetrievalContext;
use crate::executor::{
    MAX_TOOL_OUTPUT_CHARS, Tool, ToolCall, ToolError, ToolResult, truncate_tool_output,
};
use crate::fetch::FetchGroupTool;
use crate::search::{KeywordSearchTool, VectorSearchTool};
use crate::text::{BooleanSearchTool, RegexSearchTool, TextSearchTool};

const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(30);

/// What the current document supports.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub has_semantic_groups: bool,
    pub has_vector_index: bool,
    pub has_chunks: bool,
}

#[derive(Debug, Clone)]
pub struct ToolDef {
    pub id: &'static str,
    pub description: &'static str,
    pub schema: schemars::Schema,
    /// Whether the tool can succeed on a corpus with these capabilities.
    pub availability: fn(&Capabilities) -> bool,
}

impl ToolDef {
    #[must_use]
    pub fn is_available(&self, caps: &Capabilities) -> bool {
        (self.availability)(caps)
    }
}

/// Catalog of retrieval tools.
///
/// Execution is stateless across calls and never fails: errors, panics and
/// timeouts come back as `ToolResult { success: false, .. }`.
pub struct ToolRegistry {
    tools: Vec<Arc<dyn Tool>>,
    timeout: Duration,
    max_output_chars: usize,
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self {
            tools: Vec::new(),
            timeout: DEFAULT_TOOL_TIMEOUT,
            max_output_chars: MAX_TOOL_OUTPUT_CHARS,
        }
    }
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let ids: Vec<_> = self.tools.iter().map(|t| t.definition().id).collect();
        f.debug_struct("ToolRegistry")
            .field("tools", &ids)
            .field("timeout", &self.timeout)
            .field("max_output_chars", &self.max_output_chars)
            .finish()
    }
}

impl ToolRegistry {
    #[must_use]
    pub fn new(tools: Vec<Arc<dyn Tool>>) -> Self {
        Self {
            tools,
            ..Self::default()
        }
    }

    /// Registry with every built-in retrieval tool.
    #[must_use]
    pub fn retrieval() -> Self {
        Self::new(vec![
            Arc::new(KeywordSearchTool),
            Arc::new(VectorSearchTool),
            Arc::new(TextSearchTool),
            Arc::new(RegexSearchTool),
            Arc::new(BooleanSearchTool),
            Arc::new(FetchGroupTool),
        ])
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_max_output_chars(mut self, max_output_chars: usize) -> Self {
        self.max_output_chars = max_output_chars;
        self
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.push(tool);
    }

    /// Every registered definition, regardless of availability.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDef> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    #[must_use]
    pub fn find(&self, id: &str) -> Option<ToolDef> {
        self.tools
            .iter()
            .map(|t| t.definition())
            .find(|def| def.id == id)
    }

    /// Definitions whose availability predicate holds for the given flags.
    ///
    /// Gating is advisory: [`ToolRegistry::execute`] still runs a filtered-out
    /// tool when asked for it by id.
    #[must_use]
    pub fn available_definitions(
        &self,
        has_semantic_groups: bool,
        has_vector_index: bool,
        has_chunks: bool,
    ) -> Vec<ToolDef> {
        self.available_for(&Capabilities {
            has_semantic_groups,
            has_vector_index,
            has_chunks,
        })
    }

    #[must_use]
    pub fn available_for(&self, caps: &Capabilities) -> Vec<ToolDef> {
        self.definitions()
            .into_iter()
            .filter(|def| def.is_available(caps))
            .collect()
    }

    /// Render the tools available under `caps` for a reasoning prompt.
    #[must_use]
    pub fn format_for_prompt(&self, caps: &Capabilities) -> String {
        format_definitions(&self.available_for(caps))
    }

    /// Run one call. Never returns an error.
    pub async fn execute(&self, ctx: &RetrievalContext, call: &ToolCall) -> ToolResult {
        let span = tracing::info_span!("tool", tool = %call.tool_id);
        async {
            let outcome = match self.tools.iter().find(|t| t.definition().id == call.tool_id) {
                Some(tool) => self.run_guarded(tool.as_ref(), ctx, call).await,
                None => Err(ToolError::UnknownTool(call.tool_id.clone())),
            };
            match outcome {
                Ok(mut data) => {
                    data.text = truncate_tool_output(&data.text, self.max_output_chars);
                    tracing::debug!(results = data.result_count, "tool succeeded");
                    ToolResult::ok(call.tool_id.clone(), data)
                }
                Err(e) => {
                    tracing::warn!("tool failed: {e}");
                    ToolResult::failure(call.tool_id.clone(), e.to_string())
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn run_guarded(
        &self,
        tool: &dyn Tool,
        ctx: &RetrievalContext,
        call: &ToolCall,
    ) -> Result<crate::executor::ToolData, ToolError> {
        let guarded = AssertUnwindSafe(async { tool.execute(ctx, &call.params).await }).catch_unwind();
        match tokio::time::timeout(self.timeout, guarded).await {
            Err(_) => Err(ToolError::Timeout {
                timeout_secs: self.timeout.as_secs(),
            }),
            Ok(Err(panic)) => Err(ToolError::Panicked(panic_message(panic.as_ref()))),
            Ok(Ok(result)) => result,
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_owned()
    }
}

/// Render definitions as a `<tools>` block with typed parameter lists.
#[must_use]
pub fn format_definitions(defs: &[ToolDef]) -> String {
    let mut out = String::from("<tools>\n");
    for def in defs {
        let _ = writeln!(out, "## {}", def.id);
        let _ = writeln!(out, "{}", def.description);
        format_schema_params(&mut out, &def.schema);
        out.push('\n');
    }
    out.push_str("</tools>");
    out
}

type JsonObject = serde_json::Map<String, serde_json::Value>;

/// Follow `$ref` into `$defs` and unwrap `Option<T>` (`anyOf` with `null`).
fn resolve<'a>(root: &'a JsonObject, schema: &'a JsonObject) -> &'a JsonObject {
    if let Some(name) = schema
        .get("$ref")
        .and_then(|v| v.as_str())
        .and_then(|r| r.strip_prefix("#/$defs/"))
        && let Some(def) = root
            .get("$defs")
            .and_then(|defs| defs.get(name))
            .and_then(|v| v.as_object())
    {
        return resolve(root, def);
    }
    if let Some(inner) = schema
        .get("anyOf")
        .and_then(|v| v.as_array())
        .and_then(|arr| {
            arr.iter()
                .filter_map(|v| v.as_object())
                .find(|o| o.get("type").and_then(|t| t.as_str()) != Some("null"))
        })
    {
        return resolve(root, inner);
    }
    schema
}

fn type_name(root: &JsonObject, schema: &JsonObject) -> String {
    let primary = match schema.get("type") {
        Some(serde_json::Value::String(t)) => Some(t.as_str()),
        Some(serde_json::Value::Array(types)) => types
            .iter()
            .filter_map(|v| v.as_str())
            .find(|t| *t != "null"),
        _ => None,
    };
    match primary {
        Some("array") => {
            let item = schema
                .get("items")
                .and_then(|v| v.as_object())
                .map_or_else(|| "string".to_owned(), |items| {
                    type_name(root, resolve(root, items))
                });
            format!("list of {item}")
        }
        Some(t) => t.to_owned(),
        None => "string".to_owned(),
    }
}

/// Allowed values of a string enum, plain or documented-variant form.
fn choices(schema: &JsonObject) -> Vec<&str> {
    if let Some(values) = schema.get("enum").and_then(|v| v.as_array()) {
        return values.iter().filter_map(|v| v.as_str()).collect();
    }
    schema
        .get("oneOf")
        .and_then(|v| v.as_array())
        .map(|arr| {
            arr.iter()
                .filter_map(|v| v.get("const")?.as_str())
                .collect()
        })
        .unwrap_or_default()
}

fn format_schema_params(out: &mut String, schema: &schemars::Schema) {
    let Some(root) = schema.as_object() else {
        return;
    };
    let Some(serde_json::Value::Object(props)) = root.get("properties") else {
        return;
    };
    if props.is_empty() {
        return;
    }

    let required: Vec<&str> = root
        .get("required")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str()).collect())
        .unwrap_or_default();

    out.push_str("Parameters:\n");
    for (name, prop) in props {
        let Some(prop) = prop.as_object() else {
            continue;
        };
        let target = resolve(root, prop);
        let desc = prop
            .get("description")
            .or_else(|| target.get("description"))
            .and_then(|v| v.as_str())
            .unwrap_or("");
        let req = if required.contains(&name.as_str()) {
            "required"
        } else {
            "optional"
        };
        let _ = write!(out, "  - {name}: {desc} ({}, {req}", type_name(root, target));
        let allowed = choices(target);
        if !allowed.is_empty() {
            let _ = write!(out, "; one of {}", allowed.join(" | "));
        }
        if let Some(default) = prop.get("default").and_then(|v| v.as_str()) {
            let _ = write!(out, "; default {default}");
        }
        out.push_str(")\n");
    }
}
