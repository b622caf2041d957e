use futures::future::BoxFuture;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value};
use sift_corpus::Granularity;

use crate::context::RetrievalContext;
use crate::executor::{Tool, ToolData, ToolError, deserialize_params};
use crate::registry::{Capabilities, ToolDef};

#[derive(Debug, Deserialize, JsonSchema)]
struct FetchGroupParams {
    /// Group id from the document map, e.g. `group-3`
    group_id: String,
    /// `summary`, `digest` (default) or `full`
    #[serde(default)]
    granularity: Granularity,
}

/// Fetch one semantic group's text at a chosen granularity.
#[derive(Debug, Clone, Copy, Default)]
pub struct FetchGroupTool;

impl Tool for FetchGroupTool {
    fn definition(&self) -> ToolDef {
        ToolDef {
            id: "fetch_group",
            description: "Read a semantic group by id. `summary` is a few sentences, `digest` \
                          adds the outline, `full` returns the complete text.",
            schema: schemars::schema_for!(FetchGroupParams),
            availability: |c: &Capabilities| c.has_semantic_groups,
        }
    }

    fn execute<'a>(
        &'a self,
        ctx: &'a RetrievalContext,
        params: &'a Map<String, Value>,
    ) -> BoxFuture<'a, Result<ToolData, ToolError>> {
        Box::pin(async move {
            let p: FetchGroupParams = deserialize_params(params)?;
            let id = p.group_id.trim();
            let group = ctx
                .corpus
                .group(id)
                .ok_or_else(|| ToolError::NotFound(format!("group `{id}`")))?;

            let mut header = format!("[{} | {}", group.id, p.granularity.as_str());
            if !group.keywords.is_empty() {
                header.push_str(" | keywords: ");
                header.push_str(&group.keywords.join(", "));
            }
            header.push(']');

            Ok(ToolData {
                text: format!("{header}\n{}", group.text(p.granularity)),
                result_count: 1,
                sources: vec![format!("group:{}", group.id)],
            })
        })
    }
}
