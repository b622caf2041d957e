use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use sift_corpus::Granularity;
use sift_llm::extract::parse_json;
use sift_tools::ToolCall;

/// Operations accepted in one round. Longer plans are rejected outright.
pub const MAX_OPERATIONS_PER_ROUND: usize = 8;

/// One step of a retrieval plan, drawn from a closed vocabulary.
///
/// Wire shape: `{"tool": "<name>", "args": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "tool", content = "args", rename_all = "snake_case")]
pub enum Operation {
    VectorSearch {
        query: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        top_k: Option<usize>,
    },
    KeywordSearch {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        query: Option<String>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        keywords: Vec<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        top_k: Option<usize>,
    },
    FetchGroup {
        group_id: String,
        #[serde(default)]
        granularity: Granularity,
    },
}

impl Operation {
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::VectorSearch { .. } => "vector_search",
            Self::KeywordSearch { .. } => "keyword_search",
            Self::FetchGroup { .. } => "fetch_group",
        }
    }

    /// Short human-readable form used in context labels and events.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::VectorSearch { query, .. } => format!("vector_search \"{query}\""),
            Self::KeywordSearch { query, keywords, .. } => {
                let mut terms: Vec<&str> = query.iter().map(String::as_str).collect();
                terms.extend(keywords.iter().map(String::as_str));
                format!("keyword_search \"{}\"", terms.join(" "))
            }
            Self::FetchGroup {
                group_id,
                granularity,
            } => format!("fetch_group {group_id} ({})", granularity.as_str()),
        }
    }

    /// The registry call executing this operation. Searches rank chunks.
    #[must_use]
    pub fn to_call(&self) -> ToolCall {
        let mut params = Map::new();
        match self {
            Self::VectorSearch { query, top_k } => {
                params.insert("query".into(), json!(query));
                params.insert("target".into(), json!("chunks"));
                insert_top_k(&mut params, *top_k);
            }
            Self::KeywordSearch {
                query,
                keywords,
                top_k,
            } => {
                if let Some(query) = query {
                    params.insert("query".into(), json!(query));
                }
                params.insert("keywords".into(), json!(keywords));
                params.insert("target".into(), json!("chunks"));
                insert_top_k(&mut params, *top_k);
            }
            Self::FetchGroup {
                group_id,
                granularity,
            } => {
                params.insert("group_id".into(), json!(group_id));
                params.insert("granularity".into(), json!(granularity.as_str()));
            }
        }
        ToolCall::new(self.name(), params)
    }
}

fn insert_top_k(params: &mut Map<String, Value>, top_k: Option<usize>) {
    if let Some(k) = top_k {
        params.insert("top_k".into(), json!(k));
    }
}

/// A planning-call result: `{"operations": [...], "final": bool}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalPlan {
    pub operations: Vec<Operation>,
    #[serde(rename = "final", default)]
    pub is_final: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum PlanParseError {
    #[error("plan could not be decoded: {0}")]
    Malformed(String),

    #[error("plan has {0} operations, at most {MAX_OPERATIONS_PER_ROUND} are allowed")]
    TooManyOperations(usize),
}

/// A decoded plan. `repaired` plans needed the lenient JSON repair pass and
/// are logged as less trustworthy.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedPlan {
    pub plan: RetrievalPlan,
    pub repaired: bool,
}

/// Decode a planning response, falling back to JSON repair once.
///
/// # Errors
///
/// Returns [`PlanParseError`] when neither the raw nor the repaired text
/// decodes into a plan, or the plan exceeds the operation cap.
pub fn parse_plan(text: &str) -> Result<ParsedPlan, PlanParseError> {
    let parsed =
        parse_json::<RetrievalPlan>(text).map_err(|e| PlanParseError::Malformed(e.to_string()))?;
    let count = parsed.value.operations.len();
    if count > MAX_OPERATIONS_PER_ROUND {
        return Err(PlanParseError::TooManyOperations(count));
    }
    if parsed.repaired {
        tracing::warn!(operations = count, "plan decoded only after JSON repair");
    }
    Ok(ParsedPlan {
        plan: parsed.value,
        repaired: parsed.repaired,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_clean_plan() {
        let text = r#"{
            "operations": [
                {"tool": "keyword_search", "args": {"keywords": ["Lehman", "2008"]}},
                {"tool": "fetch_group", "args": {"group_id": "group-2", "granularity": "full"}},
                {"tool": "vector_search", "args": {"query": "bankruptcy filing", "top_k": 3}}
            ],
            "final": true
        }"#;
        let parsed = parse_plan(text).unwrap();
        assert!(!parsed.repaired);
        assert!(parsed.plan.is_final);
        assert_eq!(
            parsed.plan.operations,
            vec![
                Operation::KeywordSearch {
                    query: None,
                    keywords: vec!["Lehman".into(), "2008".into()],
                    top_k: None
                },
                Operation::FetchGroup {
                    group_id: "group-2".into(),
                    granularity: Granularity::Full
                },
                Operation::VectorSearch {
                    query: "bankruptcy filing".into(),
                    top_k: Some(3)
                },
            ]
        );
    }

    #[test]
    fn final_defaults_to_false_and_granularity_to_digest() {
        let text = r#"{"operations": [{"tool": "fetch_group", "args": {"group_id": "group-1"}}]}"#;
        let plan = parse_plan(text).unwrap().plan;
        assert!(!plan.is_final);
        assert_eq!(
            plan.operations[0],
            Operation::FetchGroup {
                group_id: "group-1".into(),
                granularity: Granularity::Digest
            }
        );
    }

    #[test]
    fn repaired_plan_is_flagged() {
        let text = "```json\n{\"operations\": [], \"final\": false,}\n```";
        let parsed = parse_plan(text).unwrap();
        assert!(parsed.repaired);
        assert!(parsed.plan.operations.is_empty());
    }

    #[test]
    fn unknown_tool_is_rejected() {
        let text = r#"{"operations": [{"tool": "delete_group", "args": {"group_id": "group-1"}}]}"#;
        assert!(matches!(parse_plan(text), Err(PlanParseError::Malformed(_))));
    }

    #[test]
    fn missing_required_arg_is_rejected() {
        let text = r#"{"operations": [{"tool": "vector_search", "args": {"top_k": 2}}]}"#;
        assert!(matches!(parse_plan(text), Err(PlanParseError::Malformed(_))));
    }

    #[test]
    fn missing_operations_is_rejected() {
        assert!(matches!(
            parse_plan(r#"{"final": true}"#),
            Err(PlanParseError::Malformed(_))
        ));
    }

    #[test]
    fn oversized_plan_is_rejected() {
        let ops: Vec<String> = (0..=MAX_OPERATIONS_PER_ROUND)
            .map(|i| format!(r#"{{"tool": "fetch_group", "args": {{"group_id": "group-{i}"}}}}"#))
            .collect();
        let text = format!(r#"{{"operations": [{}]}}"#, ops.join(","));
        assert!(matches!(
            parse_plan(&text),
            Err(PlanParseError::TooManyOperations(9))
        ));
    }

    #[test]
    fn operations_map_to_registry_calls() {
        let call = Operation::KeywordSearch {
            query: Some("lehman".into()),
            keywords: vec![],
            top_k: Some(4),
        }
        .to_call();
        assert_eq!(call.tool_id, "keyword_search");
        assert_eq!(call.params["query"], "lehman");
        assert_eq!(call.params["target"], "chunks");
        assert_eq!(call.params["top_k"], 4);

        let call = Operation::FetchGroup {
            group_id: "group-3".into(),
            granularity: Granularity::Summary,
        }
        .to_call();
        assert_eq!(call.params["granularity"], "summary");
    }

    #[test]
    fn describe_is_compact() {
        let op = Operation::KeywordSearch {
            query: Some("filing".into()),
            keywords: vec!["Lehman".into()],
            top_k: None,
        };
        assert_eq!(op.describe(), "keyword_search \"filing Lehman\"");
        let op = Operation::FetchGroup {
            group_id: "group-2".into(),
            granularity: Granularity::Digest,
        };
        assert_eq!(op.describe(), "fetch_group group-2 (digest)");
    }
}
