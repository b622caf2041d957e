use std::fmt::Write as _;

use super::state::{AgentState, StepRecord};
use super::warnings::Warning;

/// Characters of each past tool result echoed back in the history block.
const HISTORY_PREVIEW_CHARS: usize = 300;

pub const SYSTEM_PROMPT: &str = "\
You answer questions about a single document. You cannot see the document \
directly; you read it through retrieval tools. Each turn you either call tools \
or give the final answer.

Reply with exactly one JSON object and nothing else.

To call one tool:
{\"action\": \"use_tool\", \"tool\": \"<tool id>\", \"params\": {...}}

To call several independent tools at once:
{\"action\": \"use_tool\", \"parallel\": true, \"tool_calls\": [{\"tool\": \"<tool id>\", \"params\": {...}}, ...]}

To answer:
{\"action\": \"answer\", \"answer\": \"<answer grounded in the retrieved context>\"}

Rules:
- Base the answer only on retrieved context. Say so when the document does not contain it.
- Cite chunk or group ids from the context where they support the answer.
- Use only tools listed under Available tools, with the documented parameters.";

pub(crate) struct PromptInput<'a> {
    pub question: &'a str,
    pub state: &'a AgentState,
    pub warnings: &'a [Warning],
    pub tool_catalog: &'a str,
    pub history_window: usize,
    pub max_iterations: usize,
}

pub(crate) fn build_user_prompt(input: &PromptInput<'_>) -> String {
    let mut out = String::with_capacity(4096);
    let _ = writeln!(out, "## Question\n{}\n", input.question.trim());
    let _ = writeln!(
        out,
        "## Step\n{} of {}\n",
        input.state.iteration, input.max_iterations
    );

    out.push_str("## Retrieved context\n");
    let context = input.state.context();
    if context.is_empty() {
        out.push_str("(nothing retrieved yet)\n\n");
    } else {
        out.push_str(&context);
        out.push_str("\n\n");
    }

    let history = render_history(&input.state.steps, input.history_window);
    if !history.is_empty() {
        out.push_str("## Recent steps\n");
        out.push_str(&history);
        out.push('\n');
    }

    if !input.warnings.is_empty() {
        out.push_str("## Warnings\n");
        for warning in input.warnings {
            let _ = writeln!(out, "- {warning}");
        }
        out.push('\n');
    }

    out.push_str("## Available tools\n");
    out.push_str(input.tool_catalog);
    out
}

/// The last `window` steps, oldest first.
fn render_history(steps: &[StepRecord], window: usize) -> String {
    let start = steps.len().saturating_sub(window);
    let mut out = String::new();
    for step in &steps[start..] {
        match step {
            StepRecord::Tool {
                iteration,
                call,
                result,
            } => {
                let params = serde_json::Value::Object(call.params.clone());
                let _ = write!(out, "- [{iteration}] {} {params} -> ", call.tool_id);
                if result.success {
                    let preview = result
                        .data
                        .as_ref()
                        .map(|d| preview(&d.text))
                        .unwrap_or_default();
                    let _ = writeln!(out, "ok, {} result(s): {preview}", result.result_count());
                } else {
                    let _ = writeln!(
                        out,
                        "failed: {}",
                        result.error.as_deref().unwrap_or("unknown error")
                    );
                }
            }
            StepRecord::InvalidDecision { iteration, error } => {
                let _ = writeln!(
                    out,
                    "- [{iteration}] your reply was rejected: {error}. Reply with one JSON object."
                );
            }
        }
    }
    out
}

fn preview(text: &str) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    match flat.char_indices().nth(HISTORY_PREVIEW_CHARS) {
        Some((i, _)) => format!("{}…", &flat[..i]),
        None => flat,
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, json};
    use sift_tools::{ToolCall, ToolData, ToolResult};

    use super::*;

    fn query(q: &str) -> Map<String, serde_json::Value> {
        let mut map = Map::new();
        map.insert("query".into(), json!(q));
        map
    }

    #[test]
    fn empty_session_prompt() {
        let state = AgentState {
            iteration: 1,
            ..AgentState::default()
        };
        let prompt = build_user_prompt(&PromptInput {
            question: "  Who filed?  ",
            state: &state,
            warnings: &[Warning::RetrievalRequired],
            tool_catalog: "<tools>\n</tools>",
            history_window: 4,
            max_iterations: 8,
        });
        assert!(prompt.starts_with("## Question\nWho filed?\n"));
        assert!(prompt.contains("## Step\n1 of 8"));
        assert!(prompt.contains("(nothing retrieved yet)"));
        assert!(!prompt.contains("## Recent steps"));
        assert!(prompt.contains("## Warnings\n- No document content"));
        assert!(prompt.ends_with("<tools>\n</tools>"));
    }

    #[test]
    fn history_respects_window() {
        let mut state = AgentState::default();
        for i in 0..5 {
            state.record_tool(
                i + 1,
                ToolCall::new("keyword_search", query(&format!("q{i}"))),
                ToolResult::ok(
                    "keyword_search",
                    ToolData {
                        text: format!("hit {i}"),
                        result_count: 1,
                        sources: vec![],
                    },
                ),
            );
        }
        state.record_invalid(6, "no JSON object".into());
        let history = render_history(&state.steps, 3);
        assert!(!history.contains("q2"));
        assert!(history.contains(r#"keyword_search {"query":"q3"} -> ok, 1 result(s): hit 3"#));
        assert!(history.contains("[6] your reply was rejected: no JSON object"));
    }

    #[test]
    fn failed_step_shows_error() {
        let mut state = AgentState::default();
        state.record_tool(
            1,
            ToolCall::new("regex_search", Map::new()),
            ToolResult::failure("regex_search", "invalid pattern: unclosed group"),
        );
        let history = render_history(&state.steps, 5);
        assert!(history.contains("failed: invalid pattern: unclosed group"));
    }

    #[test]
    fn preview_flattens_and_cuts() {
        assert_eq!(preview("a\n\n  b"), "a b");
        let long = "x".repeat(400);
        let cut = preview(&long);
        assert_eq!(cut.chars().count(), HISTORY_PREVIEW_CHARS + 1);
        assert!(cut.ends_with('…'));
    }
}
