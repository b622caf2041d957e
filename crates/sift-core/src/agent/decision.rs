use serde::Deserialize;
use serde_json::{Map, Value};
use sift_llm::extract::parse_json;
use sift_tools::ToolCall;

/// What the reasoning step chose to do next.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    Answer { answer: String },
    UseTool(ToolCall),
    /// Calls dispatched together; results are merged in this order.
    Parallel(Vec<ToolCall>),
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DecisionError {
    #[error("response is not a decision object: {0}")]
    Malformed(String),

    #[error("unknown action `{0}`, expected `answer` or `use_tool`")]
    UnknownAction(String),

    #[error("`{action}` decision is missing `{field}`")]
    MissingField {
        action: &'static str,
        field: &'static str,
    },
}

/// Wire shape:
/// `{"action": "answer", "answer": ...}`,
/// `{"action": "use_tool", "tool": ..., "params": {...}}` or
/// `{"action": "use_tool", "parallel": true, "tool_calls": [{"tool": ..., "params": {...}}]}`.
#[derive(Debug, Deserialize)]
struct RawDecision {
    action: String,
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    tool: Option<String>,
    #[serde(default)]
    params: Map<String, Value>,
    #[serde(default)]
    parallel: bool,
    #[serde(default)]
    tool_calls: Vec<ToolCall>,
}

/// A decoded decision and whether JSON repair was needed to get it.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedDecision {
    pub decision: Decision,
    pub repaired: bool,
}

/// Decode the reasoning output.
///
/// # Errors
///
/// Returns [`DecisionError`] when no decision object can be recovered.
pub fn parse_decision(text: &str) -> Result<ParsedDecision, DecisionError> {
    let parsed = parse_json::<RawDecision>(text).map_err(|e| DecisionError::Malformed(e.to_string()))?;
    let raw = parsed.value;

    let decision = match raw.action.trim().to_ascii_lowercase().as_str() {
        "answer" => {
            let answer = raw
                .answer
                .map(|a| a.trim().to_owned())
                .filter(|a| !a.is_empty())
                .ok_or(DecisionError::MissingField {
                    action: "answer",
                    field: "answer",
                })?;
            Decision::Answer { answer }
        }
        "use_tool" | "tool" => {
            if raw.parallel || (raw.tool.is_none() && !raw.tool_calls.is_empty()) {
                if raw.tool_calls.is_empty() {
                    return Err(DecisionError::MissingField {
                        action: "use_tool",
                        field: "tool_calls",
                    });
                }
                Decision::Parallel(raw.tool_calls)
            } else {
                let tool = raw
                    .tool
                    .filter(|t| !t.trim().is_empty())
                    .ok_or(DecisionError::MissingField {
                        action: "use_tool",
                        field: "tool",
                    })?;
                Decision::UseTool(ToolCall::new(tool.trim(), raw.params))
            }
        }
        other => return Err(DecisionError::UnknownAction(other.to_owned())),
    };

    Ok(ParsedDecision {
        decision,
        repaired: parsed.repaired,
    })
}
