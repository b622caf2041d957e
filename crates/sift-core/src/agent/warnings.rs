use std::fmt;

use super::state::AgentState;

const LIKELY_MIN_CALLS: usize = 3;
const LIKELY_MIN_CHARS: usize = 2_000;
const MAYBE_MIN_CALLS: usize = 1;
const MAYBE_MIN_CHARS: usize = 800;

/// Heuristic judgement of whether enough has been retrieved to answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sufficiency {
    LikelySufficient,
    MaybeSufficient,
    Insufficient,
}

impl Sufficiency {
    #[must_use]
    pub fn classify(successful_calls: usize, retrieved_chars: usize) -> Self {
        if successful_calls >= LIKELY_MIN_CALLS && retrieved_chars >= LIKELY_MIN_CHARS {
            Self::LikelySufficient
        } else if successful_calls >= MAYBE_MIN_CALLS && retrieved_chars >= MAYBE_MIN_CHARS {
            Self::MaybeSufficient
        } else {
            Self::Insufficient
        }
    }
}

/// Steering hints inserted into the reasoning prompt. Advisory only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Warning {
    RetrievalRequired,
    Repetition { tool: String },
    ZeroResults { tool: String },
    Sufficiency(Sufficiency),
    LastIteration { remaining: usize },
}

impl fmt::Display for Warning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RetrievalRequired => f.write_str(
                "No document content has been retrieved yet. Call a retrieval tool before \
                 answering; do not answer from general knowledge.",
            ),
            Self::Repetition { tool } => write!(
                f,
                "The last two calls used `{tool}` with identical parameters. Repeating it will \
                 not surface anything new: change the query, switch tools, or answer."
            ),
            Self::ZeroResults { tool } => write!(
                f,
                "The last `{tool}` call succeeded but returned no results. Try different terms \
                 or another tool, or answer with what is already known."
            ),
            Self::Sufficiency(Sufficiency::LikelySufficient) => f.write_str(
                "The retrieved context is likely sufficient. Answer now unless a specific \
                 fact is still missing.",
            ),
            Self::Sufficiency(Sufficiency::MaybeSufficient) => f.write_str(
                "The retrieved context may be sufficient. Consider answering if it covers the \
                 question.",
            ),
            Self::Sufficiency(Sufficiency::Insufficient) => f.write_str(
                "The retrieved context is still thin. Keep retrieving.",
            ),
            Self::LastIteration { remaining } => write!(
                f,
                "URGENT: only {remaining} reasoning step(s) left. Answer now with the context \
                 you have."
            ),
        }
    }
}

/// Warnings for the reasoning call about to run as `state.iteration`.
#[must_use]
pub fn collect(state: &AgentState, max_iterations: usize) -> Vec<Warning> {
    let mut warnings = Vec::new();

    if state.iteration == 1 && state.entries.is_empty() {
        warnings.push(Warning::RetrievalRequired);
    }

    let mut recent = state.tool_steps().rev();
    let last = recent.next();
    if let (Some((a, _)), Some((b, _))) = (last, recent.next())
        && a.tool_id == b.tool_id
        && a.params == b.params
    {
        warnings.push(Warning::Repetition {
            tool: a.tool_id.clone(),
        });
    }
    if let Some((call, result)) = last
        && result.success
        && result.result_count() == 0
    {
        warnings.push(Warning::ZeroResults {
            tool: call.tool_id.clone(),
        });
    }

    if state.tool_call_count() > 0 {
        let level = Sufficiency::classify(state.successful_calls(), state.retrieved_chars());
        if level != Sufficiency::Insufficient {
            warnings.push(Warning::Sufficiency(level));
        }
    }

    let remaining = max_iterations.saturating_sub(state.iteration) + 1;
    if remaining <= 2 && max_iterations > 1 {
        warnings.push(Warning::LastIteration { remaining });
    }
    warnings
}

#[cfg(test)]
mod tests {
    use serde_json::{Map, json};
    use sift_tools::{ToolCall, ToolData, ToolResult};

    use super::*;

    fn params(query: &str) -> Map<String, serde_json::Value> {
        let mut map = Map::new();
        map.insert("query".into(), json!(query));
        map
    }

    fn ok(chars: usize, count: usize) -> ToolResult {
        ToolResult::ok(
            "keyword_search",
            ToolData {
                text: "x".repeat(chars),
                result_count: count,
                sources: vec![],
            },
        )
    }

    #[test]
    fn classify_thresholds() {
        assert_eq!(Sufficiency::classify(3, 2_000), Sufficiency::LikelySufficient);
        assert_eq!(Sufficiency::classify(2, 5_000), Sufficiency::MaybeSufficient);
        assert_eq!(Sufficiency::classify(1, 800), Sufficiency::MaybeSufficient);
        assert_eq!(Sufficiency::classify(5, 799), Sufficiency::Insufficient);
        assert_eq!(Sufficiency::classify(0, 10_000), Sufficiency::Insufficient);
    }

    #[test]
    fn first_iteration_requires_retrieval() {
        let state = AgentState {
            iteration: 1,
            ..AgentState::default()
        };
        assert_eq!(collect(&state, 8), vec![Warning::RetrievalRequired]);
    }

    #[test]
    fn repetition_detected_on_identical_calls() {
        let mut state = AgentState::default();
        state.record_tool(1, ToolCall::new("keyword_search", params("lehman")), ok(100, 1));
        state.record_tool(2, ToolCall::new("keyword_search", params("lehman")), ok(100, 1));
        state.iteration = 3;
        let warnings = collect(&state, 8);
        assert!(warnings.contains(&Warning::Repetition {
            tool: "keyword_search".into()
        }));
    }

    #[test]
    fn different_params_are_not_repetition() {
        let mut state = AgentState::default();
        state.record_tool(1, ToolCall::new("keyword_search", params("lehman")), ok(100, 1));
        state.record_tool(2, ToolCall::new("keyword_search", params("bankruptcy")), ok(100, 1));
        state.iteration = 3;
        assert!(
            !collect(&state, 8)
                .iter()
                .any(|w| matches!(w, Warning::Repetition { .. }))
        );
    }

    #[test]
    fn zero_results_on_last_call() {
        let mut state = AgentState::default();
        state.record_tool(1, ToolCall::new("regex_search", Map::new()), ok(11, 0));
        state.iteration = 2;
        assert!(collect(&state, 8).contains(&Warning::ZeroResults {
            tool: "regex_search".into()
        }));
    }

    #[test]
    fn failed_last_call_is_not_zero_results() {
        let mut state = AgentState::default();
        state.record_tool(
            1,
            ToolCall::new("regex_search", Map::new()),
            ToolResult::failure("regex_search", "bad pattern"),
        );
        state.iteration = 2;
        assert!(collect(&state, 8).is_empty());
    }

    #[test]
    fn sufficiency_suggests_answer() {
        let mut state = AgentState::default();
        for i in 0..3 {
            state.record_tool(1, ToolCall::new("keyword_search", params(&i.to_string())), ok(700, 2));
        }
        state.iteration = 2;
        assert!(collect(&state, 8).contains(&Warning::Sufficiency(Sufficiency::LikelySufficient)));
    }

    #[test]
    fn urgent_warning_near_limit() {
        let mut state = AgentState {
            iteration: 7,
            ..AgentState::default()
        };
        assert!(collect(&state, 8).contains(&Warning::LastIteration { remaining: 2 }));
        state.iteration = 8;
        assert!(collect(&state, 8).contains(&Warning::LastIteration { remaining: 1 }));
        state.iteration = 6;
        assert!(
            !collect(&state, 8)
                .iter()
                .any(|w| matches!(w, Warning::LastIteration { .. }))
        );
    }

    #[test]
    fn display_mentions_tool() {
        let text = Warning::Repetition {
            tool: "fetch_group".into(),
        }
        .to_string();
        assert!(text.contains("`fetch_group`"));
    }
}
