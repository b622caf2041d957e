use sift_tools::{ToolCall, ToolResult};

use crate::budget::{ContextEntry, render_context};

/// A completed step visible to later reasoning calls.
#[derive(Debug, Clone, PartialEq)]
pub enum StepRecord {
    Tool {
        iteration: usize,
        call: ToolCall,
        result: ToolResult,
    },
    /// The reasoning output could not be decoded.
    InvalidDecision { iteration: usize, error: String },
}

/// Per-question session state. Owned by one session and never shared.
#[derive(Debug, Clone, Default)]
pub struct AgentState {
    pub iteration: usize,
    pub entries: Vec<ContextEntry>,
    pub steps: Vec<StepRecord>,
    pub(crate) tool_calls: usize,
}

impl AgentState {
    pub fn record_tool(&mut self, iteration: usize, call: ToolCall, result: ToolResult) {
        self.tool_calls += 1;
        if let Some(data) = result.data.as_ref().filter(|d| d.result_count > 0) {
            self.entries.push(ContextEntry::new(
                format!("{} #{}", call.tool_id, self.tool_calls),
                data.text.clone(),
                data.sources.clone(),
            ));
        }
        self.steps.push(StepRecord::Tool {
            iteration,
            call,
            result,
        });
    }

    pub fn record_invalid(&mut self, iteration: usize, error: String) {
        self.steps.push(StepRecord::InvalidDecision { iteration, error });
    }

    /// Tool steps in execution order.
    pub fn tool_steps(&self) -> impl DoubleEndedIterator<Item = (&ToolCall, &ToolResult)> {
        self.steps.iter().filter_map(|s| match s {
            StepRecord::Tool { call, result, .. } => Some((call, result)),
            StepRecord::InvalidDecision { .. } => None,
        })
    }

    #[must_use]
    pub fn tool_call_count(&self) -> usize {
        self.tool_calls
    }

    #[must_use]
    pub fn successful_calls(&self) -> usize {
        self.tool_steps().filter(|(_, r)| r.success).count()
    }

    /// Characters of text retrieved by successful calls, pruned or not.
    #[must_use]
    pub fn retrieved_chars(&self) -> usize {
        self.tool_steps().map(|(_, r)| r.content_len()).sum()
    }

    #[must_use]
    pub fn context(&self) -> String {
        render_context(&self.entries)
    }

    /// Distinct provenance labels of the current context, first-seen order.
    #[must_use]
    pub fn sources(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::new();
        for source in self.entries.iter().flat_map(|e| &e.sources) {
            if !out.contains(source) {
                out.push(source.clone());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use serde_json::Map;
    use sift_tools::ToolData;

    use super::*;

    fn hit(text: &str, count: usize, source: &str) -> ToolResult {
        ToolResult::ok(
            "keyword_search",
            ToolData {
                text: text.into(),
                result_count: count,
                sources: vec![source.into()],
            },
        )
    }

    #[test]
    fn only_nonempty_successes_enter_context() {
        let mut state = AgentState::default();
        let call = ToolCall::new("keyword_search", Map::new());
        state.record_tool(1, call.clone(), hit("found it", 1, "chunk:c1"));
        state.record_tool(1, call.clone(), hit("No matches.", 0, "chunk:c9"));
        state.record_tool(2, call, ToolResult::failure("keyword_search", "boom"));

        assert_eq!(state.entries.len(), 1);
        assert_eq!(state.entries[0].label, "keyword_search #1");
        assert_eq!(state.tool_call_count(), 3);
        assert_eq!(state.successful_calls(), 2);
        assert_eq!(state.sources(), vec!["chunk:c1"]);
    }

    #[test]
    fn invalid_decisions_are_not_tool_steps() {
        let mut state = AgentState::default();
        state.record_invalid(1, "no JSON".into());
        assert_eq!(state.tool_steps().count(), 0);
        assert_eq!(state.steps.len(), 1);
    }
}
