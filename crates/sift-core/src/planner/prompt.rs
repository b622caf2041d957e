use std::collections::BTreeSet;
use std::fmt::Write as _;

use sift_corpus::types::truncate_chars;
use sift_tools::Capabilities;

/// Characters of already-retrieved context shown to the planner.
const CONTEXT_PREVIEW_CHARS: usize = 4_000;

pub const PLANNER_SYSTEM_PROMPT: &str = "\
You plan document retrieval. Given a question and a map of the document's \
sections, choose the retrieval operations that gather the evidence needed to \
answer it. You do not answer the question yourself.

Reply with exactly one JSON object:
{\"operations\": [{\"tool\": \"<tool>\", \"args\": {...}}], \"final\": <true|false>}

Set \"final\" to true when the operations in this reply complete the evidence. \
An empty operations list means nothing more can be retrieved.";

pub(crate) struct PlanPromptInput<'a> {
    pub question: &'a str,
    pub group_map: &'a str,
    pub capabilities: &'a Capabilities,
    pub fetched: &'a BTreeSet<String>,
    pub context: &'a str,
    pub round: usize,
    pub max_rounds: usize,
}

pub(crate) fn build_plan_prompt(input: &PlanPromptInput<'_>) -> String {
    let mut out = String::with_capacity(input.group_map.len() + 2048);
    let _ = writeln!(out, "## Question\n{}\n", input.question.trim());
    let _ = writeln!(out, "## Round\n{} of {}\n", input.round, input.max_rounds);

    out.push_str("## Document map\n");
    if input.group_map.trim().is_empty() {
        out.push_str("(no sections available; only chunk searches can be used)\n\n");
    } else {
        out.push_str(input.group_map.trim_end());
        out.push_str("\n\n");
    }

    out.push_str("## Tools\n");
    out.push_str(&tool_vocabulary(input.capabilities));
    out.push('\n');

    out.push_str("## Already fetched\n");
    if input.fetched.is_empty() {
        out.push_str("(none)\n\n");
    } else {
        let ids: Vec<&str> = input.fetched.iter().map(String::as_str).collect();
        let _ = writeln!(out, "{}\nDo not fetch these again.\n", ids.join(", "));
    }

    out.push_str("## Retrieved so far\n");
    if input.context.is_empty() {
        out.push_str("(nothing yet)\n");
    } else {
        let preview = truncate_chars(input.context, CONTEXT_PREVIEW_CHARS);
        out.push_str(preview);
        if preview.len() < input.context.len() {
            out.push_str("\n…");
        }
        out.push('\n');
    }
    out
}

/// The closed vocabulary with argument contracts. Always lists all three
/// operations; ones the document cannot serve are marked.
fn tool_vocabulary(caps: &Capabilities) -> String {
    let unavailable = |ok: bool| if ok { "" } else { " (not available for this document)" };
    let mut out = String::new();
    let _ = writeln!(
        out,
        "- vector_search{}: semantic similarity over chunks.\n  args: {{\"query\": string, \"top_k\": integer (optional, default 5)}}",
        unavailable(caps.has_vector_index)
    );
    let _ = writeln!(
        out,
        "- keyword_search{}: BM25 ranking over chunks.\n  args: {{\"query\": string (optional), \"keywords\": [string] (optional), \"top_k\": integer (optional, default 5)}}; give query or keywords",
        unavailable(caps.has_chunks)
    );
    let _ = writeln!(
        out,
        "- fetch_group{}: text of one section from the document map.\n  args: {{\"group_id\": string, \"granularity\": \"summary\" | \"digest\" | \"full\" (optional, default \"digest\")}}",
        unavailable(caps.has_semantic_groups)
    );
    out
}
