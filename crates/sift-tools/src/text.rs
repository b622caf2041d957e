use std::fmt::Write as _;

use futures::future::BoxFuture;
use regex::{Regex, RegexBuilder};
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{Map, Value};
use sift_corpus::CorpusAccessor;

use crate::context::RetrievalContext;
use crate::executor::{Tool, ToolData, ToolError, deserialize_params};
use crate::registry::{Capabilities, ToolDef};
use crate::search::{HitWriter, clamp_top_k};

const DEFAULT_SCAN_TOP_K: usize = 10;
const DEFAULT_CONTEXT_CHARS: usize = 200;
const MAX_CONTEXT_CHARS: usize = 2_000;
const REGEX_SIZE_LIMIT: usize = 1 << 20;

fn has_chunks(c: &Capabilities) -> bool {
    c.has_chunks
}

/// Text around byte range `start..end`, widened by up to `context` chars
/// on each side. Elided ends are marked with `…`.
fn snippet(text: &str, start: usize, end: usize, context: usize) -> String {
    let from = if context == 0 {
        start
    } else {
        text[..start]
            .char_indices()
            .rev()
            .nth(context - 1)
            .map_or(0, |(i, _)| i)
    };
    let to = text[end..]
        .char_indices()
        .nth(context)
        .map_or(text.len(), |(i, _)| end + i);

    let mut out = String::with_capacity(to - from + 6);
    if from > 0 {
        out.push('…');
    }
    out.push_str(&text[from..to]);
    if to < text.len() {
        out.push('…');
    }
    out
}

/// Scan chunks in document order, reporting the first match of each.
fn scan(ctx: &RetrievalContext, re: &Regex, top_k: usize, context_chars: usize) -> ToolData {
    let context_chars = context_chars.min(MAX_CONTEXT_CHARS);
    let mut out = HitWriter::default();
    let mut matched_chunks = 0usize;

    for (index, chunk) in ctx.corpus.chunks().iter().enumerate() {
        let mut matches = re.find_iter(&chunk.text);
        let Some(first) = matches.next() else {
            continue;
        };
        matched_chunks += 1;
        if matched_chunks > top_k {
            continue;
        }
        let count = 1 + matches.count();
        let detail = if count == 1 {
            "1 match".to_owned()
        } else {
            format!("{count} matches")
        };
        let body = snippet(&chunk.text, first.start(), first.end(), context_chars);
        out.chunk(ctx, index, &detail, &body);
    }
    tracing::debug!(matched_chunks, "pattern scan");

    let mut data = out.finish("No matches.");
    if matched_chunks > top_k {
        let _ = write!(
            data.text,
            "\n\n({} more matching chunks not shown)",
            matched_chunks - top_k
        );
    }
    data
}

#[derive(Debug, Deserialize, JsonSchema)]
struct TextSearchParams {
    /// Literal text to find, case-insensitive
    text: String,
    /// Maximum number of chunks to show (default 10)
    top_k: Option<usize>,
    /// Characters of context around each match (default 200)
    context_chars: Option<usize>,
}

/// Case-insensitive literal search with surrounding context.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextSearchTool;

impl Tool for TextSearchTool {
    fn definition(&self) -> ToolDef {
        ToolDef {
            id: "text_search",
            description: "Find a literal phrase anywhere in the document, ignoring case. \
                          Returns each matching chunk with surrounding context.",
            schema: schemars::schema_for!(TextSearchParams),
            availability: has_chunks,
        }
    }

    fn execute<'a>(
        &'a self,
        ctx: &'a RetrievalContext,
        params: &'a Map<String, Value>,
    ) -> BoxFuture<'a, Result<ToolData, ToolError>> {
        Box::pin(async move {
            let p: TextSearchParams = deserialize_params(params)?;
            if p.text.trim().is_empty() {
                return Err(ToolError::InvalidParams {
                    message: "`text` must not be empty".into(),
                });
            }
            let re = RegexBuilder::new(&regex::escape(&p.text))
                .case_insensitive(true)
                .build()?;
            Ok(scan(
                ctx,
                &re,
                clamp_top_k(p.top_k, DEFAULT_SCAN_TOP_K),
                p.context_chars.unwrap_or(DEFAULT_CONTEXT_CHARS),
            ))
        })
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct RegexSearchParams {
    /// Regular expression (Rust `regex` syntax, no backreferences)
    pattern: String,
    /// Ignore case when matching
    #[serde(default)]
    case_insensitive: bool,
    /// Maximum number of chunks to show (default 10)
    top_k: Option<usize>,
    /// Characters of context around each match (default 200)
    context_chars: Option<usize>,
}

/// Regular-expression search over chunk text.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegexSearchTool;

impl Tool for RegexSearchTool {
    fn definition(&self) -> ToolDef {
        ToolDef {
            id: "regex_search",
            description: "Match a regular expression against every chunk. Useful for dates, \
                          identifiers, amounts and other structured patterns.",
            schema: schemars::schema_for!(RegexSearchParams),
            availability: has_chunks,
        }
    }

    fn execute<'a>(
        &'a self,
        ctx: &'a RetrievalContext,
        params: &'a Map<String, Value>,
    ) -> BoxFuture<'a, Result<ToolData, ToolError>> {
        Box::pin(async move {
            let p: RegexSearchParams = deserialize_params(params)?;
            if p.pattern.is_empty() {
                return Err(ToolError::InvalidParams {
                    message: "`pattern` must not be empty".into(),
                });
            }
            let re = RegexBuilder::new(&p.pattern)
                .case_insensitive(p.case_insensitive)
                .size_limit(REGEX_SIZE_LIMIT)
                .build()?;
            Ok(scan(
                ctx,
                &re,
                clamp_top_k(p.top_k, DEFAULT_SCAN_TOP_K),
                p.context_chars.unwrap_or(DEFAULT_CONTEXT_CHARS),
            ))
        })
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct BooleanSearchParams {
    /// Every term must appear
    #[serde(default)]
    all_of: Vec<String>,
    /// At least one term must appear
    #[serde(default)]
    any_of: Vec<String>,
    /// No term may appear
    #[serde(default)]
    none_of: Vec<String>,
    /// Maximum number of chunks to show (default 10)
    top_k: Option<usize>,
}

fn lowered(terms: &[String]) -> Vec<String> {
    terms
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// AND / OR / NOT term filter over chunks.
#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanSearchTool;

impl Tool for BooleanSearchTool {
    fn definition(&self) -> ToolDef {
        ToolDef {
            id: "boolean_search",
            description: "Filter chunks by term presence: all of `all_of`, at least one of \
                          `any_of`, none of `none_of`. Case-insensitive substring match.",
            schema: schemars::schema_for!(BooleanSearchParams),
            availability: has_chunks,
        }
    }

    fn execute<'a>(
        &'a self,
        ctx: &'a RetrievalContext,
        params: &'a Map<String, Value>,
    ) -> BoxFuture<'a, Result<ToolData, ToolError>> {
        Box::pin(async move {
            let p: BooleanSearchParams = deserialize_params(params)?;
            let all_of = lowered(&p.all_of);
            let any_of = lowered(&p.any_of);
            let none_of = lowered(&p.none_of);
            if all_of.is_empty() && any_of.is_empty() {
                return Err(ToolError::InvalidParams {
                    message: "`all_of` or `any_of` must contain a term".into(),
                });
            }
            let top_k = clamp_top_k(p.top_k, DEFAULT_SCAN_TOP_K);

            let mut out = HitWriter::default();
            for (index, chunk) in ctx.corpus.chunks().iter().enumerate() {
                let text = chunk.text.to_lowercase();
                let accepted = all_of.iter().all(|t| text.contains(t.as_str()))
                    && (any_of.is_empty() || any_of.iter().any(|t| text.contains(t.as_str())))
                    && !none_of.iter().any(|t| text.contains(t.as_str()));
                if !accepted {
                    continue;
                }
                let hit_terms: Vec<&str> = all_of
                    .iter()
                    .chain(any_of.iter())
                    .filter(|t| text.contains(t.as_str()))
                    .map(String::as_str)
                    .collect();
                out.chunk(ctx, index, &format!("terms: {}", hit_terms.join(", ")), &chunk.text);
                if out.len() >= top_k {
                    break;
                }
            }
            Ok(out.finish("No chunks satisfy the filter."))
        })
    }
}
