use std::fmt::Write as _;

use futures::future::BoxFuture;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sift_corpus::types::truncate_chars;
use sift_corpus::{CorpusAccessor, VectorCorpus, VectorSearchOptions};

use crate::context::RetrievalContext;
use crate::executor::{Tool, ToolData, ToolError, deserialize_params};
use crate::registry::{Capabilities, ToolDef};

pub(crate) const DEFAULT_TOP_K: usize = 5;
pub(crate) const MAX_TOP_K: usize = 50;
/// Per-hit text cap inside a tool result.
pub(crate) const HIT_TEXT_CHARS: usize = 1_500;

pub(crate) fn clamp_top_k(top_k: Option<usize>, default: usize) -> usize {
    top_k.unwrap_or(default).clamp(1, MAX_TOP_K)
}

/// Which unit of the corpus a search ranks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SearchTarget {
    #[default]
    Chunks,
    Groups,
}

impl From<SearchTarget> for VectorCorpus {
    fn from(target: SearchTarget) -> Self {
        match target {
            SearchTarget::Chunks => Self::Chunks,
            SearchTarget::Groups => Self::Groups,
        }
    }
}

/// Accumulates hits into the text and provenance of one [`ToolData`].
#[derive(Default)]
pub(crate) struct HitWriter {
    text: String,
    sources: Vec<String>,
}

impl HitWriter {
    pub(crate) fn chunk(&mut self, ctx: &RetrievalContext, index: usize, detail: &str, body: &str) {
        let corpus = &ctx.corpus;
        let Some(chunk) = corpus.chunks().get(index) else {
            return;
        };
        let group = corpus
            .group_of_chunk(index)
            .map(|g| format!(" | {g}"))
            .unwrap_or_default();
        self.push(
            format!("chunk:{}", chunk.id),
            &format!("[chunk {}{group} | {detail}]", chunk.id),
            body,
        );
    }

    pub(crate) fn group(&mut self, id: &str, detail: &str, body: &str) {
        self.push(format!("group:{id}"), &format!("[{id} | {detail}]"), body);
    }

    fn push(&mut self, source: String, header: &str, body: &str) {
        if !self.text.is_empty() {
            self.text.push_str("\n\n");
        }
        let _ = write!(self.text, "{header}\n{}", truncate_chars(body, HIT_TEXT_CHARS));
        self.sources.push(source);
    }

    pub(crate) fn len(&self) -> usize {
        self.sources.len()
    }

    pub(crate) fn finish(self, empty_message: &str) -> ToolData {
        let result_count = self.sources.len();
        let text = if result_count == 0 {
            empty_message.to_owned()
        } else {
            self.text
        };
        ToolData {
            text,
            result_count,
            sources: self.sources,
        }
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct KeywordSearchParams {
    /// Free-text query ranked with BM25
    #[serde(default)]
    query: Option<String>,
    /// Exact terms; each verbatim occurrence boosts a result
    #[serde(default)]
    keywords: Vec<String>,
    /// Rank `chunks` or semantic `groups`
    #[serde(default)]
    target: SearchTarget,
    /// Maximum number of results (default 5)
    top_k: Option<usize>,
}

/// BM25 lexical search over chunks or semantic groups.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordSearchTool;

impl Tool for KeywordSearchTool {
    fn definition(&self) -> ToolDef {
        ToolDef {
            id: "keyword_search",
            description: "Lexical BM25 search. Give a free-text `query`, exact `keywords`, or both. \
                          Best for names, numbers and exact terminology.",
            schema: schemars::schema_for!(KeywordSearchParams),
            availability: |c: &Capabilities| c.has_chunks || c.has_semantic_groups,
        }
    }

    fn execute<'a>(
        &'a self,
        ctx: &'a RetrievalContext,
        params: &'a Map<String, Value>,
    ) -> BoxFuture<'a, Result<ToolData, ToolError>> {
        Box::pin(async move {
            let p: KeywordSearchParams = deserialize_params(params)?;
            let query = p.query.as_deref().map(str::trim).unwrap_or_default();
            if query.is_empty() && p.keywords.iter().all(|k| k.trim().is_empty()) {
                return Err(ToolError::InvalidParams {
                    message: "either `query` or `keywords` is required".into(),
                });
            }
            let top_k = clamp_top_k(p.top_k, DEFAULT_TOP_K);

            let corpus = &ctx.corpus;
            let index = match p.target {
                SearchTarget::Chunks => corpus.chunk_index(),
                SearchTarget::Groups => {
                    if !corpus.has_groups() {
                        return Err(ToolError::Unavailable(
                            "document has no semantic groups".into(),
                        ));
                    }
                    corpus.group_index()
                }
            };

            let mut terms: Vec<&str> = p.keywords.iter().map(String::as_str).collect();
            if !query.is_empty() {
                terms.push(query);
            }
            let hits = if p.keywords.is_empty() {
                index.search(query, top_k, 0.0)
            } else {
                index.search_keywords(&terms, top_k, 0.0)
            };
            tracing::debug!(hits = hits.len(), target = ?p.target, "keyword search");

            let mut out = HitWriter::default();
            for hit in &hits {
                let detail = format!("score {:.2}", hit.score);
                match p.target {
                    SearchTarget::Chunks => {
                        if let Some(chunk) = corpus.chunks().get(hit.index) {
                            out.chunk(ctx, hit.index, &detail, &chunk.text);
                        }
                    }
                    SearchTarget::Groups => {
                        if let Some(group) = corpus.groups().get(hit.index) {
                            out.group(&group.id, &detail, &group.digest);
                        }
                    }
                }
            }
            Ok(out.finish("No matches."))
        })
    }
}

#[derive(Debug, Deserialize, JsonSchema)]
struct VectorSearchParams {
    /// Natural-language description of the information needed
    query: String,
    /// Rank `chunks` or semantic `groups`
    #[serde(default)]
    target: SearchTarget,
    /// Maximum number of results (default 5)
    top_k: Option<usize>,
    /// Minimum cosine similarity for a hit
    threshold: Option<f32>,
}

/// Semantic search through the configured vector index.
#[derive(Debug, Clone, Copy, Default)]
pub struct VectorSearchTool;

impl Tool for VectorSearchTool {
    fn definition(&self) -> ToolDef {
        ToolDef {
            id: "vector_search",
            description: "Semantic similarity search. Use for paraphrased or conceptual questions \
                          where exact wording is unknown.",
            schema: schemars::schema_for!(VectorSearchParams),
            availability: |c: &Capabilities| c.has_vector_index,
        }
    }

    fn execute<'a>(
        &'a self,
        ctx: &'a RetrievalContext,
        params: &'a Map<String, Value>,
    ) -> BoxFuture<'a, Result<ToolData, ToolError>> {
        Box::pin(async move {
            let p: VectorSearchParams = deserialize_params(params)?;
            if p.query.trim().is_empty() {
                return Err(ToolError::InvalidParams {
                    message: "`query` must not be empty".into(),
                });
            }
            let Some(vector) = ctx.vector.as_ref() else {
                return Err(ToolError::Unavailable("no vector index configured".into()));
            };
            let options = VectorSearchOptions {
                top_k: clamp_top_k(p.top_k, DEFAULT_TOP_K),
                threshold: p.threshold.unwrap_or(0.0),
            };

            let hits = tokio::time::timeout(
                ctx.vector_timeout,
                vector.search(&p.query, p.target.into(), options),
            )
            .await
            .map_err(|_| ToolError::Timeout {
                timeout_secs: ctx.vector_timeout.as_secs(),
            })??;
            tracing::debug!(hits = hits.len(), target = ?p.target, "vector search");

            let mut out = HitWriter::default();
            for hit in &hits {
                let detail = format!("similarity {:.3}", hit.score);
                match p.target {
                    SearchTarget::Chunks => {
                        let position = ctx.corpus.chunks().iter().position(|c| c.id == hit.id);
                        match position {
                            Some(index) => out.chunk(ctx, index, &detail, &hit.text),
                            None => out.push(
                                format!("chunk:{}", hit.id),
                                &format!("[chunk {} | {detail}]", hit.id),
                                &hit.text,
                            ),
                        }
                    }
                    SearchTarget::Groups => out.group(&hit.id, &detail, &hit.text),
                }
            }
            Ok(out.finish("No semantically similar passages."))
        })
    }
}
