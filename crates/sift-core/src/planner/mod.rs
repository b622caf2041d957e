//! Bounded multi-round retrieval planning over the semantic group map.
//!
//! Each round asks the model for a [`RetrievalPlan`], runs its operations in
//! declared order and appends their text to a provenance-tagged context. Any
//! dead end (undecodable plan, empty plan, failed planning call, empty
//! context) degrades into a heuristic fallback, so a run always yields context
//! whenever the corpus has any.

mod plan;
mod prompt;

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use sift_corpus::{CorpusAccessor, Granularity, quick_match};
use sift_llm::{ChatOptions, LlmProvider, RetryPolicy, invoke};
use sift_tools::{RetrievalContext, ToolRegistry};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

pub use plan::{
    MAX_OPERATIONS_PER_ROUND, Operation, ParsedPlan, PlanParseError, RetrievalPlan, parse_plan,
};
pub use prompt::PLANNER_SYSTEM_PROMPT;

use crate::budget::{ContextEntry, render_context};
use crate::config::Config;
use crate::error::AgentError;
use crate::events::{EventSink, PlannerPhase, SessionEvent};
use prompt::{PlanPromptInput, build_plan_prompt};

const DEFAULT_MAX_ROUNDS: usize = 3;
const DEFAULT_FALLBACK_GROUPS: usize = 3;
const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(120);

/// Why the heuristic fallback ran.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackReason {
    PlanRejected,
    EmptyPlan,
    PlanningFailed,
    EmptyContext,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlannerOutcome {
    pub context: Vec<ContextEntry>,
    pub sources: Vec<String>,
    /// Planning rounds started.
    pub rounds: usize,
    /// Set when fallback entries were appended.
    pub fallback: Option<FallbackReason>,
    pub fetched_groups: Vec<String>,
}

impl PlannerOutcome {
    #[must_use]
    pub fn rendered_context(&self) -> String {
        render_context(&self.context)
    }

    #[must_use]
    pub fn is_fallback(&self) -> bool {
        self.fallback.is_some()
    }
}

/// Mutable state of one planner run.
#[derive(Debug, Default)]
struct PlannerRun {
    entries: Vec<ContextEntry>,
    fetched: BTreeSet<String>,
}

impl PlannerRun {
    fn push(&mut self, entry: ContextEntry) {
        self.entries.push(entry);
    }

    fn into_outcome(self, rounds: usize, fallback: Option<FallbackReason>) -> PlannerOutcome {
        let mut sources: Vec<String> = Vec::new();
        for source in self.entries.iter().flat_map(|e| &e.sources) {
            if !sources.contains(source) {
                sources.push(source.clone());
            }
        }
        PlannerOutcome {
            context: self.entries,
            sources,
            rounds,
            fallback,
            fetched_groups: self.fetched.into_iter().collect(),
        }
    }
}

pub struct MultiHopPlanner<P: LlmProvider> {
    provider: Arc<P>,
    registry: Arc<ToolRegistry>,
    max_rounds: usize,
    fallback_groups: usize,
    llm_timeout: Duration,
    retry: RetryPolicy,
    options: ChatOptions,
    events: EventSink,
    cancel: CancellationToken,
}

impl<P: LlmProvider> MultiHopPlanner<P> {
    #[must_use]
    pub fn new(provider: Arc<P>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            provider,
            registry,
            max_rounds: DEFAULT_MAX_ROUNDS,
            fallback_groups: DEFAULT_FALLBACK_GROUPS,
            llm_timeout: DEFAULT_LLM_TIMEOUT,
            retry: RetryPolicy::default(),
            options: ChatOptions::deterministic(),
            events: EventSink::default(),
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn with_config(self, config: &Config) -> Self {
        self.with_max_rounds(config.planner.max_rounds)
            .with_fallback_groups(config.planner.fallback_groups)
            .with_llm_timeout(config.timeouts.llm())
            .with_retry(config.retry)
    }

    #[must_use]
    pub fn with_max_rounds(mut self, max_rounds: usize) -> Self {
        self.max_rounds = max_rounds;
        self
    }

    #[must_use]
    pub fn with_fallback_groups(mut self, count: usize) -> Self {
        self.fallback_groups = count;
        self
    }

    #[must_use]
    pub fn with_llm_timeout(mut self, timeout: Duration) -> Self {
        self.llm_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Assemble answer context for `question`.
    ///
    /// # Errors
    ///
    /// Only [`AgentError::Cancelled`]; every other failure falls back.
    pub async fn run(
        &self,
        question: &str,
        ctx: &RetrievalContext,
    ) -> Result<PlannerOutcome, AgentError> {
        let span = tracing::info_span!(
            "planner",
            max_rounds = self.max_rounds,
            corpus_version = ctx.corpus.version()
        );
        self.run_rounds(question, ctx).instrument(span).await
    }

    async fn run_rounds(
        &self,
        question: &str,
        ctx: &RetrievalContext,
    ) -> Result<PlannerOutcome, AgentError> {
        self.phase(PlannerPhase::Analyze);
        let mut run = PlannerRun::default();
        if !ctx.corpus.has_chunks() || question.trim().is_empty() {
            tracing::info!("nothing to plan over");
            self.phase(PlannerPhase::Complete);
            return Ok(run.into_outcome(0, None));
        }

        let group_map = ctx.corpus.group_map();
        let capabilities = ctx.capabilities();
        let mut rounds = 0;
        let mut fallback = None;

        for round in 1..=self.max_rounds {
            self.check_cancelled()?;
            rounds = round;
            self.phase(PlannerPhase::Round(round));

            let context = render_context(&run.entries);
            let prompt = build_plan_prompt(&PlanPromptInput {
                question,
                group_map: &group_map,
                capabilities: &capabilities,
                fetched: &run.fetched,
                context: &context,
                round,
                max_rounds: self.max_rounds,
            });

            let response = match self.plan_call(&prompt).await {
                Ok(response) => response,
                Err(AgentError::Cancelled) => return Err(self.cancelled()),
                Err(e) => {
                    tracing::error!(round, "planning call failed: {e}");
                    self.events.emit(SessionEvent::SessionError {
                        message: e.to_string(),
                    });
                    fallback = Some(FallbackReason::PlanningFailed);
                    break;
                }
            };

            let parsed = match parse_plan(&response) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!(round, "plan rejected: {e}");
                    self.events.emit(SessionEvent::PlanRejected {
                        round,
                        error: e.to_string(),
                    });
                    fallback = Some(FallbackReason::PlanRejected);
                    break;
                }
            };
            let plan = parsed.plan;
            self.events.emit(SessionEvent::PlanReceived {
                round,
                operations: plan.operations.len(),
                is_final: plan.is_final,
                repaired: parsed.repaired,
            });

            if plan.operations.is_empty() {
                tracing::info!(round, "planner returned no operations");
                fallback = Some(FallbackReason::EmptyPlan);
                break;
            }
            self.execute_round(ctx, round, &plan.operations, &mut run)
                .await?;
            if plan.is_final {
                break;
            }
        }

        if fallback.is_none() && run.entries.is_empty() {
            fallback = Some(FallbackReason::EmptyContext);
        }
        if let Some(reason) = fallback {
            tracing::info!(?reason, rounds, "using fallback retrieval");
            self.phase(PlannerPhase::Fallback);
            self.fallback(question, ctx, &mut run);
        } else {
            self.phase(PlannerPhase::Complete);
        }
        Ok(run.into_outcome(rounds, fallback))
    }

    /// Run operations sequentially in declared order.
    async fn execute_round(
        &self,
        ctx: &RetrievalContext,
        round: usize,
        operations: &[Operation],
        run: &mut PlannerRun,
    ) -> Result<(), AgentError> {
        for op in operations {
            self.check_cancelled()?;
            let description = op.describe();

            let skip = match op {
                Operation::VectorSearch { .. } if ctx.vector.is_none() => {
                    Some("vector index not configured")
                }
                Operation::FetchGroup { group_id, .. } if run.fetched.contains(group_id) => {
                    Some("group already fetched")
                }
                _ => None,
            };
            if let Some(reason) = skip {
                tracing::debug!(round, operation = %description, reason, "skipping operation");
                self.events.emit(SessionEvent::OperationSkipped {
                    round,
                    operation: description,
                    reason: reason.to_owned(),
                });
                continue;
            }

            let call = op.to_call();
            let result = tokio::select! {
                r = self.registry.execute(ctx, &call) => r,
                () = self.cancel.cancelled() => return Err(self.cancelled()),
            };
            self.events.emit(SessionEvent::OperationExecuted {
                round,
                operation: description.clone(),
                success: result.success,
            });

            let Some(data) = result.data.filter(|_| result.success) else {
                tracing::warn!(
                    round,
                    operation = %description,
                    error = result.error.as_deref().unwrap_or_default(),
                    "operation failed"
                );
                continue;
            };
            if let Operation::FetchGroup { group_id, .. } = op {
                run.fetched.insert(group_id.clone());
            }
            if data.result_count > 0 {
                run.push(ContextEntry::new(
                    format!("round {round}: {description}"),
                    data.text,
                    data.sources,
                ));
            }
        }
        Ok(())
    }

    async fn plan_call(&self, prompt: &str) -> Result<String, AgentError> {
        let provider = self.provider.as_ref();
        let options = &self.options;
        let call = self.retry.run("planning", self.llm_timeout, || {
            invoke(provider, PLANNER_SYSTEM_PROMPT, &[], prompt, options)
        });
        tokio::select! {
            r = call => r.map_err(AgentError::Reasoning),
            () = self.cancel.cancelled() => Err(AgentError::Cancelled),
        }
    }

    /// Heuristic retrieval: best `quick_match` groups (or the leading groups)
    /// at digest granularity. Chunk-only corpora use BM25 over chunks.
    fn fallback(&self, question: &str, ctx: &RetrievalContext, run: &mut PlannerRun) {
        let corpus = &ctx.corpus;
        let groups = corpus.groups();

        if groups.is_empty() {
            for hit in corpus
                .chunk_index()
                .search(question, self.fallback_groups, 0.0)
            {
                let Some(chunk) = corpus.chunks().get(hit.index) else {
                    continue;
                };
                run.push(ContextEntry::new(
                    format!("fallback: chunk {}", chunk.id),
                    format!("[chunk {} | score {:.2}]\n{}", chunk.id, hit.score, chunk.text),
                    vec![format!("chunk:{}", chunk.id)],
                ));
            }
            if run.entries.is_empty() {
                for chunk in corpus.chunks().iter().take(self.fallback_groups) {
                    run.push(ContextEntry::new(
                        format!("fallback: chunk {}", chunk.id),
                        format!("[chunk {}]\n{}", chunk.id, chunk.text),
                        vec![format!("chunk:{}", chunk.id)],
                    ));
                }
            }
            return;
        }

        let matches = quick_match(question, groups);
        let picked: Vec<usize> = if matches.is_empty() {
            (0..groups.len()).take(self.fallback_groups).collect()
        } else {
            matches
                .iter()
                .map(|m| m.index)
                .take(self.fallback_groups)
                .collect()
        };

        for index in picked {
            let group = &groups[index];
            if !run.fetched.insert(group.id.clone()) {
                continue;
            }
            let keywords = if group.keywords.is_empty() {
                String::new()
            } else {
                format!(" | keywords: {}", group.keywords.join(", "))
            };
            run.push(ContextEntry::new(
                format!("fallback: {}", group.id),
                format!(
                    "[{} | {}{keywords}]\n{}",
                    group.id,
                    Granularity::Digest.as_str(),
                    group.text(Granularity::Digest)
                ),
                vec![format!("group:{}", group.id)],
            ));
        }
    }

    fn phase(&self, phase: PlannerPhase) {
        self.events.emit(SessionEvent::PlannerPhase { phase });
    }

    fn check_cancelled(&self) -> Result<(), AgentError> {
        if self.cancel.is_cancelled() {
            return Err(self.cancelled());
        }
        Ok(())
    }

    fn cancelled(&self) -> AgentError {
        tracing::info!("planner cancelled");
        self.events.emit(SessionEvent::SessionError {
            message: AgentError::Cancelled.to_string(),
        });
        AgentError::Cancelled
    }
}
