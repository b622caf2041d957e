//! Iterative reason-then-act loop over the retrieval tools.

mod decision;
mod prompt;
mod state;
mod warnings;

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use sift_llm::{ChatOptions, LlmProvider, RetryPolicy, invoke};
use sift_tools::{RetrievalContext, ToolCall, ToolRegistry};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

pub use decision::{Decision, DecisionError, ParsedDecision, parse_decision};
pub use prompt::SYSTEM_PROMPT;
pub use state::{AgentState, StepRecord};
pub use warnings::{Sufficiency, Warning};

use crate::budget::{BudgetManager, ContextEntry, render_context};
use crate::config::Config;
use crate::error::AgentError;
use crate::events::{EventSink, SessionEvent};
use prompt::{PromptInput, build_user_prompt};

const DEFAULT_MAX_ITERATIONS: usize = 8;
const DEFAULT_BUDGET_TOKENS: usize = 6_000;
const DEFAULT_HISTORY_WINDOW: usize = 6;
const DEFAULT_LLM_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The model produced an answer.
    Answered,
    /// The iteration limit was hit and a fallback answer was synthesized.
    MaxIterations,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionOutcome {
    pub answer: String,
    pub termination: Termination,
    /// Reasoning calls made.
    pub iterations: usize,
    pub context: Vec<ContextEntry>,
    pub sources: Vec<String>,
    pub tool_calls: usize,
}

impl SessionOutcome {
    fn from_state(answer: String, termination: Termination, iterations: usize, state: AgentState) -> Self {
        let sources = state.sources();
        let tool_calls = state.tool_call_count();
        Self {
            answer,
            termination,
            iterations,
            context: state.entries,
            sources,
            tool_calls,
        }
    }

    #[must_use]
    pub fn rendered_context(&self) -> String {
        render_context(&self.context)
    }
}

pub struct ReasoningAgent<P: LlmProvider> {
    provider: Arc<P>,
    registry: Arc<ToolRegistry>,
    max_iterations: usize,
    budget: BudgetManager,
    history_window: usize,
    llm_timeout: Duration,
    retry: RetryPolicy,
    options: ChatOptions,
    events: EventSink,
    cancel: CancellationToken,
}

impl<P: LlmProvider> ReasoningAgent<P> {
    #[must_use]
    pub fn new(provider: Arc<P>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            provider,
            registry,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            budget: BudgetManager::new(DEFAULT_BUDGET_TOKENS),
            history_window: DEFAULT_HISTORY_WINDOW,
            llm_timeout: DEFAULT_LLM_TIMEOUT,
            retry: RetryPolicy::default(),
            options: ChatOptions::default(),
            events: EventSink::default(),
            cancel: CancellationToken::new(),
        }
    }

    /// Apply the `[agent]`, `[llm]`, `[timeouts]` and `[retry]` settings.
    #[must_use]
    pub fn with_config(self, config: &Config) -> Self {
        self.with_max_iterations(config.agent.max_iterations)
            .with_budget_tokens(config.agent.context_budget_tokens)
            .with_history_window(config.agent.history_window)
            .with_llm_timeout(config.timeouts.llm())
            .with_retry(config.retry)
            .with_options(ChatOptions {
                temperature: Some(config.llm.temperature),
                max_tokens: Some(config.llm.max_tokens),
            })
    }

    #[must_use]
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    #[must_use]
    pub fn with_budget_tokens(mut self, tokens: usize) -> Self {
        self.budget = BudgetManager::new(tokens);
        self
    }

    #[must_use]
    pub fn with_history_window(mut self, window: usize) -> Self {
        self.history_window = window;
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
    pub fn with_options(mut self, options: ChatOptions) -> Self {
        self.options = options;
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

    /// Run one question to completion.
    ///
    /// Always ends with an answer unless the reasoning call itself fails after
    /// retries or the session is cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Reasoning`] when the model cannot be reached and
    /// [`AgentError::Cancelled`] when the cancellation token fires.
    pub async fn run(
        &self,
        question: &str,
        ctx: &RetrievalContext,
    ) -> Result<SessionOutcome, AgentError> {
        let span = tracing::info_span!(
            "agent_session",
            max_iterations = self.max_iterations,
            corpus_version = ctx.corpus.version()
        );
        self.run_session(question, ctx).instrument(span).await
    }

    async fn run_session(
        &self,
        question: &str,
        ctx: &RetrievalContext,
    ) -> Result<SessionOutcome, AgentError> {
        self.events.emit(SessionEvent::SessionStarted {
            question: question.to_owned(),
            max_iterations: self.max_iterations,
        });
        let catalog = self.registry.format_for_prompt(&ctx.capabilities());
        let mut state = AgentState::default();

        for iteration in 1..=self.max_iterations {
            self.check_cancelled()?;
            state.iteration = iteration;
            self.events.emit(SessionEvent::IterationStarted { iteration });
            self.prune(&mut state);

            let warnings = warnings::collect(&state, self.max_iterations);
            let prompt = build_user_prompt(&PromptInput {
                question,
                state: &state,
                warnings: &warnings,
                tool_catalog: &catalog,
                history_window: self.history_window,
                max_iterations: self.max_iterations,
            });

            self.events.emit(SessionEvent::ReasoningStarted { iteration });
            let response = self.reason(&prompt).await?;

            let parsed = match parse_decision(&response) {
                Ok(parsed) => parsed,
                Err(e) => {
                    tracing::warn!(iteration, "rejected reasoning output: {e}");
                    self.events.emit(SessionEvent::DecisionRejected {
                        iteration,
                        error: e.to_string(),
                    });
                    state.record_invalid(iteration, e.to_string());
                    continue;
                }
            };
            if parsed.repaired {
                tracing::debug!(iteration, "decision decoded after JSON repair");
            }

            match parsed.decision {
                Decision::Answer { answer } => {
                    tracing::info!(iteration, tool_calls = state.tool_call_count(), "answered");
                    self.events.emit(SessionEvent::FinalAnswer {
                        iterations: iteration,
                        fallback: false,
                    });
                    return Ok(SessionOutcome::from_state(
                        answer,
                        Termination::Answered,
                        iteration,
                        state,
                    ));
                }
                Decision::UseTool(call) => self.act(ctx, iteration, vec![call], &mut state).await?,
                Decision::Parallel(calls) => self.act(ctx, iteration, calls, &mut state).await?,
            }
        }

        self.prune(&mut state);
        tracing::warn!(
            max_iterations = self.max_iterations,
            tool_calls = state.tool_call_count(),
            "iteration limit reached, synthesizing fallback answer"
        );
        let answer = fallback_answer(self.max_iterations, &state.context());
        self.events.emit(SessionEvent::FinalAnswer {
            iterations: self.max_iterations,
            fallback: true,
        });
        Ok(SessionOutcome::from_state(
            answer,
            Termination::MaxIterations,
            self.max_iterations,
            state,
        ))
    }

    fn check_cancelled(&self) -> Result<(), AgentError> {
        if self.cancel.is_cancelled() {
            return Err(self.cancelled());
        }
        Ok(())
    }

    fn cancelled(&self) -> AgentError {
        tracing::info!("session cancelled");
        self.events.emit(SessionEvent::SessionError {
            message: AgentError::Cancelled.to_string(),
        });
        AgentError::Cancelled
    }

    fn prune(&self, state: &mut AgentState) {
        if let Some(report) = self.budget.prune(&mut state.entries) {
            self.events.emit(SessionEvent::ContextPruned {
                removed_entries: report.removed_entries,
                truncated: report.truncated,
                tokens_before: report.tokens_before,
                tokens_after: report.tokens_after,
            });
        }
    }

    async fn reason(&self, prompt: &str) -> Result<String, AgentError> {
        let provider = self.provider.as_ref();
        let options = &self.options;
        let call = self.retry.run("reasoning", self.llm_timeout, || {
            invoke(provider, SYSTEM_PROMPT, &[], prompt, options)
        });
        let result = tokio::select! {
            r = call => r,
            () = self.cancel.cancelled() => return Err(self.cancelled()),
        };
        result.map_err(|e| {
            tracing::error!(provider = self.provider.name(), "reasoning call failed: {e}");
            self.events.emit(SessionEvent::SessionError {
                message: e.to_string(),
            });
            AgentError::Reasoning(e)
        })
    }

    /// Dispatch a batch concurrently and record results in declared order.
    async fn act(
        &self,
        ctx: &RetrievalContext,
        iteration: usize,
        calls: Vec<ToolCall>,
        state: &mut AgentState,
    ) -> Result<(), AgentError> {
        for call in &calls {
            self.events.emit(SessionEvent::ToolCallStarted {
                iteration,
                tool: call.tool_id.clone(),
            });
        }
        let batch = join_all(calls.iter().map(|call| self.registry.execute(ctx, call)));
        let results = tokio::select! {
            r = batch => r,
            () = self.cancel.cancelled() => return Err(self.cancelled()),
        };

        for (call, result) in calls.into_iter().zip(results) {
            self.events.emit(SessionEvent::ToolCallFinished {
                iteration,
                tool: call.tool_id.clone(),
                success: result.success,
                result_count: result.result_count(),
            });
            state.record_tool(iteration, call, result);
        }
        Ok(())
    }
}

fn fallback_answer(max_iterations: usize, context: &str) -> String {
    if context.is_empty() {
        format!(
            "No answer was reached within {max_iterations} reasoning steps and nothing relevant \
             was retrieved from the document."
        )
    } else {
        format!(
            "No final answer was reached within {max_iterations} reasoning steps. The most \
             relevant retrieved context follows.\n\n{context}"
        )
    }
}

#[cfg(test)]
mod tests;
