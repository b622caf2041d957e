use std::sync::Arc;

use sift_corpus::{Aggregator, Chunk, CorpusSnapshot, CorpusStore, VectorSearch};
use sift_llm::LlmProvider;
use sift_tools::{RetrievalContext, ToolRegistry};
use tokio_util::sync::CancellationToken;

use crate::agent::{ReasoningAgent, SessionOutcome};
use crate::config::Config;
use crate::error::AgentError;
use crate::events::EventSink;
use crate::planner::{MultiHopPlanner, PlannerOutcome};

/// Optional collaborators. A missing service disables what depends on it:
/// no summarizer means regex-only group enrichment, no vector index hides
/// `vector_search`.
pub struct Services<P> {
    pub summarizer: Option<Arc<P>>,
    pub vector: Option<Arc<dyn VectorSearch>>,
}

impl<P> Default for Services<P> {
    fn default() -> Self {
        Self {
            summarizer: None,
            vector: None,
        }
    }
}

impl<P> std::fmt::Debug for Services<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("summarizer", &self.summarizer.is_some())
            .field("vector", &self.vector.is_some())
            .finish()
    }
}

/// Wires the corpus store, tool registry, reasoning core and planner together.
pub struct Engine<P: LlmProvider> {
    reasoner: Arc<P>,
    services: Services<P>,
    store: CorpusStore,
    config: Config,
    registry: Arc<ToolRegistry>,
    events: EventSink,
    cancel: CancellationToken,
}

impl<P: LlmProvider> Engine<P> {
    #[must_use]
    pub fn new(reasoner: Arc<P>, services: Services<P>, config: Config) -> Self {
        let registry = ToolRegistry::retrieval().with_timeout(config.timeouts.tool());
        Self {
            reasoner,
            services,
            store: CorpusStore::default(),
            config,
            registry: Arc::new(registry),
            events: EventSink::default(),
            cancel: CancellationToken::new(),
        }
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

    #[must_use]
    pub fn with_registry(mut self, registry: ToolRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    /// Attach or replace the vector index, e.g. after embedding a new snapshot.
    pub fn set_vector(&mut self, vector: Option<Arc<dyn VectorSearch>>) {
        self.services.vector = vector;
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn snapshot(&self) -> Arc<CorpusSnapshot> {
        self.store.snapshot()
    }

    /// Aggregate `chunks` into semantic groups and publish the new corpus.
    ///
    /// Sessions already running keep the snapshot they started with.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Corpus`] if aggregation or snapshot assembly
    /// fails; the previous corpus stays current.
    pub async fn rebuild(&self, chunks: Vec<Chunk>) -> Result<Arc<CorpusSnapshot>, AgentError> {
        let aggregator = Aggregator::new(
            self.services.summarizer.clone(),
            self.config.aggregation.clone(),
        )
        .with_retry(self.config.retry)
        .with_timeout(self.config.timeouts.llm());
        let params = self.config.index;

        let snapshot = self
            .store
            .rebuild(|| async move {
                let groups = aggregator.aggregate(&chunks).await?;
                CorpusSnapshot::build(chunks, groups, params)
            })
            .await?;
        Ok(snapshot)
    }

    /// Read-only services for one session, pinned to the current snapshot.
    #[must_use]
    pub fn retrieval_context(&self) -> RetrievalContext {
        RetrievalContext::new(self.store.snapshot())
            .with_vector(self.services.vector.clone())
            .with_vector_timeout(self.config.timeouts.vector())
    }

    /// Answer `question` with the reasoning/acting loop.
    ///
    /// # Errors
    ///
    /// See [`ReasoningAgent::run`].
    pub async fn ask(&self, question: &str) -> Result<SessionOutcome, AgentError> {
        let ctx = self.retrieval_context();
        ReasoningAgent::new(Arc::clone(&self.reasoner), Arc::clone(&self.registry))
            .with_config(&self.config)
            .with_events(self.events.clone())
            .with_cancellation(self.cancel.clone())
            .run(question, &ctx)
            .await
    }

    /// Assemble answer context for `question` with the multi-hop planner.
    ///
    /// # Errors
    ///
    /// See [`MultiHopPlanner::run`].
    pub async fn plan(&self, question: &str) -> Result<PlannerOutcome, AgentError> {
        let ctx = self.retrieval_context();
        MultiHopPlanner::new(Arc::clone(&self.reasoner), Arc::clone(&self.registry))
            .with_config(&self.config)
            .with_events(self.events.clone())
            .with_cancellation(self.cancel.clone())
            .run(question, &ctx)
            .await
    }
}

#[cfg(test)]
mod tests {
    use sift_corpus::CorpusAccessor;
    use sift_llm::mock::MockProvider;

    use super::*;
    use crate::agent::Termination;

    fn chunks() -> Vec<Chunk> {
        vec![
            Chunk::new("c0", "# Filing\nAlpha Capital filed for bankruptcy in 2008.", 0),
            Chunk::new("c1", "Creditors formed a committee.", 1),
            Chunk::new("c2", "# Sale\nGamma Partners acquired the assets.", 2),
        ]
    }

    fn engine(provider: MockProvider) -> Engine<MockProvider> {
        let mut config = Config::default();
        config.retry = sift_llm::RetryPolicy::none();
        Engine::new(Arc::new(provider), Services::default(), config)
    }

    #[tokio::test]
    async fn rebuild_publishes_grouped_snapshot() {
        let engine = engine(MockProvider::default());
        assert_eq!(engine.snapshot().version(), 0);

        let snapshot = engine.rebuild(chunks()).await.unwrap();

        assert_eq!(snapshot.version(), 1);
        assert!(snapshot.has_groups());
        assert!(snapshot.chunks().iter().all(|c| c.group_id.is_some()));
        assert_eq!(engine.snapshot().version(), 1);
    }

    #[tokio::test]
    async fn sessions_keep_their_snapshot_across_rebuilds() {
        let engine = engine(MockProvider::default());
        engine.rebuild(chunks()).await.unwrap();
        let ctx = engine.retrieval_context();

        engine.rebuild(chunks()[..1].to_vec()).await.unwrap();

        assert_eq!(ctx.corpus.version(), 1);
        assert_eq!(ctx.corpus.chunks().len(), 3);
        assert_eq!(engine.snapshot().chunks().len(), 1);
    }

    #[tokio::test]
    async fn ask_uses_configured_limits() {
        let provider = MockProvider::default().with_default_response(
            r#"{"action": "use_tool", "tool": "keyword_search", "params": {"query": "bankruptcy"}}"#,
        );
        let mut engine = engine(provider);
        engine.config.agent.max_iterations = 2;
        engine.rebuild(chunks()).await.unwrap();

        let outcome = engine.ask("When did Alpha file?").await.unwrap();

        assert_eq!(outcome.termination, Termination::MaxIterations);
        assert_eq!(outcome.iterations, 2);
    }

    #[tokio::test]
    async fn plan_on_empty_plan_returns_context() {
        let engine = engine(MockProvider::with_responses(vec![
            r#"{"operations": [], "final": true}"#.into(),
        ]));
        engine.rebuild(chunks()).await.unwrap();

        let outcome = engine.plan("Who acquired the assets?").await.unwrap();

        assert!(outcome.is_fallback());
        assert!(!outcome.context.is_empty());
    }

    #[test]
    fn vector_capability_follows_services() {
        let mut engine = engine(MockProvider::default());
        assert!(!engine.retrieval_context().capabilities().has_vector_index);
        engine.set_vector(None);
        assert!(engine.retrieval_context().vector.is_none());
    }
}
