use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::join_all;
use serde::Deserialize;
use sift_llm::{ChatOptions, LlmError, LlmProvider, Message, RetryPolicy, invoke};

use crate::enrich;
use crate::error::CorpusError;
use crate::limiter::FixedGapLimiter;
use crate::structure::extract_structure;
use crate::types::{Chunk, SemanticGroup, StructureElement, build_digest};

const CHUNK_SEPARATOR: &str = "\n\n";
const DEFAULT_ENRICH_TIMEOUT: Duration = Duration::from_secs(60);
const NO_HISTORY: &[Message] = &[];

fn default_target_chars() -> usize {
    5_000
}

fn default_min_chars() -> usize {
    2_500
}

fn default_max_chars() -> usize {
    6_000
}

fn default_concurrency() -> usize {
    4
}

fn default_min_gap_ms() -> u64 {
    200
}

fn default_summary_max_chars() -> usize {
    400
}

fn default_max_keywords() -> usize {
    8
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AggregationConfig {
    /// Preferred group size; advisory.
    #[serde(default = "default_target_chars")]
    pub target_chars: usize,
    /// Soft minimum; groups below it are still emitted.
    #[serde(default = "default_min_chars")]
    pub min_chars: usize,
    /// Hard cap for groups built from more than one chunk.
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Short description of the whole document, prepended to every prompt.
    #[serde(default)]
    pub doc_context: String,
    /// Minimum spacing between enrichment task starts.
    #[serde(default = "default_min_gap_ms")]
    pub min_gap_ms: u64,
    #[serde(default = "default_summary_max_chars")]
    pub summary_max_chars: usize,
    #[serde(default = "default_max_keywords")]
    pub max_keywords: usize,
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            target_chars: default_target_chars(),
            min_chars: default_min_chars(),
            max_chars: default_max_chars(),
            concurrency: default_concurrency(),
            doc_context: String::new(),
            min_gap_ms: default_min_gap_ms(),
            summary_max_chars: default_summary_max_chars(),
            max_keywords: default_max_keywords(),
        }
    }
}

impl AggregationConfig {
    /// # Errors
    ///
    /// Returns `CorpusError::InvalidConfig` for a zero cap, zero concurrency or
    /// `min_chars > max_chars`.
    pub fn validate(&self) -> Result<(), CorpusError> {
        if self.max_chars == 0 {
            return Err(CorpusError::InvalidConfig("max_chars must be > 0".into()));
        }
        if self.concurrency == 0 {
            return Err(CorpusError::InvalidConfig("concurrency must be > 0".into()));
        }
        if self.min_chars > self.max_chars {
            return Err(CorpusError::InvalidConfig(format!(
                "min_chars ({}) exceeds max_chars ({})",
                self.min_chars, self.max_chars
            )));
        }
        Ok(())
    }
}

/// A packed, not yet enriched group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub chunk_indices: Vec<usize>,
    pub char_count: usize,
    pub text: String,
}

impl Candidate {
    fn start(index: usize, chunk: &Chunk) -> Self {
        Self {
            chunk_indices: vec![index],
            char_count: chunk.char_count,
            text: chunk.text.clone(),
        }
    }

    fn push(&mut self, index: usize, chunk: &Chunk) {
        self.chunk_indices.push(index);
        self.char_count += chunk.char_count;
        self.text.push_str(CHUNK_SEPARATOR);
        self.text.push_str(&chunk.text);
    }
}

/// Greedy left-to-right bin packing.
///
/// A chunk joins the open candidate while the combined character count stays
/// within `max_chars`; otherwise the candidate is closed and the chunk opens a
/// new one. Chunks are never reordered or split, so a single chunk longer than
/// `max_chars` becomes its own candidate.
#[must_use]
pub fn pack(chunks: &[Chunk], max_chars: usize) -> Vec<Candidate> {
    let mut out = Vec::new();
    let mut open: Option<Candidate> = None;

    for (index, chunk) in chunks.iter().enumerate() {
        match open.as_mut() {
            Some(candidate) if candidate.char_count + chunk.char_count <= max_chars => {
                candidate.push(index, chunk);
            }
            _ => {
                if let Some(done) = open.take() {
                    out.push(done);
                }
                open = Some(Candidate::start(index, chunk));
            }
        }
    }
    out.extend(open);
    out
}

/// Packs chunks into semantic groups and enriches them through an optional
/// summarization provider.
pub struct Aggregator<P> {
    summarizer: Option<Arc<P>>,
    config: AggregationConfig,
    retry: RetryPolicy,
    timeout: Duration,
}

impl<P: LlmProvider> Aggregator<P> {
    #[must_use]
    pub fn new(summarizer: Option<Arc<P>>, config: AggregationConfig) -> Self {
        Self {
            summarizer,
            config,
            retry: RetryPolicy::default(),
            timeout: DEFAULT_ENRICH_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn config(&self) -> &AggregationConfig {
        &self.config
    }

    /// Pack `chunks` and finalize every candidate with the configured
    /// concurrency.
    ///
    /// # Errors
    ///
    /// Returns `CorpusError::InvalidConfig` if the configuration is invalid.
    /// Enrichment failures never fail aggregation.
    pub async fn aggregate(&self, chunks: &[Chunk]) -> Result<Vec<SemanticGroup>, CorpusError> {
        self.config.validate()?;
        let candidates = pack(chunks, self.config.max_chars);
        tracing::info!(
            chunks = chunks.len(),
            groups = candidates.len(),
            max_chars = self.config.max_chars,
            "packed chunks into candidate groups"
        );
        Ok(self
            .finalize_all(candidates, self.config.concurrency)
            .await)
    }

    /// Finalize candidates with exactly `concurrency` workers.
    ///
    /// Workers claim candidate indices from a shared cursor and start at the
    /// pace of the pool's rate limiter. Results are placed by candidate index,
    /// so the output order never depends on completion order.
    pub async fn finalize_all(
        &self,
        candidates: Vec<Candidate>,
        concurrency: usize,
    ) -> Vec<SemanticGroup> {
        let total = candidates.len();
        let cursor = AtomicUsize::new(0);
        let limiter = FixedGapLimiter::new(Duration::from_millis(self.config.min_gap_ms));

        let (cursor, limiter, candidates) = (&cursor, &limiter, &candidates);
        let workers = (0..concurrency.max(1)).map(move |worker| async move {
            let mut done = Vec::new();
            loop {
                let index = cursor.fetch_add(1, Ordering::Relaxed);
                let Some(candidate) = candidates.get(index) else {
                    break;
                };
                limiter.acquire().await;
                tracing::debug!(worker, group = index, "finalizing group");
                done.push((index, self.finalize_group(index, candidate).await));
            }
            done
        });

        let mut slots: Vec<Option<SemanticGroup>> = (0..total).map(|_| None).collect();
        for (index, group) in join_all(workers).await.into_iter().flatten() {
            slots[index] = Some(group);
        }
        slots.into_iter().flatten().collect()
    }

    /// Enrich one candidate. Summary, keywords and structure are requested
    /// concurrently and degrade independently.
    pub async fn finalize_group(&self, index: usize, candidate: &Candidate) -> SemanticGroup {
        let (summary, keywords, structure) = match self.summarizer.as_deref() {
            Some(provider) => {
                tokio::join!(
                    self.summarize(provider, &candidate.text),
                    self.keywords(provider, &candidate.text),
                    self.structure(provider, &candidate.text),
                )
            }
            None => (
                enrich::fallback_summary(&candidate.text, self.config.summary_max_chars),
                Vec::new(),
                extract_structure(&candidate.text),
            ),
        };

        SemanticGroup {
            id: SemanticGroup::id_for(index),
            chunk_indices: candidate.chunk_indices.clone(),
            char_count: candidate.char_count,
            digest: build_digest(&summary, &structure, &candidate.text),
            summary,
            keywords,
            structure,
            full_text: candidate.text.clone(),
        }
    }

    async fn request(
        &self,
        provider: &P,
        label: &str,
        (system, user): (&'static str, String),
    ) -> Result<String, LlmError> {
        let options = ChatOptions::deterministic();
        self.retry
            .run(label, self.timeout, || {
                invoke(provider, system, NO_HISTORY, &user, &options)
            })
            .await
    }

    async fn summarize(&self, provider: &P, text: &str) -> String {
        let max = self.config.summary_max_chars;
        let prompt = enrich::summary_prompt(&self.config.doc_context, text, max);
        match self
            .request(provider, "summary", prompt)
            .await
            .and_then(|raw| enrich::parse_summary(&raw, max))
        {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!("summary enrichment failed, truncating raw text: {e}");
                enrich::fallback_summary(text, max)
            }
        }
    }

    async fn keywords(&self, provider: &P, text: &str) -> Vec<String> {
        let max = self.config.max_keywords;
        let prompt = enrich::keywords_prompt(&self.config.doc_context, text, max);
        match self.request(provider, "keywords", prompt).await {
            Ok(raw) => enrich::parse_keywords(&raw, max),
            Err(e) => {
                tracing::warn!("keyword enrichment failed: {e}");
                Vec::new()
            }
        }
    }

    async fn structure(&self, provider: &P, text: &str) -> Vec<StructureElement> {
        let prompt = enrich::structure_prompt(&self.config.doc_context, text);
        let parsed = self
            .request(provider, "structure", prompt)
            .await
            .and_then(|raw| enrich::parse_structure(&raw, text));
        match parsed {
            Ok(elements) if !elements.is_empty() => elements,
            Ok(_) => extract_structure(text),
            Err(e) => {
                tracing::warn!("structure enrichment failed, using pattern fallback: {e}");
                extract_structure(text)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use sift_llm::mock::MockProvider;

    use super::*;

    fn chunks(sizes: &[usize]) -> Vec<Chunk> {
        sizes
            .iter()
            .enumerate()
            .map(|(i, n)| Chunk::new(format!("c{i}"), "a".repeat(*n), i))
            .collect()
    }

    fn config(max_chars: usize, concurrency: usize) -> AggregationConfig {
        AggregationConfig {
            min_chars: 0,
            max_chars,
            concurrency,
            min_gap_ms: 0,
            ..AggregationConfig::default()
        }
    }

    /// Answers from the prompt content alone, with a text-dependent delay so
    /// completion order differs from submission order.
    struct EchoProvider;

    impl LlmProvider for EchoProvider {
        async fn chat(
            &self,
            messages: &[Message],
            _options: &ChatOptions,
        ) -> Result<String, LlmError> {
            let system = &messages[0].content;
            let user = &messages[messages.len() - 1].content;
            let delay = u64::try_from(user.len() % 13).unwrap_or(0);
            tokio::time::sleep(Duration::from_millis(delay)).await;
            let head: String = user.lines().last().unwrap_or("").chars().take(6).collect();
            if system.contains("summarize") {
                Ok(format!("summary of {head}"))
            } else if system.contains("keywords") {
                Ok(format!("[\"{head}\"]"))
            } else {
                Ok("[]".into())
            }
        }

        fn name(&self) -> &'static str {
            "echo"
        }
    }

    /// Fails summary requests permanently, answers everything else.
    struct NoSummaryProvider;

    impl LlmProvider for NoSummaryProvider {
        async fn chat(
            &self,
            messages: &[Message],
            _options: &ChatOptions,
        ) -> Result<String, LlmError> {
            if messages[0].content.contains("summarize") {
                return Err(LlmError::Status {
                    provider: "test",
                    status: 400,
                    message: "bad request".into(),
                });
            }
            if messages[0].content.contains("keywords") {
                return Ok(r#"["Lehman"]"#.into());
            }
            Ok(r#"[{"kind": "figure", "text": "Figure 1 Prices"}]"#.into())
        }

        fn name(&self) -> &'static str {
            "no-summary"
        }
    }

    #[test]
    fn ten_chunks_pack_into_four_groups() {
        let candidates = pack(&chunks(&[1_000; 10]), 3_000);
        let sizes: Vec<_> = candidates.iter().map(|c| c.char_count).collect();
        assert_eq!(sizes, vec![3_000, 3_000, 3_000, 1_000]);
        assert_eq!(candidates[0].chunk_indices, vec![0, 1, 2]);
        assert_eq!(candidates[3].chunk_indices, vec![9]);
    }

    #[test]
    fn oversized_chunk_stands_alone() {
        let candidates = pack(&chunks(&[100, 5_000, 100]), 1_000);
        let groups: Vec<_> = candidates.iter().map(|c| c.chunk_indices.clone()).collect();
        assert_eq!(groups, vec![vec![0], vec![1], vec![2]]);
    }

    #[test]
    fn min_chars_is_not_enforced() {
        let candidates = pack(&chunks(&[900, 900, 50]), 1_000);
        assert_eq!(candidates.len(), 3);
        assert_eq!(candidates[2].char_count, 50);
    }

    #[test]
    fn empty_input_packs_nothing() {
        assert!(pack(&[], 1_000).is_empty());
    }

    #[test]
    fn validate_rejects_bad_config() {
        assert!(config(0, 1).validate().is_err());
        assert!(config(100, 0).validate().is_err());
        let inverted = AggregationConfig {
            min_chars: 500,
            max_chars: 100,
            ..AggregationConfig::default()
        };
        assert!(inverted.validate().is_err());
        assert!(AggregationConfig::default().validate().is_ok());
    }

    #[tokio::test]
    async fn aggregate_without_summarizer_degrades_every_field() {
        let aggregator = Aggregator::<MockProvider>::new(None, config(3_000, 2));
        let groups = aggregator.aggregate(&chunks(&[1_000; 10])).await.unwrap();
        assert_eq!(groups.len(), 4);
        assert_eq!(groups[0].id, "group-1");
        assert_eq!(groups[3].id, "group-4");
        assert!(groups.iter().all(|g| g.keywords.is_empty()));
        assert_eq!(groups[0].summary.chars().count(), 400);
        assert_eq!(groups[3].char_count, 1_000);
    }

    #[tokio::test(start_paused = true)]
    async fn finalization_is_independent_of_concurrency() {
        let input: Vec<Chunk> = (0..12)
            .map(|i| Chunk::new(format!("c{i}"), format!("chunk {i} {}", "x".repeat(i * 7)), i))
            .collect();
        let provider = Arc::new(EchoProvider);

        let serial = Aggregator::new(Some(Arc::clone(&provider)), config(60, 1))
            .aggregate(&input)
            .await
            .unwrap();
        let parallel = Aggregator::new(Some(provider), config(60, 5))
            .aggregate(&input)
            .await
            .unwrap();

        assert!(serial.len() > 1);
        assert_eq!(serial, parallel);
        assert!(serial[0].summary.starts_with("summary of"));
    }

    #[tokio::test]
    async fn fields_degrade_independently() {
        let aggregator = Aggregator::new(Some(Arc::new(NoSummaryProvider)), config(10_000, 1));
        let input = vec![Chunk::new("c0", "Intro text.\nFigure 1 Prices\nMore text.", 0)];
        let groups = aggregator.aggregate(&input).await.unwrap();
        let group = &groups[0];
        assert_eq!(group.summary, "Intro text. Figure 1 Prices More text.");
        assert_eq!(group.keywords, vec!["Lehman"]);
        assert_eq!(group.structure.len(), 1);
        assert_eq!(group.structure[0].text, "Figure 1 Prices");
    }

    #[tokio::test]
    async fn permanent_failure_is_not_retried() {
        let provider = Arc::new(MockProvider::failing());
        let aggregator = Aggregator::new(Some(Arc::clone(&provider)), config(10_000, 1));
        let input = vec![Chunk::new("c0", "Table 3 Losses\nbody", 0)];
        let groups = aggregator.aggregate(&input).await.unwrap();
        assert_eq!(provider.call_count(), 3);
        assert!(groups[0].keywords.is_empty());
        assert_eq!(groups[0].structure[0].text, "Table 3 Losses");
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failure_is_retried() {
        let provider = Arc::new(MockProvider::default().with_transient_failures(1));
        let aggregator = Aggregator::new(Some(Arc::clone(&provider)), config(10_000, 1));
        let groups = aggregator
            .aggregate(&[Chunk::new("c0", "body", 0)])
            .await
            .unwrap();
        assert_eq!(provider.call_count(), 4);
        assert_eq!(groups[0].summary, "mock response");
    }

    #[tokio::test(start_paused = true)]
    async fn slow_summarizer_times_out_into_fallback() {
        let provider = Arc::new(MockProvider::default().with_delay(10_000));
        let aggregator = Aggregator::new(Some(provider), config(10_000, 1))
            .with_timeout(Duration::from_secs(1))
            .with_retry(RetryPolicy::none());
        let groups = aggregator
            .aggregate(&[Chunk::new("c0", "raw body text", 0)])
            .await
            .unwrap();
        assert_eq!(groups[0].summary, "raw body text");
    }

    proptest! {
        #[test]
        fn packing_covers_every_chunk_once(
            sizes in proptest::collection::vec(1usize..500, 0..60),
            max_chars in 500usize..3_000,
        ) {
            let candidates = pack(&chunks(&sizes), max_chars);
            let flat: Vec<usize> = candidates.iter().flat_map(|c| c.chunk_indices.clone()).collect();
            prop_assert_eq!(flat, (0..sizes.len()).collect::<Vec<_>>());
            for c in &candidates {
                prop_assert!(c.char_count <= max_chars);
                prop_assert_eq!(c.char_count, c.chunk_indices.iter().map(|i| sizes[*i]).sum::<usize>());
            }
        }

        #[test]
        fn multi_chunk_groups_respect_cap(
            sizes in proptest::collection::vec(1usize..4_000, 1..40),
            max_chars in 100usize..3_000,
        ) {
            for c in pack(&chunks(&sizes), max_chars) {
                if c.chunk_indices.len() > 1 {
                    prop_assert!(c.char_count <= max_chars);
                }
            }
        }
    }
}
