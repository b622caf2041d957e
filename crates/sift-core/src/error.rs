#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// The reasoning or planning call failed after retries.
    #[error("reasoning call failed: {0}")]
    Reasoning(#[source] sift_llm::LlmError),

    #[error("session cancelled")]
    Cancelled,

    #[error(transparent)]
    Corpus(#[from] sift_corpus::CorpusError),

    #[error(transparent)]
    Vector(#[from] sift_corpus::VectorSearchError),
}
