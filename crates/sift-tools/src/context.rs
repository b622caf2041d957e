use std::sync::Arc;
use std::time::Duration;

use sift_corpus::{CorpusSnapshot, VectorSearch};

use crate::registry::Capabilities;

const DEFAULT_VECTOR_TIMEOUT: Duration = Duration::from_secs(30);

/// Read-only services handed to every tool call.
#[derive(Clone)]
pub struct RetrievalContext {
    pub corpus: Arc<CorpusSnapshot>,
    pub vector: Option<Arc<dyn VectorSearch>>,
    pub vector_timeout: Duration,
}

impl std::fmt::Debug for RetrievalContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetrievalContext")
            .field("corpus_version", &self.corpus.version())
            .field("vector", &self.vector.is_some())
            .field("vector_timeout", &self.vector_timeout)
            .finish()
    }
}

impl RetrievalContext {
    #[must_use]
    pub fn new(corpus: Arc<CorpusSnapshot>) -> Self {
        Self {
            corpus,
            vector: None,
            vector_timeout: DEFAULT_VECTOR_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_vector(mut self, vector: Option<Arc<dyn VectorSearch>>) -> Self {
        self.vector = vector;
        self
    }

    #[must_use]
    pub fn with_vector_timeout(mut self, timeout: Duration) -> Self {
        self.vector_timeout = timeout;
        self
    }

    #[must_use]
    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            has_semantic_groups: self.corpus.has_groups(),
            has_vector_index: self.vector.is_some(),
            has_chunks: self.corpus.has_chunks(),
        }
    }
}
