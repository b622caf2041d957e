use std::sync::Arc;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use sift_llm::{LlmError, LlmProvider};

use crate::store::{CorpusAccessor, CorpusSnapshot};

#[derive(Debug, thiserror::Error)]
pub enum VectorSearchError {
    #[error("embedding failed: {0}")]
    Embedding(#[from] LlmError),
    #[error("embedding dimension mismatch: index has {expected}, query has {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
    #[error("vector index unavailable: {0}")]
    Unavailable(String),
}

/// Which unit of the corpus a vector search ranks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum VectorCorpus {
    #[default]
    Chunks,
    Groups,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorSearchOptions {
    pub top_k: usize,
    /// Minimum similarity for a hit to be returned.
    pub threshold: f32,
}

impl Default for VectorSearchOptions {
    fn default() -> Self {
        Self {
            top_k: 5,
            threshold: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VectorHit {
    pub id: String,
    pub score: f32,
    pub text: String,
    pub group_id: Option<String>,
}

/// Externally provided semantic search over the corpus.
pub trait VectorSearch: Send + Sync {
    fn search<'a>(
        &'a self,
        query: &'a str,
        corpus: VectorCorpus,
        options: VectorSearchOptions,
    ) -> BoxFuture<'a, Result<Vec<VectorHit>, VectorSearchError>>;
}

struct Entry {
    corpus: VectorCorpus,
    id: String,
    text: String,
    group_id: Option<String>,
    vector: Vec<f32>,
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

/// Brute-force cosine index over provider embeddings of one snapshot.
pub struct InMemoryVectorIndex<P> {
    provider: Arc<P>,
    entries: Vec<Entry>,
    dimension: usize,
}

impl<P> std::fmt::Debug for InMemoryVectorIndex<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryVectorIndex")
            .field("entries", &self.entries.len())
            .field("dimension", &self.dimension)
            .finish_non_exhaustive()
    }
}

impl<P: LlmProvider> InMemoryVectorIndex<P> {
    /// Embed every chunk and group of `snapshot`.
    ///
    /// # Errors
    ///
    /// Fails if the provider cannot embed or returns vectors of differing
    /// dimension.
    pub async fn build(provider: Arc<P>, snapshot: &CorpusSnapshot) -> Result<Self, VectorSearchError> {
        if !provider.supports_embeddings() {
            return Err(VectorSearchError::Unavailable(format!(
                "{} does not support embeddings",
                provider.name()
            )));
        }

        let items = snapshot
            .chunks()
            .iter()
            .map(|c| (VectorCorpus::Chunks, &c.id, &c.text, c.group_id.clone()))
            .chain(snapshot.groups().iter().map(|g| {
                (VectorCorpus::Groups, &g.id, &g.digest, Some(g.id.clone()))
            }));

        let mut entries = Vec::new();
        let mut dimension = 0;
        for (corpus, id, text, group_id) in items {
            let vector = provider.embed(text).await?;
            if dimension == 0 {
                dimension = vector.len();
            } else if vector.len() != dimension {
                return Err(VectorSearchError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            entries.push(Entry {
                corpus,
                id: id.clone(),
                text: text.clone(),
                group_id,
                vector,
            });
        }
        tracing::info!(entries = entries.len(), dimension, "built in-memory vector index");

        Ok(Self {
            provider,
            entries,
            dimension,
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<P: LlmProvider> VectorSearch for InMemoryVectorIndex<P> {
    fn search<'a>(
        &'a self,
        query: &'a str,
        corpus: VectorCorpus,
        options: VectorSearchOptions,
    ) -> BoxFuture<'a, Result<Vec<VectorHit>, VectorSearchError>> {
        Box::pin(async move {
            if query.trim().is_empty() || options.top_k == 0 || self.entries.is_empty() {
                return Ok(Vec::new());
            }
            let q = self.provider.embed(query).await?;
            if q.len() != self.dimension {
                return Err(VectorSearchError::DimensionMismatch {
                    expected: self.dimension,
                    actual: q.len(),
                });
            }

            let mut scored: Vec<(usize, f32)> = self
                .entries
                .iter()
                .enumerate()
                .filter(|(_, e)| e.corpus == corpus)
                .map(|(i, e)| (i, cosine_similarity(&q, &e.vector)))
                .filter(|(_, score)| *score >= options.threshold)
                .collect();
            scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
            scored.truncate(options.top_k);

            Ok(scored
                .into_iter()
                .map(|(i, score)| {
                    let e = &self.entries[i];
                    VectorHit {
                        id: e.id.clone(),
                        score,
                        text: e.text.clone(),
                        group_id: e.group_id.clone(),
                    }
                })
                .collect())
        })
    }
}

#[cfg(test)]
mod tests {
    use sift_index::Bm25Params;
    use sift_llm::mock::MockProvider;

    use super::*;
    use crate::types::{Chunk, SemanticGroup};

    #[test]
    fn cosine_identical() {
        let v = vec![1.0, 2.0, 3.0];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn cosine_orthogonal() {
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).abs() < 1e-6);
    }

    #[test]
    fn cosine_zero_vector() {
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]).abs() < f32::EPSILON);
    }

    fn snapshot() -> CorpusSnapshot {
        let chunks = vec![Chunk::new("c0", "alpha", 0), Chunk::new("c1", "beta", 1)];
        let group = SemanticGroup {
            id: SemanticGroup::id_for(0),
            chunk_indices: vec![0, 1],
            char_count: 9,
            summary: "s".into(),
            keywords: vec![],
            structure: vec![],
            digest: "alpha beta".into(),
            full_text: "alpha\n\nbeta".into(),
        };
        CorpusSnapshot::build(chunks, vec![group], Bm25Params::default()).unwrap()
    }

    #[tokio::test]
    async fn build_requires_embedding_support() {
        let err = InMemoryVectorIndex::build(Arc::new(MockProvider::default()), &snapshot())
            .await
            .unwrap_err();
        assert!(matches!(err, VectorSearchError::Unavailable(_)));
    }

    #[tokio::test]
    async fn search_filters_by_corpus_and_threshold() {
        let provider = Arc::new(MockProvider::default().with_embedding(vec![1.0, 0.0]));
        let index = InMemoryVectorIndex::build(provider, &snapshot()).await.unwrap();
        assert_eq!(index.len(), 3);

        let chunks = index
            .search("alpha", VectorCorpus::Chunks, VectorSearchOptions::default())
            .await
            .unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].id, "c0");
        assert_eq!(chunks[0].group_id.as_deref(), Some("group-1"));

        let groups = index
            .search(
                "alpha",
                VectorCorpus::Groups,
                VectorSearchOptions {
                    top_k: 5,
                    threshold: 0.5,
                },
            )
            .await
            .unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].text, "alpha beta");

        let none = index
            .search("alpha", VectorCorpus::Chunks, VectorSearchOptions { top_k: 5, threshold: 1.5 })
            .await
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn empty_query_returns_nothing() {
        let provider = Arc::new(MockProvider::default().with_embedding(vec![1.0]));
        let index = InMemoryVectorIndex::build(provider, &snapshot()).await.unwrap();
        let hits = index
            .search("  ", VectorCorpus::Chunks, VectorSearchOptions::default())
            .await
            .unwrap();
        assert!(hits.is_empty());
    }
}
