//! Document corpus: chunks, semantic groups, aggregation and vector search.

pub mod aggregator;
pub mod enrich;
pub mod error;
pub mod limiter;
pub mod quick_match;
pub mod store;
pub mod structure;
pub mod types;
pub mod vector;

pub use aggregator::{AggregationConfig, Aggregator, Candidate, pack};
pub use error::CorpusError;
pub use limiter::FixedGapLimiter;
pub use quick_match::{GroupMatch, quick_match};
pub use store::{CorpusAccessor, CorpusSnapshot, CorpusStore};
pub use types::{Chunk, Granularity, SemanticGroup, StructureElement, StructureKind};
pub use vector::{
    InMemoryVectorIndex, VectorCorpus, VectorHit, VectorSearch, VectorSearchError,
    VectorSearchOptions,
};
