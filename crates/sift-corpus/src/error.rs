#[derive(Debug, thiserror::Error)]
pub enum CorpusError {
    #[error("group {group} is not contiguous with the previous group (expected chunk {expected}, found {found})")]
    NonContiguous {
        group: String,
        expected: usize,
        found: usize,
    },

    #[error("groups cover {covered} of {total} chunks")]
    IncompleteCoverage { covered: usize, total: usize },

    #[error("duplicate group id: {0}")]
    DuplicateGroupId(String),

    #[error("chunk {chunk} already belongs to group {group}")]
    ChunkAlreadyAssigned { chunk: usize, group: String },

    #[error("invalid aggregation config: {0}")]
    InvalidConfig(String),

    #[error("corpus store lock poisoned")]
    LockPoisoned,
}
