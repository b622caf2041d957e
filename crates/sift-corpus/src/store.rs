use std::collections::HashMap;
use std::fmt::Write as _;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use sift_index::{Bm25Params, LexicalIndex};

use crate::error::CorpusError;
use crate::types::{Chunk, Granularity, SemanticGroup};

/// Read-only view of a document corpus.
pub trait CorpusAccessor: Send + Sync {
    fn chunks(&self) -> &[Chunk];

    fn groups(&self) -> &[SemanticGroup];

    /// Id of the group owning chunk `chunk`.
    fn group_of_chunk(&self, chunk: usize) -> Option<&str>;

    /// Text of group `group_id` at `granularity`.
    fn group_text(&self, group_id: &str, granularity: Granularity) -> Option<&str>;
}

/// Immutable corpus state shared by every session between rebuilds.
#[derive(Debug, Default)]
pub struct CorpusSnapshot {
    chunks: Vec<Chunk>,
    groups: Vec<SemanticGroup>,
    group_lookup: HashMap<String, usize>,
    chunk_index: LexicalIndex,
    group_index: LexicalIndex,
    version: u64,
}

impl CorpusSnapshot {
    /// Assemble a snapshot, assigning every chunk its owning group and
    /// building lexical indexes over chunks and groups.
    ///
    /// An empty `groups` list yields a chunk-only corpus.
    ///
    /// # Errors
    ///
    /// Fails if groups are not contiguous and ascending, leave chunks
    /// uncovered, repeat an id, or claim a chunk that already has an owner.
    pub fn build(
        mut chunks: Vec<Chunk>,
        groups: Vec<SemanticGroup>,
        params: Bm25Params,
    ) -> Result<Self, CorpusError> {
        let mut group_lookup = HashMap::with_capacity(groups.len());
        let mut expected = 0usize;

        for (gi, group) in groups.iter().enumerate() {
            if group_lookup.insert(group.id.clone(), gi).is_some() {
                return Err(CorpusError::DuplicateGroupId(group.id.clone()));
            }
            for &ci in &group.chunk_indices {
                if ci != expected || ci >= chunks.len() {
                    return Err(CorpusError::NonContiguous {
                        group: group.id.clone(),
                        expected,
                        found: ci,
                    });
                }
                let chunk = &mut chunks[ci];
                if let Some(owner) = &chunk.group_id {
                    return Err(CorpusError::ChunkAlreadyAssigned {
                        chunk: ci,
                        group: owner.clone(),
                    });
                }
                chunk.group_id = Some(group.id.clone());
                expected += 1;
            }
        }
        if !groups.is_empty() && expected != chunks.len() {
            return Err(CorpusError::IncompleteCoverage {
                covered: expected,
                total: chunks.len(),
            });
        }

        let chunk_texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let group_texts: Vec<&str> = groups.iter().map(|g| g.full_text.as_str()).collect();
        let chunk_index = LexicalIndex::build(&chunk_texts, params);
        let group_index = LexicalIndex::build(&group_texts, params);

        Ok(Self {
            chunks,
            groups,
            group_lookup,
            chunk_index,
            group_index,
            version: 0,
        })
    }

    /// Snapshot over chunks alone, without semantic groups.
    #[must_use]
    pub fn chunks_only(chunks: Vec<Chunk>, params: Bm25Params) -> Self {
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        let chunk_index = LexicalIndex::build(&texts, params);
        Self {
            chunks,
            chunk_index,
            ..Self::default()
        }
    }

    /// Monotonic rebuild counter; `0` for snapshots never installed in a store.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[must_use]
    pub fn has_groups(&self) -> bool {
        !self.groups.is_empty()
    }

    #[must_use]
    pub fn has_chunks(&self) -> bool {
        !self.chunks.is_empty()
    }

    #[must_use]
    pub fn group(&self, id: &str) -> Option<&SemanticGroup> {
        self.group_lookup.get(id).map(|&i| &self.groups[i])
    }

    /// Position of group `id` in [`CorpusAccessor::groups`].
    #[must_use]
    pub fn group_position(&self, id: &str) -> Option<usize> {
        self.group_lookup.get(id).copied()
    }

    #[must_use]
    pub fn chunk_index(&self) -> &LexicalIndex {
        &self.chunk_index
    }

    #[must_use]
    pub fn group_index(&self) -> &LexicalIndex {
        &self.group_index
    }

    /// Full group map for planning prompts: keywords, structure and the
    /// untruncated summary of every group.
    #[must_use]
    pub fn group_map(&self) -> String {
        let mut out = String::new();
        for group in &self.groups {
            let _ = writeln!(
                out,
                "## {} ({} chars, chunks {}-{})",
                group.id,
                group.char_count,
                group.chunk_indices.first().copied().unwrap_or_default(),
                group.chunk_indices.last().copied().unwrap_or_default(),
            );
            if !group.keywords.is_empty() {
                let _ = writeln!(out, "keywords: {}", group.keywords.join(", "));
            }
            if !group.structure.is_empty() {
                let outline: Vec<String> = group
                    .structure
                    .iter()
                    .map(|el| format!("{}: {}", el.kind.as_str(), el.text))
                    .collect();
                let _ = writeln!(out, "structure: {}", outline.join(" | "));
            }
            let _ = writeln!(out, "summary: {}\n", group.summary);
        }
        out
    }
}

impl CorpusAccessor for CorpusSnapshot {
    fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    fn groups(&self) -> &[SemanticGroup] {
        &self.groups
    }

    fn group_of_chunk(&self, chunk: usize) -> Option<&str> {
        self.chunks.get(chunk)?.group_id.as_deref()
    }

    fn group_text(&self, group_id: &str, granularity: Granularity) -> Option<&str> {
        self.group(group_id).map(|g| g.text(granularity))
    }
}

/// Holder of the current snapshot.
///
/// Readers clone the `Arc` and keep working on it while a rebuild runs.
/// Rebuilds are serialized and publish their result with a single swap.
#[derive(Debug, Default)]
pub struct CorpusStore {
    current: RwLock<Arc<CorpusSnapshot>>,
    rebuild_lock: tokio::sync::Mutex<()>,
    version: AtomicU64,
}

impl CorpusStore {
    #[must_use]
    pub fn new(snapshot: CorpusSnapshot) -> Self {
        let store = Self::default();
        store.install(snapshot);
        store
    }

    /// The snapshot current at the time of the call.
    #[must_use]
    pub fn snapshot(&self) -> Arc<CorpusSnapshot> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// Run `build` exclusively and publish its snapshot.
    ///
    /// Concurrent rebuilds wait for each other; readers are never blocked
    /// for longer than the final swap.
    ///
    /// # Errors
    ///
    /// Propagates the build error; the previous snapshot stays current.
    pub async fn rebuild<F, Fut>(&self, build: F) -> Result<Arc<CorpusSnapshot>, CorpusError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CorpusSnapshot, CorpusError>>,
    {
        let _exclusive = self.rebuild_lock.lock().await;
        let snapshot = build().await?;
        Ok(self.install(snapshot))
    }

    fn install(&self, mut snapshot: CorpusSnapshot) -> Arc<CorpusSnapshot> {
        snapshot.version = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        let snapshot = Arc::new(snapshot);
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *guard = Arc::clone(&snapshot);
        tracing::info!(
            version = snapshot.version,
            chunks = snapshot.chunks.len(),
            groups = snapshot.groups.len(),
            "corpus snapshot installed"
        );
        snapshot
    }
}
