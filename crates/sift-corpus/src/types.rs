use std::fmt::Write as _;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Upper bound for a group digest.
pub const DIGEST_MAX_CHARS: usize = 1_200;
const DIGEST_OUTLINE_ITEMS: usize = 8;

/// Smallest addressable unit of document text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub text: String,
    pub char_count: usize,
    /// Ordinal position in the source document.
    pub position: usize,
    /// Owning semantic group; assigned once when the corpus snapshot is built.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

impl Chunk {
    #[must_use]
    pub fn new(id: impl Into<String>, text: impl Into<String>, position: usize) -> Self {
        let text = text.into();
        Self {
            id: id.into(),
            char_count: text.chars().count(),
            text,
            position,
            group_id: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StructureKind {
    Title,
    #[serde(alias = "heading", alias = "subsection")]
    Section,
    #[serde(alias = "keypoint", alias = "point")]
    KeyPoint,
    Figure,
    Table,
    #[serde(alias = "equation")]
    Formula,
}

impl StructureKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Section => "section",
            Self::KeyPoint => "key_point",
            Self::Figure => "figure",
            Self::Table => "table",
            Self::Formula => "formula",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructureElement {
    pub kind: StructureKind,
    pub text: String,
}

/// How much of a group to return when fetching it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Summary,
    #[default]
    Digest,
    Full,
}

impl Granularity {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Summary => "summary",
            Self::Digest => "digest",
            Self::Full => "full",
        }
    }
}

/// Contiguous run of chunks enriched with summary, keywords and structure.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemanticGroup {
    pub id: String,
    /// Indices into the chunk list, ascending and contiguous.
    pub chunk_indices: Vec<usize>,
    pub char_count: usize,
    pub summary: String,
    pub keywords: Vec<String>,
    pub structure: Vec<StructureElement>,
    pub digest: String,
    #[serde(skip_serializing)]
    pub full_text: String,
}

impl SemanticGroup {
    /// Id assigned to the group at position `index` of an aggregation pass.
    #[must_use]
    pub fn id_for(index: usize) -> String {
        format!("group-{}", index + 1)
    }

    #[must_use]
    pub fn text(&self, granularity: Granularity) -> &str {
        match granularity {
            Granularity::Summary => &self.summary,
            Granularity::Digest => &self.digest,
            Granularity::Full => &self.full_text,
        }
    }

    /// One line per group: id, keywords and summary.
    #[must_use]
    pub fn map_line(&self) -> String {
        format!(
            "[{}] keywords: {} | {}",
            self.id,
            self.keywords.join(", "),
            self.summary
        )
    }
}

/// Truncate to at most `max` characters on a char boundary.
#[must_use]
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Deterministic medium-length view of a group: summary, outline, then the
/// opening of the raw text, bounded by [`DIGEST_MAX_CHARS`].
#[must_use]
pub fn build_digest(summary: &str, structure: &[StructureElement], full_text: &str) -> String {
    let mut digest = String::with_capacity(DIGEST_MAX_CHARS);
    if !summary.is_empty() {
        digest.push_str(summary.trim());
        digest.push('\n');
    }
    for el in structure.iter().take(DIGEST_OUTLINE_ITEMS) {
        let _ = writeln!(digest, "- {}: {}", el.kind.as_str(), el.text.trim());
    }

    let used = digest.chars().count();
    if used < DIGEST_MAX_CHARS {
        let excerpt = truncate_chars(full_text.trim(), DIGEST_MAX_CHARS - used);
        digest.push_str(excerpt);
    }
    truncate_chars(digest.trim_end(), DIGEST_MAX_CHARS).to_owned()
}
