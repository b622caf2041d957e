use serde::Serialize;
use sift_index::is_cjk;

/// Estimate tokens: one per CJK character, one per four other characters
/// (rounded up).
#[must_use]
pub fn estimate_tokens(text: &str) -> usize {
    let (cjk, other) = text.chars().fold((0usize, 0usize), |(cjk, other), ch| {
        if is_cjk(ch) {
            (cjk + 1, other)
        } else {
            (cjk, other + 1)
        }
    });
    cjk + other.div_ceil(4)
}

/// One provenance-tagged piece of retrieved text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContextEntry {
    /// Where the text came from, e.g. `keyword_search #3`.
    pub label: String,
    pub text: String,
    pub sources: Vec<String>,
    /// Set once the budget manager cut the tail off this entry.
    pub truncated: bool,
}

impl ContextEntry {
    #[must_use]
    pub fn new(label: impl Into<String>, text: impl Into<String>, sources: Vec<String>) -> Self {
        Self {
            label: label.into(),
            text: text.into(),
            sources,
            truncated: false,
        }
    }
}

/// Render entries in order with their labels.
#[must_use]
pub fn render_context(entries: &[ContextEntry]) -> String {
    let mut out = String::new();
    for entry in entries {
        if !out.is_empty() {
            out.push_str("\n\n");
        }
        out.push_str(&header(entry));
        out.push_str(&entry.text);
    }
    out
}

fn header(entry: &ContextEntry) -> String {
    if entry.truncated {
        format!("### {} (truncated)\n", entry.label)
    } else {
        format!("### {}\n", entry.label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PruneReport {
    pub removed_entries: usize,
    pub truncated: bool,
    pub tokens_before: usize,
    pub tokens_after: usize,
}

/// Keeps accumulated context within a token allocation.
///
/// Pruning is deterministic: whole entries are dropped oldest first; if the
/// newest entry alone still exceeds the allocation its tail is cut. Sizes are
/// measured on the rendered context, headers and separators included, so the
/// text handed to the model never estimates above the allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetManager {
    allocation: usize,
}

impl BudgetManager {
    #[must_use]
    pub fn new(allocation: usize) -> Self {
        Self { allocation }
    }

    #[must_use]
    pub fn allocation(&self) -> usize {
        self.allocation
    }

    /// Estimated size of `entries` as [`render_context`] lays them out.
    #[must_use]
    pub fn estimate(entries: &[ContextEntry]) -> usize {
        estimate_tokens(&render_context(entries))
    }

    #[must_use]
    pub fn exceeds(&self, entries: &[ContextEntry]) -> bool {
        Self::estimate(entries) > self.allocation
    }

    /// Prune `entries` in place. Returns `None` when already within budget.
    pub fn prune(&self, entries: &mut Vec<ContextEntry>) -> Option<PruneReport> {
        let tokens_before = Self::estimate(entries);
        if tokens_before <= self.allocation {
            return None;
        }

        let mut drop = 0usize;
        while entries.len() - drop > 1 && Self::estimate(&entries[drop..]) > self.allocation {
            drop += 1;
        }
        entries.drain(..drop);

        let mut removed_entries = drop;
        let mut truncated = false;
        if Self::estimate(entries) > self.allocation
            && let Some(last) = entries.last_mut()
        {
            last.truncated = true;
            truncated = true;
            // The estimate is subadditive, so header + prefix stays within budget.
            match self.allocation.checked_sub(estimate_tokens(&header(last))) {
                Some(room) => {
                    let cut = prefix_within(&last.text, room);
                    last.text.truncate(cut);
                }
                None => last.text.clear(),
            }
            if last.text.is_empty() {
                entries.pop();
                removed_entries += 1;
            }
        }
        let total = Self::estimate(entries);

        tracing::info!(
            removed_entries,
            truncated,
            tokens_before,
            tokens_after = total,
            allocation = self.allocation,
            "pruned retrieval context"
        );
        Some(PruneReport {
            removed_entries,
            truncated,
            tokens_before,
            tokens_after: total,
        })
    }
}

/// Byte length of the longest prefix of `text` whose estimate fits `budget`.
fn prefix_within(text: &str, budget: usize) -> usize {
    let mut cjk = 0usize;
    let mut other = 0usize;
    for (i, ch) in text.char_indices() {
        if is_cjk(ch) {
            cjk += 1;
        } else {
            other += 1;
        }
        if cjk + other.div_ceil(4) > budget {
            return i;
        }
    }
    text.len()
}
