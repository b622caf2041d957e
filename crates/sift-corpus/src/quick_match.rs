use std::collections::HashSet;

use sift_index::tokenize;

use crate::types::SemanticGroup;

const KEYWORD_WEIGHT: u32 = 3;
const SUMMARY_WEIGHT: u32 = 2;
const DIGEST_WEIGHT: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GroupMatch {
    /// Position of the group in the slice passed to [`quick_match`].
    pub index: usize,
    pub score: u32,
}

/// Query words used for summary/digest matching: distinct tokens of at least
/// two characters (CJK bigrams and trigrams, Latin words, numbers).
fn query_words(query: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    tokenize(query)
        .into_iter()
        .filter(|w| w.chars().count() >= 2)
        .filter(|w| seen.insert(w.clone()))
        .collect()
}

/// Rank groups against `query` without calling a model.
///
/// Scores +3 per group keyword contained in the query, +2 per query word
/// contained in the summary and +1 per query word contained in the digest.
/// Zero-score groups are dropped; ties keep group order.
#[must_use]
pub fn quick_match(query: &str, groups: &[SemanticGroup]) -> Vec<GroupMatch> {
    let query_lower = query.to_lowercase();
    let words = query_words(query);

    let mut matches: Vec<GroupMatch> = groups
        .iter()
        .enumerate()
        .filter_map(|(index, group)| {
            let keyword_hits = group
                .keywords
                .iter()
                .map(|k| k.trim().to_lowercase())
                .filter(|k| !k.is_empty() && query_lower.contains(k.as_str()))
                .count();
            let summary = group.summary.to_lowercase();
            let digest = group.digest.to_lowercase();
            let summary_hits = words.iter().filter(|w| summary.contains(w.as_str())).count();
            let digest_hits = words.iter().filter(|w| digest.contains(w.as_str())).count();

            let score = u32::try_from(keyword_hits).unwrap_or(u32::MAX) * KEYWORD_WEIGHT
                + u32::try_from(summary_hits).unwrap_or(u32::MAX) * SUMMARY_WEIGHT
                + u32::try_from(digest_hits).unwrap_or(u32::MAX) * DIGEST_WEIGHT;
            (score > 0).then_some(GroupMatch { index, score })
        })
        .collect();

    matches.sort_by(|a, b| b.score.cmp(&a.score).then(a.index.cmp(&b.index)));
    matches
}
