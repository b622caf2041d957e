use std::collections::{HashMap, HashSet};

use serde::Deserialize;

use crate::tokenizer::tokenize;

fn default_k1() -> f64 {
    1.5
}

fn default_b() -> f64 {
    0.75
}

fn default_phrase_boost() -> f64 {
    3.0
}

/// BM25 tuning knobs.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Bm25Params {
    /// Term-frequency saturation.
    #[serde(default = "default_k1")]
    pub k1: f64,
    /// Document-length normalisation strength, `0.0..=1.0`.
    #[serde(default = "default_b")]
    pub b: f64,
    /// Multiplier applied once per keyword found verbatim in a document.
    #[serde(default = "default_phrase_boost")]
    pub phrase_boost: f64,
}

impl Default for Bm25Params {
    fn default() -> Self {
        Self {
            k1: default_k1(),
            b: default_b(),
            phrase_boost: default_phrase_boost(),
        }
    }
}

/// A document index with its relevance score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoredDoc {
    pub index: usize,
    pub score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Posting {
    doc: usize,
    tf: u32,
}

#[derive(Debug, Clone)]
struct Document {
    text: String,
    len: usize,
}

/// Immutable BM25 index over an ordered corpus.
///
/// `LexicalIndex::default()` is the unbuilt index: it holds no documents and
/// every query returns an empty result.
#[derive(Debug, Clone, Default)]
pub struct LexicalIndex {
    params: Bm25Params,
    docs: Vec<Document>,
    avg_len: f64,
    postings: HashMap<String, Vec<Posting>>,
}

impl LexicalIndex {
    /// Tokenize every document and build the inverted index.
    ///
    /// Postings lists are ordered by ascending document index.
    #[must_use]
    pub fn build<S: AsRef<str>>(corpus: &[S], params: Bm25Params) -> Self {
        let mut docs = Vec::with_capacity(corpus.len());
        let mut postings: HashMap<String, Vec<Posting>> = HashMap::new();
        let mut total_len = 0usize;

        for (doc, text) in corpus.iter().enumerate() {
            let text = text.as_ref();
            let tokens = tokenize(text);
            total_len += tokens.len();

            let mut freqs: HashMap<String, u32> = HashMap::new();
            for token in &tokens {
                *freqs.entry(token.clone()).or_default() += 1;
            }
            for (term, tf) in freqs {
                postings.entry(term).or_default().push(Posting { doc, tf });
            }
            docs.push(Document {
                text: text.to_owned(),
                len: tokens.len(),
            });
        }

        #[allow(clippy::cast_precision_loss)]
        let avg_len = if docs.is_empty() {
            0.0
        } else {
            total_len as f64 / docs.len() as f64
        };

        tracing::debug!(
            docs = docs.len(),
            terms = postings.len(),
            avg_len,
            "built lexical index"
        );

        Self {
            params,
            docs,
            avg_len,
            postings,
        }
    }

    /// Number of indexed documents.
    #[must_use]
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    #[must_use]
    pub fn params(&self) -> Bm25Params {
        self.params
    }

    #[must_use]
    pub fn avg_doc_len(&self) -> f64 {
        self.avg_len
    }

    /// Token count of document `doc`.
    #[must_use]
    pub fn doc_len(&self, doc: usize) -> Option<usize> {
        self.docs.get(doc).map(|d| d.len)
    }

    /// Raw text of document `doc`.
    #[must_use]
    pub fn text(&self, doc: usize) -> Option<&str> {
        self.docs.get(doc).map(|d| d.text.as_str())
    }

    /// Number of documents containing `term`.
    #[must_use]
    pub fn document_frequency(&self, term: &str) -> usize {
        self.postings.get(term).map_or(0, Vec::len)
    }

    /// Occurrences of `term` in document `doc`.
    #[must_use]
    pub fn term_frequency(&self, term: &str, doc: usize) -> u32 {
        self.postings
            .get(term)
            .and_then(|list| {
                list.binary_search_by_key(&doc, |p| p.doc)
                    .ok()
                    .map(|i| list[i].tf)
            })
            .unwrap_or(0)
    }

    /// `ln((N - df + 0.5) / (df + 0.5) + 1)`; `None` for terms no document contains.
    #[must_use]
    pub fn idf(&self, term: &str) -> Option<f64> {
        let df = self.document_frequency(term);
        if df == 0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        let (n, df) = (self.docs.len() as f64, df as f64);
        Some(((n - df + 0.5) / (df + 0.5) + 1.0).ln())
    }

    fn term_weight(&self, idf: f64, tf: u32, doc_len: usize) -> f64 {
        let Bm25Params { k1, b, .. } = self.params;
        let f = f64::from(tf);
        #[allow(clippy::cast_precision_loss)]
        let ratio = if self.avg_len > 0.0 {
            doc_len as f64 / self.avg_len
        } else {
            0.0
        };
        idf * (f * (k1 + 1.0)) / (f + k1 * (1.0 - b + b * ratio))
    }

    /// BM25 score of document `doc` for `terms`.
    ///
    /// Terms absent from the index or from the document contribute nothing.
    #[must_use]
    pub fn score<S: AsRef<str>>(&self, doc: usize, terms: &[S]) -> f64 {
        let Some(document) = self.docs.get(doc) else {
            return 0.0;
        };
        terms
            .iter()
            .filter_map(|term| {
                let term = term.as_ref();
                let idf = self.idf(term)?;
                let tf = self.term_frequency(term, doc);
                (tf > 0).then(|| self.term_weight(idf, tf, document.len))
            })
            .sum()
    }

    /// Score every document for `terms` in one pass over the postings.
    ///
    /// Per-document sums are accumulated in term order, so each entry equals
    /// `self.score(doc, terms)`.
    fn score_all(&self, terms: &[String]) -> Vec<f64> {
        let mut scores = vec![0.0; self.docs.len()];
        for term in terms {
            let (Some(idf), Some(list)) = (self.idf(term), self.postings.get(term)) else {
                continue;
            };
            for p in list {
                scores[p.doc] += self.term_weight(idf, p.tf, self.docs[p.doc].len);
            }
        }
        scores
    }

    /// Rank documents against free-text `query`.
    ///
    /// Repeated query tokens each contribute to the sum. Keeps scores strictly above `threshold`, ordered by descending score
    /// and then by ascending document index.
    #[must_use]
    pub fn search(&self, query: &str, top_k: usize, threshold: f64) -> Vec<ScoredDoc> {
        if self.docs.is_empty() || top_k == 0 {
            return Vec::new();
        }
        let terms = tokenize(query);
        if terms.is_empty() {
            return Vec::new();
        }
        rank(self.score_all(&terms), top_k, threshold)
    }

    /// Rank documents against a keyword list with exact-phrase boosting.
    ///
    /// Every keyword is expanded into its own tokens for BM25 scoring. Each
    /// keyword that also occurs verbatim in a document's raw text multiplies
    /// that document's score by `phrase_boost`, so matches compound.
    #[must_use]
    pub fn search_keywords<S: AsRef<str>>(
        &self,
        keywords: &[S],
        top_k: usize,
        threshold: f64,
    ) -> Vec<ScoredDoc> {
        if self.docs.is_empty() || top_k == 0 {
            return Vec::new();
        }
        let keywords = dedup(
            keywords
                .iter()
                .map(|k| k.as_ref().trim().to_owned())
                .filter(|k| !k.is_empty()),
        );
        let terms: Vec<String> = keywords.iter().flat_map(|k| tokenize(k)).collect();
        if terms.is_empty() {
            return Vec::new();
        }

        let mut scores = self.score_all(&terms);
        for (doc, score) in scores.iter_mut().enumerate() {
            if *score <= 0.0 {
                continue;
            }
            let text = &self.docs[doc].text;
            for keyword in &keywords {
                if text.contains(keyword.as_str()) {
                    *score *= self.params.phrase_boost;
                }
            }
        }
        rank(scores, top_k, threshold)
    }
}

/// Drop repeats, keeping first-occurrence order.
fn dedup(items: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items
        .into_iter()
        .filter(|item| seen.insert(item.clone()))
        .collect()
}

fn rank(scores: Vec<f64>, top_k: usize, threshold: f64) -> Vec<ScoredDoc> {
    let mut hits: Vec<ScoredDoc> = scores
        .into_iter()
        .enumerate()
        .filter(|(_, score)| *score > threshold)
        .map(|(index, score)| ScoredDoc { index, score })
        .collect();
    hits.sort_by(|a, b| b.score.total_cmp(&a.score).then(a.index.cmp(&b.index)));
    hits.truncate(top_k);
    hits
}
