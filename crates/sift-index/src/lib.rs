//! Lexical retrieval: a CJK-aware tokenizer and an in-memory BM25 index.

pub mod bm25;
pub mod tokenizer;

pub use bm25::{Bm25Params, LexicalIndex, ScoredDoc};
pub use tokenizer::{is_cjk, tokenize};
