//! Prompts and response parsing for per-group enrichment.

use std::collections::HashSet;

use serde::Deserialize;
use sift_llm::LlmError;
use sift_llm::extract::parse_json;

use crate::types::{StructureElement, StructureKind, truncate_chars};

const MAX_KEYWORD_CHARS: usize = 40;

const SUMMARY_SYSTEM: &str = "You summarize one section of a longer document. \
Write a single dense paragraph in the document's language. \
State concrete facts, names, numbers and conclusions. No preamble.";

const KEYWORDS_SYSTEM: &str = "You extract retrieval keywords from one section of a document. \
Prefer named entities (people, organisations, places, products, events) over generic terms. \
Copy each keyword exactly as it appears in the text. \
Reply with a JSON array of strings and nothing else.";

const STRUCTURE_SYSTEM: &str = "You extract the structural outline of one section of a document. \
Return a JSON array of objects {\"kind\": K, \"text\": T} where K is one of \
title, section, key_point, figure, table, formula. \
T must be copied verbatim from the text. Keep the original document order. \
Reply with the JSON array only.";

fn with_context(doc_context: &str, body: &str) -> String {
    if doc_context.trim().is_empty() {
        body.to_owned()
    } else {
        format!("Document context: {}\n\n{body}", doc_context.trim())
    }
}

#[must_use]
pub fn summary_prompt(doc_context: &str, text: &str, max_chars: usize) -> (&'static str, String) {
    let body = format!("Summarize in at most {max_chars} characters:\n\n{text}");
    (SUMMARY_SYSTEM, with_context(doc_context, &body))
}

#[must_use]
pub fn keywords_prompt(doc_context: &str, text: &str, max_keywords: usize) -> (&'static str, String) {
    let body = format!("Extract up to {max_keywords} keywords from:\n\n{text}");
    (KEYWORDS_SYSTEM, with_context(doc_context, &body))
}

#[must_use]
pub fn structure_prompt(doc_context: &str, text: &str) -> (&'static str, String) {
    (STRUCTURE_SYSTEM, with_context(doc_context, &format!("Text:\n\n{text}")))
}

/// Summary used when the model call fails or no summarizer is configured.
#[must_use]
pub fn fallback_summary(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&collapsed, max_chars).to_owned()
}

/// Clean and bound a model summary.
///
/// # Errors
///
/// Returns `LlmError::EmptyResponse` when nothing usable remains.
pub fn parse_summary(raw: &str, max_chars: usize) -> Result<String, LlmError> {
    let cleaned = raw.trim().trim_matches('"').trim();
    if cleaned.is_empty() {
        return Err(LlmError::EmptyResponse {
            provider: "summarizer",
        });
    }
    Ok(truncate_chars(cleaned, max_chars).to_owned())
}

/// Keywords from a JSON array, falling back to a delimiter split of the
/// raw response. De-duplicated, bounded to `max`.
#[must_use]
pub fn parse_keywords(raw: &str, max: usize) -> Vec<String> {
    let candidates: Vec<String> = match parse_json::<Vec<String>>(raw) {
        Ok(parsed) => parsed.value,
        Err(_) => raw
            .split([',', '，', '、', ';', '\n'])
            .map(|s| {
                s.trim()
                    .trim_start_matches(['-', '*', '•'])
                    .trim()
                    .trim_matches(['"', '\'', '`'])
                    .to_owned()
            })
            .collect(),
    };

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .map(|k| k.trim().to_owned())
        .filter(|k| !k.is_empty() && k.chars().count() <= MAX_KEYWORD_CHARS)
        .filter(|k| seen.insert(k.to_lowercase()))
        .take(max)
        .collect()
}

#[derive(Deserialize)]
struct RawElement {
    kind: String,
    text: String,
}

/// Decode the structure outline, keeping only elements quoted verbatim from
/// `source` and ordering them by first occurrence.
///
/// # Errors
///
/// Returns `LlmError::StructuredParse` when the response holds no decodable
/// array.
pub fn parse_structure(raw: &str, source: &str) -> Result<Vec<StructureElement>, LlmError> {
    let parsed = parse_json::<Vec<RawElement>>(raw)?;
    if parsed.repaired {
        tracing::debug!("structure outline decoded after JSON repair");
    }

    let mut located: Vec<(usize, StructureElement)> = parsed
        .value
        .into_iter()
        .filter_map(|el| {
            let kind: StructureKind =
                serde_json::from_value(serde_json::Value::String(el.kind.to_lowercase())).ok()?;
            let text = el.text.trim();
            let pos = source.find(text).filter(|_| !text.is_empty())?;
            Some((
                pos,
                StructureElement {
                    kind,
                    text: text.to_owned(),
                },
            ))
        })
        .collect();
    located.sort_by_key(|(pos, _)| *pos);
    Ok(located.into_iter().map(|(_, el)| el).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompts_include_context_only_when_set() {
        let (_, user) = summary_prompt("", "body", 100);
        assert!(!user.contains("Document context"));
        let (_, user) = summary_prompt("Annual report 2008", "body", 100);
        assert!(user.starts_with("Document context: Annual report 2008"));
    }

    #[test]
    fn fallback_summary_collapses_whitespace() {
        assert_eq!(fallback_summary("a\n\n b   c", 100), "a b c");
        assert_eq!(fallback_summary("abcdef", 3), "abc");
    }

    #[test]
    fn summary_trims_and_bounds() {
        assert_eq!(parse_summary("  \"A summary.\" ", 100).unwrap(), "A summary.");
        assert_eq!(parse_summary("abcdef", 4).unwrap(), "abcd");
        assert!(parse_summary("   ", 10).is_err());
    }

    #[test]
    fn keywords_from_json() {
        let kws = parse_keywords("```json\n[\"Lehman\", \"CDS\", \"lehman\"]\n```", 10);
        assert_eq!(kws, vec!["Lehman", "CDS"]);
    }

    #[test]
    fn keywords_from_plain_list() {
        let kws = parse_keywords("- 雷曼\n- 投资、风险", 10);
        assert_eq!(kws, vec!["雷曼", "投资", "风险"]);
    }

    #[test]
    fn keywords_bounded() {
        let kws = parse_keywords(r#"["a", "b", "c", "d"]"#, 2);
        assert_eq!(kws, vec!["a", "b"]);
    }

    #[test]
    fn structure_keeps_verbatim_in_document_order() {
        let source = "Intro\nFigure 1 Growth\nMethods\nTable 1 Data";
        let raw = r#"[
            {"kind": "table", "text": "Table 1 Data"},
            {"kind": "figure", "text": "Figure 1 Growth"},
            {"kind": "section", "text": "Invented heading"},
            {"kind": "mystery", "text": "Methods"}
        ]"#;
        let els = parse_structure(raw, source).unwrap();
        assert_eq!(
            els,
            vec![
                StructureElement {
                    kind: StructureKind::Figure,
                    text: "Figure 1 Growth".into()
                },
                StructureElement {
                    kind: StructureKind::Table,
                    text: "Table 1 Data".into()
                },
            ]
        );
    }

    #[test]
    fn structure_rejects_non_json() {
        assert!(parse_structure("no outline available", "text").is_err());
    }
}
