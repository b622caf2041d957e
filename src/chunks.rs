use std::path::Path;

use anyhow::Context;
use serde::Deserialize;
use sift_corpus::Chunk;

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChunkInput {
    Text(String),
    Record {
        #[serde(default)]
        id: Option<String>,
        text: String,
    },
}

/// Read a chunk file: a JSON array of strings or `{"id", "text"}` objects.
///
/// # Errors
///
/// Fails if the file cannot be read or is not such an array.
pub fn load_chunks(path: &Path) -> anyhow::Result<Vec<Chunk>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read chunks from {}", path.display()))?;
    parse_chunks(&raw).with_context(|| format!("invalid chunk file {}", path.display()))
}

pub fn parse_chunks(raw: &str) -> anyhow::Result<Vec<Chunk>> {
    let inputs: Vec<ChunkInput> = serde_json::from_str(raw)?;
    let mut seen = std::collections::HashSet::new();
    let mut chunks = Vec::with_capacity(inputs.len());
    for (position, input) in inputs.into_iter().enumerate() {
        let (id, text) = match input {
            ChunkInput::Text(text) => (None, text),
            ChunkInput::Record { id, text } => (id, text),
        };
        let id = id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| format!("c{position}"));
        if !seen.insert(id.clone()) {
            anyhow::bail!("duplicate chunk id `{id}`");
        }
        chunks.push(Chunk::new(id, text, position));
    }
    Ok(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_strings_get_positional_ids() {
        let chunks = parse_chunks(r#"["first", "second"]"#).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].id, "c0");
        assert_eq!(chunks[1].id, "c1");
        assert_eq!(chunks[1].position, 1);
        assert_eq!(chunks[1].char_count, 6);
    }

    #[test]
    fn records_keep_their_ids() {
        let chunks =
            parse_chunks(r#"[{"id": "p1", "text": "a"}, {"text": "b"}, "c"]"#).unwrap();
        let ids: Vec<_> = chunks.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["p1", "c1", "c2"]);
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = parse_chunks(r#"[{"id": "x", "text": "a"}, {"id": "x", "text": "b"}]"#)
            .unwrap_err();
        assert!(err.to_string().contains("duplicate chunk id `x`"));
    }

    #[test]
    fn non_array_is_rejected() {
        assert!(parse_chunks(r#"{"text": "a"}"#).is_err());
    }

    #[test]
    fn empty_array_is_fine() {
        assert!(parse_chunks("[]").unwrap().is_empty());
    }
}
