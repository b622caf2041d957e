//! Pulling JSON out of free-form LLM text.
//!
//! `parse_json` first tries a strict decode of the outermost JSON value found
//! in the response. Only if that fails does it run the best-effort repair pass
//! and decode once more. Callers get [`Parsed::repaired`] so they can treat a
//! repaired value with less trust than a clean one.

use std::sync::LazyLock;

use regex::Regex;
use serde::de::DeserializeOwned;

use crate::error::LlmError;

/// `"  key "` directly before a colon.
static PADDED_KEY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""\s*([A-Za-z_][A-Za-z0-9_]*)\s*"\s*:"#).unwrap());

/// `{"key" "value"` / `, "key" [` with the colon missing.
static MISSING_COLON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([{,]\s*)"([A-Za-z_][A-Za-z0-9_]*)"\s+(["\[{0-9tfn-])"#).unwrap()
});

/// `,` followed only by whitespace before a closing bracket.
static TRAILING_COMMA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",(\s*[}\]])").unwrap());

/// A decoded value and whether the repair pass was needed to get it.
#[derive(Debug, Clone, PartialEq)]
pub struct Parsed<T> {
    pub value: T,
    pub repaired: bool,
}

/// Locate the outermost JSON object or array in `text`.
///
/// Code fences and surrounding prose are ignored. Returns `None` when no
/// opening bracket with a matching closing bracket exists.
#[must_use]
pub fn extract_json_block(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let close = if text[start..].starts_with('{') {
        '}'
    } else {
        ']'
    };
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

/// Apply the repair rules, in order:
///
/// 1. strip whitespace padding inside object keys (`" op " :` → `"op":`);
/// 2. insert a missing colon between a key and its value;
/// 3. drop trailing commas before `}` or `]`.
#[must_use]
pub fn repair_json(raw: &str) -> String {
    let step = PADDED_KEY_RE.replace_all(raw, "\"$1\":");
    let step = MISSING_COLON_RE.replace_all(&step, "$1\"$2\": $3");
    TRAILING_COMMA_RE.replace_all(&step, "$1").into_owned()
}

/// Decode `T` from an LLM response, repairing once if the strict parse fails.
///
/// # Errors
///
/// Returns `LlmError::StructuredParse` when no JSON block is present or the
/// repaired text still does not decode.
pub fn parse_json<T: DeserializeOwned>(text: &str) -> Result<Parsed<T>, LlmError> {
    let block = extract_json_block(text)
        .ok_or_else(|| LlmError::StructuredParse("no JSON value in response".into()))?;

    match serde_json::from_str::<T>(block) {
        Ok(value) => Ok(Parsed {
            value,
            repaired: false,
        }),
        Err(strict_err) => {
            let fixed = repair_json(block);
            match serde_json::from_str::<T>(&fixed) {
                Ok(value) => {
                    tracing::debug!(%strict_err, "decoded JSON only after repair");
                    Ok(Parsed {
                        value,
                        repaired: true,
                    })
                }
                Err(e) => Err(LlmError::StructuredParse(format!(
                    "{strict_err}; after repair: {e}"
                ))),
            }
        }
    }
}
