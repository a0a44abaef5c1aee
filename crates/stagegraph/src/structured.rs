//! Structured generator output: fenced-JSON extraction and parse-or-fallback.
//!
//! Generators often wrap JSON in a ```` ```json ```` block or add a sentence
//! before it. `extract_json` strips that; `parse_or_fallback` turns any parse
//! failure into a caller-supplied default so the pipeline keeps moving.

use serde::de::DeserializeOwned;
use tracing::warn;

/// Result of `parse_or_fallback`: the parsed value, or the default that replaced it.
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed<T> {
    Ok(T),
    Fallback(T),
}

impl<T> Parsed<T> {
    pub fn into_inner(self) -> T {
        match self {
            Parsed::Ok(v) | Parsed::Fallback(v) => v,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Parsed::Fallback(_))
    }

    pub fn value(&self) -> &T {
        match self {
            Parsed::Ok(v) | Parsed::Fallback(v) => v,
        }
    }
}

/// Payload of the first fenced block in `raw`, or the trimmed text when there is none.
///
/// The language tag after the opening fence is dropped; an unterminated fence
/// runs to the end of the text.
pub fn extract_json(raw: &str) -> &str {
    let text = raw.trim();
    let Some(open) = text.find("```") else {
        return text;
    };
    let after = &text[open + 3..];
    // Skip the rest of the fence line (language tag).
    let body = match after.find('\n') {
        Some(nl) => &after[nl + 1..],
        None => after.trim_start_matches(|c: char| c.is_ascii_alphabetic()),
    };
    match body.find("```") {
        Some(close) => body[..close].trim(),
        None => body.trim(),
    }
}

/// Parses `raw` (fenced or not) as `T`.
pub fn parse_structured<T: DeserializeOwned>(raw: &str) -> Result<T, serde_json::Error> {
    serde_json::from_str(extract_json(raw))
}

/// Parses `raw` as `T`, substituting `fallback()` on any failure.
///
/// `context` names the producing stage in the warning that is logged.
pub fn parse_or_fallback<T, F>(context: &str, raw: &str, fallback: F) -> Parsed<T>
where
    T: DeserializeOwned,
    F: FnOnce() -> T,
{
    match parse_structured(raw) {
        Ok(v) => Parsed::Ok(v),
        Err(e) => {
            warn!(stage = context, error = %e, "unparseable structured output, using fallback");
            Parsed::Fallback(fallback())
        }
    }
}
