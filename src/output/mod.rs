//! Turning raw model output into text, sections and findings.
//!
//! [`assemble`] folds newline-delimited JSON fragments into one text, [`split_reasoning`]
//! separates inline `<think>` blocks, and [`ParsedOutput`] answers section and risk
//! queries over the result.

mod findings;
mod sections;

use serde_json::Value;
use tracing::debug;

pub use findings::{FindingsSummary, Severity};
pub use sections::{ParsedOutput, SectionMap};

/// Returned by [`assemble`] when no fragment yields any text.
pub const PARSE_ERROR_SENTINEL: &str = "Error: unable to parse model output";

const THINK_OPEN: &str = "<think>";
const THINK_CLOSE: &str = "</think>";

/// Folds NDJSON fragments into one text, or returns [`PARSE_ERROR_SENTINEL`].
///
/// # Examples
///
/// ```
/// use llm_bridge::output::{PARSE_ERROR_SENTINEL, assemble};
///
/// let raw = "{\"response\":\"Hello, \"}\n{\"response\":\"world\"}\n";
/// assert_eq!(assemble(raw), "Hello, world");
/// assert_eq!(assemble("not json"), PARSE_ERROR_SENTINEL);
/// ```
pub fn assemble(raw: &str) -> String {
    try_assemble(raw).unwrap_or_else(|| PARSE_ERROR_SENTINEL.to_string())
}

/// Like [`assemble`] but returns `None` instead of the sentinel.
///
/// `response` fields are appended in order. A fragment carrying a top-level `data` or
/// `analysis` field replaces everything and ends processing; `null` values are ignored.
/// Malformed fragments are skipped.
pub fn try_assemble(raw: &str) -> Option<String> {
    let mut text = String::new();
    let mut produced = false;
    for line in raw.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let fragment = match serde_json::from_str::<Value>(line) {
            Ok(Value::Object(fragment)) => fragment,
            Ok(_) => continue,
            Err(err) => {
                debug!(error = %err, "skipping unparseable output fragment");
                continue;
            }
        };
        if let Some(whole) = ["data", "analysis"]
            .iter()
            .filter_map(|key| fragment.get(*key))
            .find(|value| !value.is_null())
        {
            return Some(value_text(whole));
        }
        if let Some(piece) = fragment.get("response").and_then(Value::as_str) {
            text.push_str(piece);
            produced = true;
        }
    }
    (produced && !text.is_empty()).then_some(text)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

/// Splits `<think>…</think>` blocks out of `text`, returning `(content, reasoning)`.
///
/// Multiple blocks are joined with newlines. An unclosed block runs to the end of the
/// text. Both halves are trimmed.
pub fn split_reasoning(text: &str) -> (String, String) {
    if !text.contains(THINK_OPEN) {
        return (text.to_string(), String::new());
    }
    let mut content = String::new();
    let mut reasoning: Vec<&str> = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find(THINK_OPEN) {
        content.push_str(&rest[..start]);
        let inner = &rest[start + THINK_OPEN.len()..];
        match inner.find(THINK_CLOSE) {
            Some(end) => {
                reasoning.push(inner[..end].trim());
                rest = &inner[end + THINK_CLOSE.len()..];
            }
            None => {
                reasoning.push(inner.trim());
                rest = "";
            }
        }
    }
    content.push_str(rest);
    let reasoning = reasoning
        .into_iter()
        .filter(|piece| !piece.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    (content.trim().to_string(), reasoning)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn streaming_fragments_concatenate() {
        let raw = "{\"response\":\"## Summary\\nAll good.\\n\"}\n{\"response\":\"## Conclusion\\nShip it.\\n\"}";
        let text = assemble(raw);
        assert!(text.contains("All good."));
        assert!(text.contains("Ship it."));
    }

    #[test]
    fn data_or_analysis_fields_win() {
        let raw = concat!(
            "{\"response\":\"partial\"}\n",
            "{\"analysis\":\"## Summary\\nDone\"}\n",
            "{\"response\":\"ignored\"}\n",
        );
        assert_eq!(assemble(raw), "## Summary\nDone");
        assert_eq!(assemble("{\"data\":{\"ok\":true}}"), "{\"ok\":true}");
    }

    #[test]
    fn null_data_fields_are_ignored() {
        let raw = "{\"data\":null,\"response\":\"kept\"}\n{\"response\":\" going\"}";
        assert_eq!(assemble(raw), "kept going");
        assert_eq!(assemble("{\"data\":null,\"analysis\":\"both\"}"), "both");
        assert_eq!(assemble("{\"data\":null}"), PARSE_ERROR_SENTINEL);
    }

    #[test]
    fn malformed_fragments_are_skipped() {
        let raw = "{\"response\":\"a\"}\n{broken\n[1,2]\n{\"response\":\"b\"}";
        assert_eq!(assemble(raw), "ab");
    }

    #[test]
    fn empty_or_garbage_yields_sentinel() {
        assert_eq!(assemble(""), PARSE_ERROR_SENTINEL);
        assert_eq!(assemble("   \n\n"), PARSE_ERROR_SENTINEL);
        assert_eq!(assemble("{{{{"), PARSE_ERROR_SENTINEL);
        assert_eq!(assemble("{\"done\":true}"), PARSE_ERROR_SENTINEL);
        assert_eq!(try_assemble("{\"response\":\"\"}"), None);
    }

    #[test]
    fn think_blocks_are_separated() {
        let (content, reasoning) =
            split_reasoning("<think>first</think>Answer<think> second </think> here");
        assert_eq!(content, "Answer here");
        assert_eq!(reasoning, "first\nsecond");

        let (content, reasoning) = split_reasoning("Plain text");
        assert_eq!(content, "Plain text");
        assert!(reasoning.is_empty());

        let (content, reasoning) = split_reasoning("Lead <think>never closed");
        assert_eq!(content, "Lead");
        assert_eq!(reasoning, "never closed");
    }
}
