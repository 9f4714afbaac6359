//! Redaction of credentials before anything reaches a log line or a result message.

use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;
use regex::Regex;
use url::Url;

pub const REDACTED: &str = "[REDACTED]";

const MAX_ERROR_TEXT_CHARS: usize = 1_024;

/// Header names that may be logged verbatim. Everything else is masked.
const HEADER_ALLOW_LIST: [&str; 8] = [
    "content-type",
    "accept",
    "user-agent",
    "anthropic-version",
    "anthropic-beta",
    "x-request-id",
    "openai-organization",
    "openai-project",
];

const SENSITIVE_WORDS: [&str; 10] = [
    "api_key",
    "apikey",
    "key",
    "token",
    "secret",
    "password",
    "cookie",
    "authorization",
    "session",
    "credential",
];

static BEARER_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bBearer\s+[A-Za-z0-9._\-+/=]{8,}").expect("valid bearer token regex")
});

static KEY_VALUE_SECRET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?i)\b(api[_-]?key|access[_-]?token|token|secret|password|authorization|x-api-key|x-goog-api-key|key)\b\s*[:=]\s*["']?[^"',\s}&]+"#,
    )
    .expect("valid key/value secret regex")
});

/// Returns `true` when a header or query parameter name belongs to the redaction vocabulary.
pub fn is_sensitive_name(name: &str) -> bool {
    let normalized = name.to_ascii_lowercase().replace(['-', ' '], "_");
    SENSITIVE_WORDS
        .iter()
        .any(|word| normalized.contains(word))
}

/// Copies headers for logging, masking every value not on the allow-list.
///
/// The result is ordered so log lines stay stable between runs.
///
/// # Examples
///
/// ```
/// use std::collections::HashMap;
/// use llm_bridge::redact::{sanitize_headers, REDACTED};
///
/// let headers = HashMap::from([
///     ("Authorization".to_string(), "Bearer sk-live".to_string()),
///     ("Content-Type".to_string(), "application/json".to_string()),
/// ]);
/// let safe = sanitize_headers(&headers);
/// assert_eq!(safe["Authorization"], REDACTED);
/// assert_eq!(safe["Content-Type"], "application/json");
/// ```
pub fn sanitize_headers(headers: &HashMap<String, String>) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            let lower = name.to_ascii_lowercase();
            let allowed = HEADER_ALLOW_LIST.contains(&lower.as_str()) && !is_sensitive_name(&lower);
            let value = if allowed {
                value.clone()
            } else {
                REDACTED.to_string()
            };
            (name.clone(), value)
        })
        .collect()
}

/// Masks query parameters whose names look like credentials.
///
/// Unparseable URLs are returned with their whole query string removed.
pub fn sanitize_url(raw: &str) -> String {
    let Ok(mut url) = Url::parse(raw) else {
        return match raw.split_once('?') {
            Some((base, _)) => format!("{base}?{REDACTED}"),
            None => raw.to_string(),
        };
    };
    if url.query().is_none() {
        return url.to_string();
    }
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(name, value)| {
            let value = if is_sensitive_name(&name) {
                REDACTED.to_string()
            } else {
                value.into_owned()
            };
            (name.into_owned(), value)
        })
        .collect();
    url.query_pairs_mut().clear().extend_pairs(pairs);
    url.to_string()
}

/// Redacts inline secrets from an upstream error body and truncates large payloads.
pub fn sanitize_error_text(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return "<empty error response body>".to_string();
    }
    let redacted_bearer = BEARER_TOKEN_RE.replace_all(trimmed, "Bearer [REDACTED]");
    let redacted = KEY_VALUE_SECRET_RE
        .replace_all(&redacted_bearer, "$1=[REDACTED]")
        .into_owned();
    truncate_with_suffix(redacted)
}

fn truncate_with_suffix(input: String) -> String {
    let char_count = input.chars().count();
    if char_count <= MAX_ERROR_TEXT_CHARS {
        return input;
    }
    let truncated: String = input.chars().take(MAX_ERROR_TEXT_CHARS).collect();
    format!(
        "{truncated}... [truncated {} chars]",
        char_count - MAX_ERROR_TEXT_CHARS
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_key_headers_are_masked() {
        let headers = HashMap::from([
            ("x-api-key".to_string(), "sk-ant-123".to_string()),
            ("x-goog-api-key".to_string(), "AIza-secret".to_string()),
            ("anthropic-version".to_string(), "2023-06-01".to_string()),
            ("Cookie".to_string(), "session=abc".to_string()),
            ("X-Custom-Trace".to_string(), "abc".to_string()),
        ]);
        let safe = sanitize_headers(&headers);
        assert_eq!(safe["x-api-key"], REDACTED);
        assert_eq!(safe["x-goog-api-key"], REDACTED);
        assert_eq!(safe["Cookie"], REDACTED);
        assert_eq!(safe["anthropic-version"], "2023-06-01");
        // Not on the allow-list, so masked even though it looks harmless.
        assert_eq!(safe["X-Custom-Trace"], REDACTED);
    }

    #[test]
    fn sensitive_query_parameters_are_masked() {
        let url = sanitize_url("https://example.com/v1/models/m:generateContent?alt=sse&key=AIzaSecret");
        assert!(url.contains("alt=sse"));
        assert!(!url.contains("AIzaSecret"));
        assert!(url.contains("key=%5BREDACTED%5D") || url.contains("key=[REDACTED]"));
    }

    #[test]
    fn urls_without_query_are_untouched() {
        assert_eq!(
            sanitize_url("http://localhost:11434/api/chat"),
            "http://localhost:11434/api/chat"
        );
    }

    #[test]
    fn error_bodies_lose_inline_secrets() {
        let text = sanitize_error_text("invalid header Authorization: Bearer sk-abcdefghijkl, api_key=sk-999");
        assert!(!text.contains("sk-abcdefghijkl"));
        assert!(!text.contains("sk-999"));
        assert_eq!(sanitize_error_text("   "), "<empty error response body>");
    }

    #[test]
    fn long_error_bodies_are_truncated() {
        let text = sanitize_error_text(&"x".repeat(MAX_ERROR_TEXT_CHARS + 10));
        assert!(text.ends_with("[truncated 10 chars]"));
    }
}
