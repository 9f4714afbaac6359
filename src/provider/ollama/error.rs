use std::time::Duration;

use serde::Deserialize;

use crate::error::{LLMError, classify_status};
use crate::redact::sanitize_error_text;

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// Ollama reports failures as `{"error":"model 'x' not found"}`.
pub(crate) fn parse_ollama_error(
    status: u16,
    body: &str,
    retry_after: Option<Duration>,
) -> LLMError {
    let message = match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            error: Some(message),
        }) => sanitize_error_text(&message),
        _ => sanitize_error_text(body),
    };
    classify_status("ollama", status, message, retry_after)
}
