use std::time::Duration;

use serde::Deserialize;

use crate::error::{LLMError, classify_status};
use crate::redact::sanitize_error_text;

use super::types::GeminiErrorDetail;

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<GeminiErrorDetail>,
}

/// Parses error responses returned by Google Gemini.
pub(crate) fn parse_gemini_error(
    status: u16,
    body: &str,
    retry_after: Option<Duration>,
) -> LLMError {
    let message = match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            error: Some(error),
        }) => sanitize_error_text(&error.describe()),
        // Fallback: if the payload cannot be parsed, keep the raw body.
        _ => sanitize_error_text(body),
    };
    classify_status("gemini", status, message, retry_after)
}
