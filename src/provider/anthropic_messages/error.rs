use std::time::Duration;

use serde::Deserialize;

use crate::error::{LLMError, classify_status};
use crate::redact::sanitize_error_text;

use super::types::AnthropicErrorDetail;

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<AnthropicErrorDetail>,
}

/// Parses error responses returned by the Anthropic Messages API.
///
/// The envelope is `{"type":"error","error":{"type":"..","message":".."}}`.
pub(crate) fn parse_anthropic_error(
    status: u16,
    body: &str,
    retry_after: Option<Duration>,
) -> LLMError {
    let message = match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            error: Some(error),
        }) => sanitize_error_text(&describe(&error)),
        _ => sanitize_error_text(body),
    };
    classify_status("anthropic", status, message, retry_after)
}

pub(crate) fn describe(error: &AnthropicErrorDetail) -> String {
    let message = error.message.as_deref().unwrap_or("unknown error");
    match error.kind.as_deref() {
        Some(kind) => format!("{kind}: {message}"),
        None => message.to_string(),
    }
}
