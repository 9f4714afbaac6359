use std::time::Duration;

use serde::Deserialize;
use serde_json::Value;

use crate::error::{LLMError, classify_status};
use crate::redact::sanitize_error_text;

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<InnerError>,
}

#[derive(Deserialize)]
struct InnerError {
    message: Option<String>,
    code: Option<Value>,
}

/// Maps an OpenAI-style error envelope (`{"error":{"message":..}}`) onto [`LLMError`].
pub(crate) fn parse_openai_error(
    provider: &'static str,
    status: u16,
    body: &str,
    retry_after: Option<Duration>,
) -> LLMError {
    let message = match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            error: Some(error),
        }) => {
            let mut message = error.message.unwrap_or_else(|| "unknown error".to_string());
            if let Some(code) = error.code.filter(|code| !code.is_null()) {
                message = format!("{message} ({code})");
            }
            sanitize_error_text(&message)
        }
        _ => sanitize_error_text(body),
    };
    classify_status(provider, status, message, retry_after)
}
