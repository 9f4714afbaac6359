use crate::error::LLMError;
use crate::provider::ProviderReply;
use crate::stream::parse_frame;

use super::types::OllamaFrame;

/// Parses a non-streaming body.
///
/// Normally a single JSON object, but servers that ignore `"stream": false` send NDJSON;
/// every line is folded in order and malformed lines are skipped.
pub(crate) fn map_response(body: &str) -> Result<ProviderReply, LLMError> {
    let mut reply = ProviderReply {
        status: 200,
        ..ProviderReply::default()
    };
    let mut parsed_any = false;
    for line in body.lines().map(str::trim).filter(|line| !line.is_empty()) {
        let Some(frame) = parse_frame::<OllamaFrame>("ollama", line) else {
            continue;
        };
        parsed_any = true;
        if let Some(error) = frame.error {
            return Err(LLMError::provider("ollama", error));
        }
        let (reasoning, content) = frame.text();
        reply.reasoning.push_str(reasoning.unwrap_or_default());
        reply.content.push_str(content.unwrap_or_default());
        if frame.done {
            break;
        }
    }
    if !parsed_any {
        return Err(LLMError::provider("ollama", "response contained no JSON object"));
    }
    Ok(reply)
}
