use crate::error::LLMError;
use crate::provider::ProviderReply;

use super::types::AnthropicMessageResponse;

/// Text blocks form the content; thinking blocks form the reasoning.
pub(crate) fn map_response(body: &str) -> Result<ProviderReply, LLMError> {
    let parsed: AnthropicMessageResponse = serde_json::from_str(body).map_err(|err| {
        LLMError::provider("anthropic", format!("failed to parse Anthropic response: {err}"))
    })?;
    let mut reply = ProviderReply {
        status: 200,
        ..ProviderReply::default()
    };
    for block in parsed.content {
        match block.kind.as_str() {
            "text" => reply.content.push_str(block.text.as_deref().unwrap_or_default()),
            "thinking" => reply
                .reasoning
                .push_str(block.thinking.as_deref().unwrap_or_default()),
            _ => {}
        }
    }
    Ok(reply)
}
