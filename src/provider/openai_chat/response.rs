use serde_json::Value;

use crate::error::LLMError;
use crate::provider::ProviderReply;

use super::types::{OpenAiChatResponse, OpenAiResponseMessage};

pub(crate) fn map_response(body: &str, provider: &'static str) -> Result<ProviderReply, LLMError> {
    let parsed: OpenAiChatResponse = serde_json::from_str(body).map_err(|err| {
        LLMError::provider(provider, format!("failed to parse chat completion: {err}"))
    })?;
    let message = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|choice| choice.message)
        .ok_or_else(|| LLMError::provider(provider, "response contained no choices"))?;
    Ok(convert_message(message))
}

fn convert_message(message: OpenAiResponseMessage) -> ProviderReply {
    let content = match message.content {
        Some(Value::String(text)) => text,
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|part| part.get("text").and_then(Value::as_str))
            .collect::<Vec<_>>()
            .concat(),
        _ => String::new(),
    };
    ProviderReply {
        content,
        reasoning: message
            .reasoning_content
            .or(message.reasoning)
            .unwrap_or_default(),
        status: 200,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_choice_content_and_reasoning() {
        let body = r#"{
            "id": "chatcmpl-1",
            "choices": [
                {"index": 0, "message": {"role": "assistant", "content": "42", "reasoning_content": "6*7"}},
                {"index": 1, "message": {"role": "assistant", "content": "ignored"}}
            ]
        }"#;
        let reply = map_response(body, "deepseek").expect("reply");
        assert_eq!(reply.content, "42");
        assert_eq!(reply.reasoning, "6*7");
    }

    #[test]
    fn array_content_parts_are_joined() {
        let body = r#"{"choices":[{"message":{"content":[{"type":"text","text":"a"},{"type":"text","text":"b"}]}}]}"#;
        assert_eq!(map_response(body, "openai").expect("reply").content, "ab");
    }

    #[test]
    fn missing_choices_is_a_provider_error() {
        let err = map_response(r#"{"choices":[]}"#, "openai").expect_err("no choices");
        assert!(matches!(err, LLMError::Provider { provider: "openai", .. }));
        assert!(map_response("not json", "openai").is_err());
    }
}
