use serde_json::{Map, Value, json};

use crate::error::LLMError;
use crate::provider::{ProviderRequest, insert_opt};
use crate::types::{ChatMessage, ContentPart, ImageRef, Role};

pub(crate) const DEFAULT_MAX_TOKENS: u32 = 4096;

/// 构建 Anthropic Messages 请求体
pub(crate) fn build_anthropic_body(
    request: &ProviderRequest,
    model: &str,
) -> Result<Value, LLMError> {
    let input = &request.input;
    let options = &request.generation;

    let mut body = Map::new();
    body.insert("model".to_string(), Value::String(model.to_string()));

    // 1. system 角色折叠为顶层 system，其余进入 messages
    let mut system = input.combined_system_prompt();
    let mut messages = Vec::new();
    for message in input.conversation() {
        if message.role == Role::system() {
            continue;
        }
        messages.push(convert_message(&message)?);
    }
    // 接口要求至少一条消息；只有 system 时将其作为用户消息发送
    if messages.is_empty() {
        let text = system
            .take()
            .ok_or_else(|| LLMError::validation("Anthropic request has nothing to send"))?;
        messages.push(json!({ "role": "user", "content": text }));
    }
    body.insert("messages".to_string(), Value::Array(messages));
    insert_opt(&mut body, "system", system);

    // 2. 采样与生成控制参数
    body.insert(
        "max_tokens".to_string(),
        Value::from(options.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)),
    );
    insert_opt(&mut body, "temperature", options.temperature);
    insert_opt(&mut body, "top_p", options.top_p);
    insert_opt(&mut body, "top_k", options.top_k);
    if !options.stop.is_empty() {
        body.insert("stop_sequences".to_string(), json!(options.stop));
    }
    if let Some(user) = &options.user {
        body.insert("metadata".to_string(), json!({ "user_id": user }));
    }

    // 3. tools 与 tool_choice 原样透传
    insert_opt(&mut body, "tools", input.tools.clone());
    insert_opt(
        &mut body,
        "tool_choice",
        input
            .tool_choice
            .clone()
            .or_else(|| options.tool_choice.clone()),
    );

    body.insert("stream".to_string(), Value::Bool(request.stream));

    // 4. 透传额外字段，调用方优先
    for (key, value) in &input.extra {
        body.insert(key.clone(), value.clone());
    }
    Ok(Value::Object(body))
}

fn convert_message(message: &ChatMessage) -> Result<Value, LLMError> {
    // tool 结果以 user 角色的 tool_result 块回传
    if message.role == Role::tool() {
        let call_id = message
            .tool_call_id
            .clone()
            .ok_or_else(|| LLMError::validation("tool message missing tool_call_id"))?;
        return Ok(json!({
            "role": "user",
            "content": [{
                "type": "tool_result",
                "tool_use_id": call_id,
                "content": message.text(),
            }]
        }));
    }

    let role = if message.role == Role::assistant() {
        "assistant"
    } else {
        "user"
    };
    let content = if message.has_images() {
        Value::Array(message.content.iter().map(convert_content_part).collect())
    } else {
        Value::String(message.text())
    };
    Ok(json!({ "role": role, "content": content }))
}

fn convert_content_part(part: &ContentPart) -> Value {
    match part {
        ContentPart::Text { text } => json!({ "type": "text", "text": text }),
        ContentPart::Image { image } => {
            let source = match image {
                ImageRef::Url { url } => json!({ "type": "url", "url": url }),
                ImageRef::Base64 { data, .. } => json!({
                    "type": "base64",
                    "media_type": image.mime_or_default(),
                    "data": data,
                }),
            };
            json!({ "type": "image", "source": source })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::GenerationOptions;
    use crate::types::AnalysisInput;

    #[test]
    fn system_prompt_is_top_level_and_max_tokens_defaults() {
        let request = ProviderRequest::new(
            AnalysisInput::prompt("Review this diff").with_system_prompt("You are a reviewer"),
        );
        let body = build_anthropic_body(&request, "claude-3-5-sonnet-latest").expect("body");
        assert_eq!(
            body,
            json!({
                "model": "claude-3-5-sonnet-latest",
                "messages": [{ "role": "user", "content": "Review this diff" }],
                "system": "You are a reviewer",
                "max_tokens": 4096,
                "stream": false
            })
        );
    }

    #[test]
    fn system_role_messages_join_the_top_level_system() {
        let request = ProviderRequest::new(
            AnalysisInput::prompt("q")
                .with_system_prompt("first")
                .with_message(ChatMessage::system("second")),
        );
        let body = build_anthropic_body(&request, "m").expect("body");
        assert_eq!(body["system"], "first\n\nsecond");
        assert_eq!(body["messages"].as_array().expect("messages").len(), 1);
    }

    #[test]
    fn system_only_input_becomes_the_user_turn() {
        let request = ProviderRequest::new(AnalysisInput::default().with_system_prompt("ping"));
        let body = build_anthropic_body(&request, "m").expect("body");
        assert_eq!(body["messages"], json!([{ "role": "user", "content": "ping" }]));
        assert!(body.get("system").is_none());
    }

    #[test]
    fn options_map_to_anthropic_names() {
        let mut request = ProviderRequest::new(AnalysisInput::prompt("q"));
        request.generation = GenerationOptions {
            max_tokens: Some(256),
            top_k: Some(20),
            user: Some("u-1".into()),
            ..GenerationOptions::default()
        }
        .with_stop(["\n\nHuman:"]);
        let body = build_anthropic_body(&request, "m").expect("body");
        assert_eq!(body["max_tokens"], 256);
        assert_eq!(body["top_k"], 20);
        assert_eq!(body["stop_sequences"], json!(["\n\nHuman:"]));
        assert_eq!(body["metadata"], json!({ "user_id": "u-1" }));
        assert!(body.get("temperature").is_none());
    }

    #[test]
    fn images_and_tool_results_use_blocks() {
        let request = ProviderRequest::new(
            AnalysisInput::prompt("describe")
                .with_message(ChatMessage::tool_result("toolu_1", "42"))
                .with_image(ImageRef::base64("aGVsbG8=", "image/jpeg")),
        );
        let body = build_anthropic_body(&request, "m").expect("body");
        assert_eq!(
            body["messages"][0],
            json!({
                "role": "user",
                "content": [{ "type": "tool_result", "tool_use_id": "toolu_1", "content": "42" }]
            })
        );
        assert_eq!(
            body["messages"][1]["content"][1],
            json!({
                "type": "image",
                "source": { "type": "base64", "media_type": "image/jpeg", "data": "aGVsbG8=" }
            })
        );
    }
}
