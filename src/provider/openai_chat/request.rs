use serde_json::{Map, Value, json};

use crate::error::LLMError;
use crate::provider::{ProviderRequest, insert_opt};
use crate::types::{ChatMessage, ContentPart, ImageRef, Role};

pub(crate) fn build_openai_body(request: &ProviderRequest, model: &str) -> Result<Value, LLMError> {
    let input = &request.input;
    let options = &request.generation;

    let mut body = Map::new();
    body.insert("model".to_string(), Value::String(model.to_string()));
    body.insert(
        "messages".to_string(),
        Value::Array(convert_messages(request)?),
    );
    insert_opt(&mut body, "temperature", options.temperature);
    insert_opt(&mut body, "max_tokens", options.max_tokens);
    insert_opt(&mut body, "top_p", options.top_p);
    insert_opt(&mut body, "frequency_penalty", options.frequency_penalty);
    insert_opt(&mut body, "presence_penalty", options.presence_penalty);
    if !options.stop.is_empty() {
        body.insert("stop".to_string(), json!(options.stop));
    }
    insert_opt(&mut body, "seed", options.seed);
    if let Some(bias) = &options.logit_bias {
        body.insert("logit_bias".to_string(), json!(bias));
    }
    insert_opt(&mut body, "logprobs", options.logprobs);
    insert_opt(&mut body, "top_logprobs", options.top_logprobs);
    insert_opt(&mut body, "user", options.user.clone());
    insert_opt(&mut body, "parallel_tool_calls", options.parallel_tool_calls);
    insert_opt(&mut body, "service_tier", options.service_tier.clone());
    insert_opt(&mut body, "reasoning_effort", options.reasoning_effort.clone());
    insert_opt(
        &mut body,
        "max_completion_tokens",
        options.max_completion_tokens,
    );
    insert_opt(
        &mut body,
        "response_format",
        input
            .response_format
            .clone()
            .or_else(|| options.response_format.clone()),
    );
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
    if request.stream && request.include_usage {
        body.insert("stream_options".to_string(), json!({ "include_usage": true }));
    }
    for (key, value) in &input.extra {
        body.insert(key.clone(), value.clone());
    }
    Ok(Value::Object(body))
}

fn convert_messages(request: &ProviderRequest) -> Result<Vec<Value>, LLMError> {
    let mut messages = Vec::new();
    if let Some(system) = request
        .input
        .system_prompt
        .as_deref()
        .filter(|text| !text.trim().is_empty())
    {
        messages.push(json!({ "role": "system", "content": system }));
    }
    for message in request.input.conversation() {
        messages.push(convert_message(&message)?);
    }
    Ok(messages)
}

fn convert_message(message: &ChatMessage) -> Result<Value, LLMError> {
    let mut obj = Map::new();
    obj.insert(
        "role".to_string(),
        Value::String(message.role.as_str().to_string()),
    );
    if let Some(name) = &message.name {
        obj.insert("name".to_string(), Value::String(name.clone()));
    }
    if message.role == Role::tool() {
        let call_id = message
            .tool_call_id
            .clone()
            .ok_or_else(|| LLMError::validation("tool message missing tool_call_id"))?;
        obj.insert("tool_call_id".to_string(), Value::String(call_id));
    }

    let content = if message.has_images() {
        Value::Array(message.content.iter().map(convert_content_part).collect())
    } else {
        Value::String(message.text())
    };
    obj.insert("content".to_string(), content);
    Ok(Value::Object(obj))
}

fn convert_content_part(part: &ContentPart) -> Value {
    match part {
        ContentPart::Text { text } => json!({ "type": "text", "text": text }),
        ContentPart::Image { image } => json!({
            "type": "image_url",
            "image_url": { "url": ImageRef::to_url_string(image) }
        }),
    }
}
