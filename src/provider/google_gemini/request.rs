use serde_json::{Map, Value, json};

use crate::error::LLMError;
use crate::provider::{ProviderRequest, insert_opt};
use crate::types::{ChatMessage, ContentPart, ImageRef, Role};

/// 构建 Google Gemini GenerateContent 请求体
///
/// Gemini 使用路径参数携带模型名称：`POST /v1/models/{model}:generateContent`，
/// 因此 `model` 不会出现在 body 中。
pub(crate) fn build_gemini_body(request: &ProviderRequest) -> Result<Value, LLMError> {
    let input = &request.input;
    let mut body = Map::new();

    // 1. system 折叠为 systemInstruction，其余进入 contents
    let mut system = input.combined_system_prompt();
    let mut contents = Vec::new();
    for message in input.conversation() {
        if message.role == Role::system() {
            continue;
        }
        contents.push(convert_message(&message)?);
    }
    if contents.is_empty() {
        let text = system
            .take()
            .ok_or_else(|| LLMError::validation("Gemini request has nothing to send"))?;
        contents.push(json!({ "role": "user", "parts": [{ "text": text }] }));
    }
    body.insert("contents".to_string(), Value::Array(contents));
    if let Some(system) = system {
        body.insert(
            "systemInstruction".to_string(),
            json!({ "parts": [{ "text": system }] }),
        );
    }

    // 2. 采样与生成配置 -> generationConfig，全部为空时省略
    let generation = build_generation_config(request);
    if !generation.is_empty() {
        body.insert("generationConfig".to_string(), Value::Object(generation));
    }

    // 3. 工具与 toolConfig 原样透传
    insert_opt(&mut body, "tools", input.tools.clone());
    insert_opt(
        &mut body,
        "toolConfig",
        input
            .tool_choice
            .clone()
            .or_else(|| request.generation.tool_choice.clone()),
    );

    // 4. 额外 provider 配置（如 safetySettings、cachedContent 等），透传到顶层
    for (key, value) in &input.extra {
        body.insert(key.clone(), value.clone());
    }
    Ok(Value::Object(body))
}

fn build_generation_config(request: &ProviderRequest) -> Map<String, Value> {
    let options = &request.generation;
    let mut config = Map::new();
    insert_opt(&mut config, "temperature", options.temperature);
    insert_opt(&mut config, "topP", options.top_p);
    insert_opt(&mut config, "topK", options.top_k);
    insert_opt(&mut config, "maxOutputTokens", options.max_tokens);
    if !options.stop.is_empty() {
        config.insert("stopSequences".to_string(), json!(options.stop));
    }
    insert_opt(&mut config, "seed", options.seed);
    insert_opt(&mut config, "presencePenalty", options.presence_penalty);
    insert_opt(&mut config, "frequencyPenalty", options.frequency_penalty);

    // OpenAI 风格的 response_format 映射为 responseMimeType
    let format = request
        .input
        .response_format
        .as_ref()
        .or(options.response_format.as_ref());
    if let Some(kind) = format.and_then(|value| value.get("type")).and_then(Value::as_str) {
        if kind == "json_object" || kind == "json_schema" {
            config.insert(
                "responseMimeType".to_string(),
                Value::String("application/json".to_string()),
            );
        }
    }
    config
}

/// 将 ChatMessage 转换为 Gemini Content；assistant 映射为 model
fn convert_message(message: &ChatMessage) -> Result<Value, LLMError> {
    if message.role == Role::tool() {
        let call_id = message
            .tool_call_id
            .clone()
            .ok_or_else(|| LLMError::validation("tool message missing tool_call_id"))?;
        let name = message.name.clone().unwrap_or(call_id);
        return Ok(json!({
            "role": "user",
            "parts": [{
                "functionResponse": {
                    "name": name,
                    "response": { "content": message.text() }
                }
            }]
        }));
    }

    let role = if message.role == Role::assistant() {
        "model"
    } else {
        "user"
    };
    let parts: Vec<Value> = message.content.iter().map(convert_content_part).collect();
    Ok(json!({ "role": role, "parts": parts }))
}

fn convert_content_part(part: &ContentPart) -> Value {
    match part {
        ContentPart::Text { text } => json!({ "text": text }),
        ContentPart::Image { image } => match image {
            ImageRef::Url { url } => json!({
                "fileData": {
                    "mimeType": image.mime_or_default(),
                    "fileUri": url,
                }
            }),
            ImageRef::Base64 { data, .. } => json!({
                "inlineData": {
                    "mimeType": image.mime_or_default(),
                    "data": data,
                }
            }),
        },
    }
}
