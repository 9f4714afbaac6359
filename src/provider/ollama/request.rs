use serde_json::{Map, Value, json};

use crate::error::LLMError;
use crate::provider::{ProviderRequest, insert_opt};
use crate::types::{AnalysisInput, ChatMessage, ImageRef, Role};

use super::provider::OllamaMode;

pub(crate) fn build_ollama_body(
    request: &ProviderRequest,
    model: &str,
    mode: OllamaMode,
) -> Result<Value, LLMError> {
    let input = &request.input;
    let mut body = Map::new();
    body.insert("model".to_string(), Value::String(model.to_string()));

    match mode {
        OllamaMode::Chat => {
            body.insert("messages".to_string(), Value::Array(chat_messages(input)?));
        }
        OllamaMode::Generate => {
            body.insert("prompt".to_string(), Value::String(flat_prompt(input)));
            insert_opt(&mut body, "system", input.combined_system_prompt());
            let images = input
                .conversation()
                .iter()
                .flat_map(|message| message.images().cloned().collect::<Vec<_>>())
                .map(|image| base64_image(&image))
                .collect::<Result<Vec<_>, _>>()?;
            if !images.is_empty() {
                body.insert("images".to_string(), json!(images));
            }
        }
    }

    body.insert("stream".to_string(), Value::Bool(request.stream));
    let options = build_options(request);
    if !options.is_empty() {
        body.insert("options".to_string(), Value::Object(options));
    }
    insert_opt(&mut body, "format", response_format(request));
    if mode == OllamaMode::Chat {
        insert_opt(&mut body, "tools", input.tools.clone());
    }

    for (key, value) in &input.extra {
        body.insert(key.clone(), value.clone());
    }
    Ok(Value::Object(body))
}

fn chat_messages(input: &AnalysisInput) -> Result<Vec<Value>, LLMError> {
    let mut messages = Vec::new();
    if let Some(system) = input
        .system_prompt
        .as_deref()
        .filter(|text| !text.trim().is_empty())
    {
        messages.push(json!({ "role": "system", "content": system }));
    }
    for message in input.conversation() {
        messages.push(chat_message(&message)?);
    }
    Ok(messages)
}

fn chat_message(message: &ChatMessage) -> Result<Value, LLMError> {
    let mut obj = Map::new();
    obj.insert(
        "role".to_string(),
        Value::String(message.role.as_str().to_string()),
    );
    obj.insert("content".to_string(), Value::String(message.text()));
    let images = message
        .images()
        .map(base64_image)
        .collect::<Result<Vec<_>, _>>()?;
    if !images.is_empty() {
        obj.insert("images".to_string(), json!(images));
    }
    Ok(Value::Object(obj))
}

/// The single-shot user message, or the conversation folded into `role: text` lines.
fn flat_prompt(input: &AnalysisInput) -> String {
    if let Some(text) = input
        .user_message
        .as_deref()
        .filter(|text| !text.trim().is_empty())
    {
        if input.messages.is_empty() {
            return text.to_string();
        }
    }
    input
        .conversation()
        .iter()
        .filter(|message| message.role != Role::system())
        .map(|message| format!("{}: {}", message.role.as_str(), message.text()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

fn base64_image(image: &ImageRef) -> Result<String, LLMError> {
    match image {
        ImageRef::Base64 { data, .. } => Ok(data.clone()),
        ImageRef::Url { url } => Err(LLMError::validation(format!(
            "ollama accepts only base64 images, got URL {url}"
        ))),
    }
}

fn build_options(request: &ProviderRequest) -> Map<String, Value> {
    let options = &request.generation;
    let mut map = Map::new();
    insert_opt(&mut map, "temperature", options.temperature);
    insert_opt(&mut map, "top_p", options.top_p);
    insert_opt(&mut map, "top_k", options.top_k);
    insert_opt(&mut map, "min_p", options.min_p);
    insert_opt(&mut map, "num_predict", options.max_tokens);
    insert_opt(&mut map, "seed", options.seed);
    if !options.stop.is_empty() {
        map.insert("stop".to_string(), json!(options.stop));
    }
    insert_opt(&mut map, "frequency_penalty", options.frequency_penalty);
    insert_opt(&mut map, "presence_penalty", options.presence_penalty);
    map
}

/// `{"type":"json_object"}` becomes `"json"`; a `json_schema` format passes its schema.
fn response_format(request: &ProviderRequest) -> Option<Value> {
    let format = request
        .input
        .response_format
        .as_ref()
        .or(request.generation.response_format.as_ref())?;
    match format.get("type").and_then(Value::as_str) {
        Some("json_object") => Some(Value::String("json".to_string())),
        Some("json_schema") => format
            .get("json_schema")
            .and_then(|schema| schema.get("schema"))
            .cloned(),
        Some(_) => None,
        // Already in Ollama's own shape ("json" or a raw schema).
        None => Some(format.clone()),
    }
}
