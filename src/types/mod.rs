//! Provider-agnostic request and result types.
//!
//! These types normalize provider-specific payloads so the rest of the crate can stay
//! agnostic of individual API differences.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LLMError;

/// Chat role string compatible with provider-specific semantics.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Role(pub String);

impl Role {
    pub fn system() -> Self {
        Self("system".to_string())
    }

    pub fn user() -> Self {
        Self("user".to_string())
    }

    pub fn assistant() -> Self {
        Self("assistant".to_string())
    }

    pub fn tool() -> Self {
        Self("tool".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Reference to an image, either inline bytes (base64) or a URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageRef {
    /// Public URL accessible by the provider.
    Url { url: String },
    /// Base64-encoded inline payload.
    Base64 {
        data: String,
        #[serde(default)]
        mime_type: Option<String>,
    },
}

impl ImageRef {
    pub fn url(url: impl Into<String>) -> Self {
        Self::Url { url: url.into() }
    }

    pub fn base64(data: impl Into<String>, mime_type: impl Into<String>) -> Self {
        Self::Base64 {
            data: data.into(),
            mime_type: Some(mime_type.into()),
        }
    }

    pub(crate) fn mime_or_default(&self) -> &str {
        match self {
            Self::Base64 {
                mime_type: Some(mime),
                ..
            } => mime,
            _ => "image/png",
        }
    }

    /// `data:` URL form used by OpenAI-compatible backends for inline images.
    pub(crate) fn to_url_string(&self) -> String {
        match self {
            Self::Url { url } => url.clone(),
            Self::Base64 { data, .. } => {
                format!("data:{};base64,{data}", self.mime_or_default())
            }
        }
    }
}

/// One element of a message body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    Image { image: ImageRef },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn image(image: ImageRef) -> Self {
        Self::Image { image }
    }
}

/// Normalized chat message shared across providers.
///
/// # Examples
///
/// ```
/// use llm_bridge::types::{ChatMessage, ContentPart, ImageRef, Role};
///
/// let msg = ChatMessage::user("Describe this image")
///     .with_part(ContentPart::image(ImageRef::url("https://example.com/cat.png")));
/// assert_eq!(msg.role, Role::user());
/// assert_eq!(msg.content.len(), 2);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(default)]
    pub content: Vec<ContentPart>,
    #[serde(default)]
    pub name: Option<String>,
    /// Correlates a `tool` message with the call it answers.
    #[serde(default)]
    pub tool_call_id: Option<String>,
}

impl ChatMessage {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![ContentPart::text(text)],
            name: None,
            tool_call_id: None,
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self::new(Role::system(), text)
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::user(), text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::new(Role::assistant(), text)
    }

    pub fn tool_result(call_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            ..Self::new(Role::tool(), text)
        }
    }

    pub fn with_part(mut self, part: ContentPart) -> Self {
        self.content.push(part);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Concatenated text parts, separated by newlines.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                ContentPart::Image { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn images(&self) -> impl Iterator<Item = &ImageRef> {
        self.content.iter().filter_map(|part| match part {
            ContentPart::Image { image } => Some(image),
            ContentPart::Text { .. } => None,
        })
    }

    pub fn has_images(&self) -> bool {
        self.images().next().is_some()
    }
}

/// Provider-agnostic description of one request.
///
/// The conversation a provider sees is: the system prompt (where the backend supports
/// one), then `messages` in order, then `user_message` carrying `images`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisInput {
    #[serde(default)]
    pub system_prompt: Option<String>,
    /// Single-shot user prompt appended after `messages`.
    #[serde(default)]
    pub user_message: Option<String>,
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
    /// Images attached to `user_message`.
    #[serde(default)]
    pub images: Vec<ImageRef>,
    /// Tool definitions passed through in the provider's own schema.
    #[serde(default)]
    pub tools: Option<Value>,
    #[serde(default)]
    pub tool_choice: Option<Value>,
    #[serde(default)]
    pub response_format: Option<Value>,
    /// Provider-specific top-level payload fields.
    #[serde(default)]
    pub extra: HashMap<String, Value>,
}

impl AnalysisInput {
    /// Input consisting of a single user prompt.
    pub fn prompt(text: impl Into<String>) -> Self {
        Self {
            user_message: Some(text.into()),
            ..Self::default()
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_message(mut self, message: ChatMessage) -> Self {
        self.messages.push(message);
        self
    }

    pub fn with_image(mut self, image: ImageRef) -> Self {
        self.images.push(image);
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Rejects inputs that carry nothing to send.
    ///
    /// # Errors
    ///
    /// Returns [`LLMError::Validation`] when the system prompt, the user message and the
    /// message list are all empty, or when a `tool` message lacks its correlation id.
    pub fn validate(&self) -> Result<(), LLMError> {
        let has_system = self
            .system_prompt
            .as_deref()
            .is_some_and(|text| !text.trim().is_empty());
        let has_user = self
            .user_message
            .as_deref()
            .is_some_and(|text| !text.trim().is_empty());
        if !has_system && !has_user && self.messages.is_empty() {
            return Err(LLMError::validation(
                "input requires a system prompt, a user message or at least one chat message",
            ));
        }
        if let Some(message) = self
            .messages
            .iter()
            .find(|message| message.role == Role::tool() && message.tool_call_id.is_none())
        {
            return Err(LLMError::validation(format!(
                "tool message is missing tool_call_id: {:?}",
                message.text()
            )));
        }
        Ok(())
    }

    /// The full conversation in order, without the system prompt.
    ///
    /// The single-shot user message becomes a trailing user message carrying `images`.
    pub fn conversation(&self) -> Vec<ChatMessage> {
        let mut messages = self.messages.clone();
        let user_text = self.user_message.clone().filter(|text| !text.is_empty());
        if user_text.is_some() || !self.images.is_empty() {
            let mut message = ChatMessage {
                role: Role::user(),
                content: Vec::new(),
                name: None,
                tool_call_id: None,
            };
            if let Some(text) = user_text {
                message.content.push(ContentPart::text(text));
            }
            message
                .content
                .extend(self.images.iter().cloned().map(ContentPart::image));
            messages.push(message);
        }
        messages
    }

    /// System prompt plus every `system` role message, joined by blank lines.
    pub(crate) fn combined_system_prompt(&self) -> Option<String> {
        let mut parts: Vec<String> = self
            .system_prompt
            .iter()
            .filter(|text| !text.trim().is_empty())
            .cloned()
            .collect();
        parts.extend(
            self.messages
                .iter()
                .filter(|message| message.role == Role::system())
                .map(ChatMessage::text),
        );
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }
}

/// Provider-agnostic outcome of one call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub success: bool,
    /// Final content with reasoning removed.
    pub content: String,
    /// Reasoning ("think") text; empty when the model produced none.
    pub reasoning: String,
    /// Empty on success.
    pub error_message: String,
    /// HTTP-equivalent status code.
    pub status_code: u16,
    /// Provider that served (or failed) the call.
    #[serde(default)]
    pub provider: String,
    /// Number of attempts made, zero when the call never reached the network.
    #[serde(default)]
    pub attempts: u32,
}

impl AnalysisResult {
    pub fn success(content: impl Into<String>, reasoning: impl Into<String>, status: u16) -> Self {
        Self {
            success: true,
            content: content.into(),
            reasoning: reasoning.into(),
            error_message: String::new(),
            status_code: status,
            provider: String::new(),
            attempts: 0,
        }
    }

    pub fn failure(message: impl Into<String>, status: u16) -> Self {
        Self {
            success: false,
            content: String::new(),
            reasoning: String::new(),
            error_message: message.into(),
            status_code: status,
            provider: String::new(),
            attempts: 0,
        }
    }

    pub fn from_error(error: &LLMError) -> Self {
        Self::failure(error.to_string(), error.status_code())
    }

    /// Whether this failure came from a cancellation.
    pub fn is_cancelled(&self) -> bool {
        !self.success && self.status_code == 499
    }

    pub(crate) fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub(crate) fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}
