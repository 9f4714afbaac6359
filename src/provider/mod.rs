use std::collections::HashMap;
use std::fmt;
use std::pin::Pin;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_core::Stream;
use futures_util::StreamExt;
use serde_json::Value;
use tracing::debug;

use crate::cancel::CancellationHandle;
use crate::config::{ConfigRegistry, ProviderConfig};
use crate::error::LLMError;
use crate::http::{
    DynHttpTransport, HttpBodyStream, HttpRequest, HttpResponse, HttpStreamResponse, post_json,
    post_json_stream,
};
use crate::options::{GenerationOptions, RequestOptions};
use crate::stream::collect_stream_text;
use crate::types::AnalysisInput;

pub mod anthropic_messages;
pub mod google_gemini;
pub mod ollama;
pub mod openai_chat;

/// The closed set of supported backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Gemini,
    Ollama,
    /// OpenAI-compatible regional backend.
    DeepSeek,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 5] = [
        ProviderKind::OpenAi,
        ProviderKind::Anthropic,
        ProviderKind::Gemini,
        ProviderKind::Ollama,
        ProviderKind::DeepSeek,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
            Self::Ollama => "ollama",
            Self::DeepSeek => "deepseek",
        }
    }

    /// Parses a provider name, mapping an empty name to the registry's default provider.
    ///
    /// # Errors
    ///
    /// Returns [`LLMError::Validation`] for unknown names.
    pub fn resolve(name: &str, registry: &ConfigRegistry) -> Result<Self, LLMError> {
        if name.trim().is_empty() {
            registry.default_provider().parse()
        } else {
            name.parse()
        }
    }

    /// Whether the backend refuses requests without an API key.
    pub fn requires_api_key(self) -> bool {
        !matches!(self, Self::Ollama)
    }

    /// Conventional environment variable holding this backend's key.
    pub fn api_key_env(self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::Gemini => Some("GEMINI_API_KEY"),
            Self::DeepSeek => Some("DEEPSEEK_API_KEY"),
            Self::Ollama => None,
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = LLMError;

    /// Case-insensitive; accepts a few common aliases.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "gemini" | "google" => Ok(Self::Gemini),
            "ollama" | "local" => Ok(Self::Ollama),
            "deepseek" => Ok(Self::DeepSeek),
            other => Err(LLMError::validation(format!(
                "unknown provider '{other}', expected one of: {}",
                ProviderKind::ALL.map(ProviderKind::as_str).join(", ")
            ))),
        }
    }
}

/// One provider exchange, fully resolved from the caller's input and options.
#[derive(Debug, Clone, Default)]
pub struct ProviderRequest {
    /// Falls back to the provider's default model when `None`.
    pub model: Option<String>,
    pub input: AnalysisInput,
    pub generation: GenerationOptions,
    /// Extra headers overlaid on the provider's own.
    pub headers: HashMap<String, String>,
    pub timeout: Option<Duration>,
    pub stream: bool,
    pub include_usage: bool,
}

impl ProviderRequest {
    pub fn new(input: AnalysisInput) -> Self {
        Self {
            input,
            ..Self::default()
        }
    }

    pub fn from_options(input: AnalysisInput, options: &RequestOptions) -> Self {
        Self {
            model: options.model.clone(),
            input,
            generation: options.generation.clone(),
            headers: options.headers.clone(),
            timeout: options.timeout,
            stream: options.stream.unwrap_or(false),
            include_usage: options.include_usage(),
        }
    }

    pub fn streaming(mut self, stream: bool) -> Self {
        self.stream = stream;
        self
    }
}

/// Decoded outcome of a successful exchange.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderReply {
    pub content: String,
    pub reasoning: String,
    pub status: u16,
}

/// Incremental piece of a streamed reply, in emission order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamDelta {
    Content(String),
    Reasoning(String),
}

/// Stream of decoded deltas.
pub type DeltaStream = Pin<Box<dyn Stream<Item = Result<StreamDelta, LLMError>> + Send>>;

mod sealed {
    pub trait Sealed {}

    impl Sealed for super::anthropic_messages::AnthropicMessagesProvider {}
    impl Sealed for super::google_gemini::GoogleGeminiProvider {}
    impl Sealed for super::ollama::OllamaProvider {}
    impl Sealed for super::openai_chat::OpenAiChatProvider {}
}

/// Capability set shared by every backend.
///
/// Implementations only describe their wire format; the exchange itself (`send`,
/// `stream`, `send_streaming`) is common. The trait is sealed: the set of providers is
/// closed and [`build_provider`] matches it exhaustively.
#[async_trait]
pub trait LLMProvider: sealed::Sealed + Send + Sync {
    fn kind(&self) -> ProviderKind;

    fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    fn default_model(&self) -> &str;

    fn transport(&self) -> &DynHttpTransport;

    /// Endpoint for `model`, using the streaming variant when `streaming` is set.
    fn build_url(&self, model: &str, streaming: bool) -> String;

    /// Always contains `Content-Type`; carries the provider's authentication.
    fn build_headers(&self) -> HashMap<String, String>;

    /// JSON body in the provider's schema. Unset options are omitted, never `null`.
    fn build_payload(&self, model: &str, request: &ProviderRequest) -> Result<Value, LLMError>;

    /// Decodes a complete, successful, non-streaming body.
    fn parse_response(&self, body: &str) -> Result<ProviderReply, LLMError>;

    /// Decodes the provider's streaming frames into deltas.
    fn decode_stream(&self, body: HttpBodyStream) -> DeltaStream;

    /// Maps a non-2xx response onto [`LLMError`].
    fn parse_error(&self, status: u16, body: &str, retry_after: Option<Duration>) -> LLMError;

    /// Picks the request model or the default and checks its format.
    fn resolve_model(&self, request: &ProviderRequest) -> Result<String, LLMError> {
        let model = request
            .model
            .as_deref()
            .unwrap_or_else(|| self.default_model())
            .trim()
            .to_string();
        validate_model(&model)?;
        Ok(model)
    }

    /// Performs one non-streaming exchange.
    async fn send(&self, request: &ProviderRequest) -> Result<ProviderReply, LLMError> {
        let model = self.resolve_model(request)?;
        let body = self.build_payload(&model, request)?;
        let url = self.build_url(&model, false);
        let headers = overlay_headers(self.build_headers(), &request.headers);
        debug!(provider = self.name(), model = %model, "dispatching request");

        let outbound = HttpRequest::json(url, headers, &body, request.timeout)?;
        let HttpResponse {
            status,
            headers,
            body,
        } = post_json(self.transport().as_ref(), outbound).await?;
        if !(200..300).contains(&status) {
            let text = String::from_utf8_lossy(&body);
            return Err(self.parse_error(status, &text, retry_after_from_headers(&headers)));
        }
        let text = String::from_utf8(body).map_err(|err| {
            LLMError::provider(self.name(), format!("response body is not UTF-8: {err}"))
        })?;
        let mut reply = self.parse_response(&text)?;
        reply.status = status;
        Ok(reply)
    }

    /// Opens a streaming exchange and returns its decoded deltas.
    async fn stream(&self, request: &ProviderRequest) -> Result<DeltaStream, LLMError> {
        let model = self.resolve_model(request)?;
        let body = self.build_payload(&model, request)?;
        let url = self.build_url(&model, true);
        let headers = overlay_headers(self.build_headers(), &request.headers);
        debug!(provider = self.name(), model = %model, "dispatching streaming request");

        let outbound = HttpRequest::json(url, headers, &body, request.timeout)?;
        let HttpStreamResponse {
            status,
            headers,
            body,
        } = post_json_stream(self.transport().as_ref(), outbound).await?;
        if !(200..300).contains(&status) {
            let text = collect_stream_text(body, self.name()).await;
            return Err(self.parse_error(status, &text, retry_after_from_headers(&headers)));
        }
        Ok(self.decode_stream(body))
    }

    /// Streams and aggregates the deltas, checking `cancel` between frames.
    async fn send_streaming(
        &self,
        request: &ProviderRequest,
        cancel: &CancellationHandle,
    ) -> Result<ProviderReply, LLMError> {
        let mut deltas = self.stream(request).await?;
        let mut reply = ProviderReply {
            status: 200,
            ..ProviderReply::default()
        };
        loop {
            if cancel.is_cancelled() {
                return Err(LLMError::cancelled());
            }
            match deltas.next().await {
                Some(Ok(StreamDelta::Content(text))) => reply.content.push_str(&text),
                Some(Ok(StreamDelta::Reasoning(text))) => reply.reasoning.push_str(&text),
                Some(Err(err)) => return Err(err),
                None => break,
            }
        }
        Ok(reply)
    }
}

/// Thread-safe provider handle.
pub type DynProvider = Arc<dyn LLMProvider>;

/// Builds the provider for `kind` from its configuration.
///
/// # Errors
///
/// Returns [`LLMError::InvalidConfig`] when the base URL, model or required API key is
/// missing or malformed.
pub fn build_provider(
    kind: ProviderKind,
    config: &ProviderConfig,
    transport: DynHttpTransport,
) -> Result<DynProvider, LLMError> {
    config.validate()?;
    let api_key = config.resolve_api_key(kind);
    let required_key = || {
        let key = api_key.clone().ok_or_else(|| {
            LLMError::invalid_config(
                format!("{kind}.api_key"),
                "provider requires an API key (config or environment)",
            )
        })?;
        validate_api_key(kind, &key)?;
        Ok::<String, LLMError>(key)
    };

    let provider: DynProvider = match kind {
        ProviderKind::OpenAi | ProviderKind::DeepSeek => Arc::new(
            openai_chat::OpenAiChatProvider::from_config(kind, config, required_key()?, transport),
        ),
        ProviderKind::Anthropic => Arc::new(
            anthropic_messages::AnthropicMessagesProvider::from_config(
                config,
                required_key()?,
                transport,
            ),
        ),
        ProviderKind::Gemini => Arc::new(google_gemini::GoogleGeminiProvider::from_config(
            config,
            required_key()?,
            transport,
        )),
        ProviderKind::Ollama => Arc::new(ollama::OllamaProvider::from_config(config, transport)?),
    };
    Ok(provider)
}

pub(crate) fn validate_model(model: &str) -> Result<(), LLMError> {
    if model.is_empty() {
        return Err(LLMError::validation("model name must not be empty"));
    }
    if model.chars().any(char::is_whitespace) {
        return Err(LLMError::validation(format!(
            "model name must not contain whitespace: {model:?}"
        )));
    }
    Ok(())
}

pub(crate) fn validate_api_key(kind: ProviderKind, key: &str) -> Result<(), LLMError> {
    if key.is_empty() {
        return Err(LLMError::invalid_config(
            format!("{kind}.api_key"),
            "API key must not be empty",
        ));
    }
    if key.chars().any(|ch| ch.is_whitespace() || ch.is_control()) {
        return Err(LLMError::invalid_config(
            format!("{kind}.api_key"),
            "API key must not contain whitespace or control characters",
        ));
    }
    Ok(())
}

pub(crate) fn overlay_headers(
    mut headers: HashMap<String, String>,
    extra: &HashMap<String, String>,
) -> HashMap<String, String> {
    for (name, value) in extra {
        // Header names are case-insensitive; drop any differently-cased original.
        headers.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
        headers.insert(name.clone(), value.clone());
    }
    headers
}

/// Trims a base URL and appends `/v1` unless it already ends with a version segment.
pub(crate) fn versioned_base(base_url: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if base.ends_with("/v1") || base.ends_with("/v1beta") {
        base.to_string()
    } else {
        format!("{base}/v1")
    }
}

/// Extracts a numeric `Retry-After` header (in seconds) if present.
///
/// HTTP-date values are ignored; vendors use the numeric form.
pub(crate) fn retry_after_from_headers(headers: &HashMap<String, String>) -> Option<Duration> {
    headers
        .iter()
        .find(|(name, _)| name.eq_ignore_ascii_case("retry-after"))
        .and_then(|(_, value)| value.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

/// Inserts `value` under `key` when it is set.
pub(crate) fn insert_opt<T: Into<Value>>(
    body: &mut serde_json::Map<String, Value>,
    key: &str,
    value: Option<T>,
) {
    if let Some(value) = value {
        body.insert(key.to_string(), value.into());
    }
}
