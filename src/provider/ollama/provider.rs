use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde_json::Value;

use crate::config::ProviderConfig;
use crate::error::LLMError;
use crate::http::{DynHttpTransport, HttpBodyStream};
use crate::provider::{DeltaStream, LLMProvider, ProviderKind, ProviderReply, ProviderRequest};

use super::error::parse_ollama_error;
use super::request::build_ollama_body;
use super::response::map_response;
use super::stream::create_stream;

pub(crate) const DEFAULT_BASE_URL: &str = "http://localhost:11434";

/// Which local-inference endpoint to call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OllamaMode {
    /// `/api/chat` with a message list.
    #[default]
    Chat,
    /// `/api/generate` with a flat prompt.
    Generate,
}

impl OllamaMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Generate => "generate",
        }
    }
}

impl fmt::Display for OllamaMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OllamaMode {
    type Err = LLMError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "chat" => Ok(Self::Chat),
            "generate" => Ok(Self::Generate),
            other => Err(LLMError::invalid_config(
                "ollama.extra.mode",
                format!("expected 'chat' or 'generate', got '{other}'"),
            )),
        }
    }
}

/// Local inference server speaking the Ollama HTTP API. No authentication.
pub struct OllamaProvider {
    pub(crate) transport: DynHttpTransport,
    pub(crate) base_url: String,
    pub(crate) default_model: String,
    pub(crate) mode: OllamaMode,
}

impl OllamaProvider {
    pub fn new(transport: DynHttpTransport) -> Self {
        Self {
            transport,
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model: "llama3".to_string(),
            mode: OllamaMode::Chat,
        }
    }

    /// Reads the sub-mode from the `mode` entry of the provider's `extra` settings.
    pub(crate) fn from_config(
        config: &ProviderConfig,
        transport: DynHttpTransport,
    ) -> Result<Self, LLMError> {
        let mode = match config.extra_str("mode") {
            Some(mode) => mode.parse()?,
            None => OllamaMode::Chat,
        };
        Ok(Self::new(transport)
            .with_base_url(config.base_url.clone())
            .with_default_model(config.default_model.clone())
            .with_mode(mode))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }

    pub fn with_mode(mut self, mode: OllamaMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn mode(&self) -> OllamaMode {
        self.mode
    }
}

impl LLMProvider for OllamaProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Ollama
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn transport(&self) -> &DynHttpTransport {
        &self.transport
    }

    /// Ollama streams and answers on the same path; only the body's `stream` flag differs.
    fn build_url(&self, _model: &str, _streaming: bool) -> String {
        let base = self.base_url.trim_end_matches('/');
        format!("{base}/api/{}", self.mode.as_str())
    }

    fn build_headers(&self) -> HashMap<String, String> {
        HashMap::from([("Content-Type".to_string(), "application/json".to_string())])
    }

    fn build_payload(&self, model: &str, request: &ProviderRequest) -> Result<Value, LLMError> {
        build_ollama_body(request, model, self.mode)
    }

    fn parse_response(&self, body: &str) -> Result<ProviderReply, LLMError> {
        map_response(body)
    }

    fn decode_stream(&self, body: HttpBodyStream) -> DeltaStream {
        create_stream(body)
    }

    fn parse_error(&self, status: u16, body: &str, retry_after: Option<Duration>) -> LLMError {
        parse_ollama_error(status, body, retry_after)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::http::reqwest::ReqwestTransport;

    fn provider() -> OllamaProvider {
        OllamaProvider::new(Arc::new(ReqwestTransport::new(reqwest::Client::new())))
    }

    #[test]
    fn sub_mode_selects_the_path() {
        let chat = provider().with_base_url("http://gpu-box:11434/");
        assert_eq!(chat.build_url("llama3", true), "http://gpu-box:11434/api/chat");
        let generate = provider().with_mode(OllamaMode::Generate);
        assert_eq!(
            generate.build_url("llama3", false),
            "http://localhost:11434/api/generate"
        );
    }

    #[test]
    fn no_auth_headers() {
        let headers = provider().build_headers();
        assert_eq!(headers.len(), 1);
        assert_eq!(headers["Content-Type"], "application/json");
    }

    #[test]
    fn mode_parsing() {
        assert_eq!("Generate".parse::<OllamaMode>().expect("mode"), OllamaMode::Generate);
        let err = "complete".parse::<OllamaMode>().expect_err("bad mode");
        assert!(matches!(err, LLMError::InvalidConfig { .. }));
    }
}
