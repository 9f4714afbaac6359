use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

use crate::config::ProviderConfig;
use crate::error::LLMError;
use crate::http::{DynHttpTransport, HttpBodyStream};
use crate::provider::{
    DeltaStream, LLMProvider, ProviderKind, ProviderReply, ProviderRequest, versioned_base,
};

use super::error::parse_gemini_error;
use super::request::build_gemini_body;
use super::response::map_response;
use super::stream::create_stream;

pub(crate) const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Google Gemini GenerateContent provider implementation.
///
/// Authenticates with the `x-goog-api-key` header so the key never appears in the URL.
pub struct GoogleGeminiProvider {
    pub(crate) transport: DynHttpTransport,
    pub(crate) base_url: String,
    pub(crate) api_key: String,
    pub(crate) default_model: String,
}

impl GoogleGeminiProvider {
    /// Creates a provider that targets the default Google Generative Language endpoint.
    pub fn new(transport: DynHttpTransport, api_key: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            default_model: "gemini-1.5-flash".to_string(),
        }
    }

    pub(crate) fn from_config(
        config: &ProviderConfig,
        api_key: String,
        transport: DynHttpTransport,
    ) -> Self {
        Self::new(transport, api_key)
            .with_base_url(config.base_url.clone())
            .with_default_model(config.default_model.clone())
    }

    /// Overrides the base URL, making it easier to point at proxies or compatibility layers.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Sets the model used when the request omits one, such as `gemini-2.0-flash`.
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }
}

impl LLMProvider for GoogleGeminiProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn transport(&self) -> &DynHttpTransport {
        &self.transport
    }

    fn build_url(&self, model: &str, streaming: bool) -> String {
        let model = model.strip_prefix("models/").unwrap_or(model);
        let base = versioned_base(&self.base_url);
        if streaming {
            format!("{base}/models/{model}:streamGenerateContent?alt=sse")
        } else {
            format!("{base}/models/{model}:generateContent")
        }
    }

    fn build_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("x-goog-api-key".to_string(), self.api_key.clone());
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers
    }

    fn build_payload(&self, _model: &str, request: &ProviderRequest) -> Result<Value, LLMError> {
        build_gemini_body(request)
    }

    fn parse_response(&self, body: &str) -> Result<ProviderReply, LLMError> {
        map_response(body)
    }

    fn decode_stream(&self, body: HttpBodyStream) -> DeltaStream {
        create_stream(body)
    }

    fn parse_error(&self, status: u16, body: &str, retry_after: Option<Duration>) -> LLMError {
        parse_gemini_error(status, body, retry_after)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::http::reqwest::ReqwestTransport;

    fn provider() -> GoogleGeminiProvider {
        GoogleGeminiProvider::new(
            Arc::new(ReqwestTransport::new(reqwest::Client::new())),
            "AIza-test",
        )
    }

    #[test]
    fn streaming_url_carries_sse_marker() {
        let provider = provider();
        assert_eq!(
            provider.build_url("gemini-1.5-pro", true),
            "https://generativelanguage.googleapis.com/v1/models/gemini-1.5-pro:streamGenerateContent?alt=sse"
        );
        assert_eq!(
            provider.build_url("models/gemini-1.5-pro", false),
            "https://generativelanguage.googleapis.com/v1/models/gemini-1.5-pro:generateContent"
        );
    }

    #[test]
    fn beta_base_url_is_respected() {
        let provider =
            provider().with_base_url("https://generativelanguage.googleapis.com/v1beta/");
        assert_eq!(
            provider.build_url("gemini-2.0-flash", false),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash:generateContent"
        );
    }

    #[test]
    fn api_key_travels_in_dedicated_header() {
        let headers = provider().build_headers();
        assert_eq!(headers["x-goog-api-key"], "AIza-test");
        assert_eq!(headers["Content-Type"], "application/json");
        assert!(!headers.contains_key("Authorization"));
        assert!(!provider().build_url("m", true).contains("AIza-test"));
    }
}
