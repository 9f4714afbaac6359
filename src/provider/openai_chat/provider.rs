use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

use crate::config::ProviderConfig;
use crate::error::LLMError;
use crate::http::{DynHttpTransport, HttpBodyStream};
use crate::provider::{
    DeltaStream, LLMProvider, ProviderKind, ProviderReply, ProviderRequest, versioned_base,
};

use super::error::parse_openai_error;
use super::request::build_openai_body;
use super::response::map_response;
use super::stream::create_stream;

pub(crate) const OPENAI_BASE_URL: &str = "https://api.openai.com";
pub(crate) const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";

/// OpenAI Chat Completions provider.
///
/// The same wire format serves the DeepSeek regional backend; only the base URL, the
/// default model and the reported [`ProviderKind`] differ.
pub struct OpenAiChatProvider {
    pub(crate) kind: ProviderKind,
    pub(crate) transport: DynHttpTransport,
    pub(crate) base_url: String,
    pub(crate) api_key: String,
    pub(crate) organization: Option<String>,
    pub(crate) project: Option<String>,
    pub(crate) default_model: String,
}

impl OpenAiChatProvider {
    /// Creates an OpenAI provider with the default base URL.
    pub fn new(transport: DynHttpTransport, api_key: impl Into<String>) -> Self {
        Self {
            kind: ProviderKind::OpenAi,
            transport,
            base_url: OPENAI_BASE_URL.to_string(),
            api_key: api_key.into(),
            organization: None,
            project: None,
            default_model: "gpt-4o-mini".to_string(),
        }
    }

    /// Creates a DeepSeek provider; identical payloads, different host.
    pub fn deepseek(transport: DynHttpTransport, api_key: impl Into<String>) -> Self {
        Self {
            kind: ProviderKind::DeepSeek,
            base_url: DEEPSEEK_BASE_URL.to_string(),
            default_model: "deepseek-chat".to_string(),
            ..Self::new(transport, api_key)
        }
    }

    pub(crate) fn from_config(
        kind: ProviderKind,
        config: &ProviderConfig,
        api_key: String,
        transport: DynHttpTransport,
    ) -> Self {
        let mut provider = match kind {
            ProviderKind::DeepSeek => Self::deepseek(transport, api_key),
            _ => Self::new(transport, api_key),
        }
        .with_base_url(config.base_url.clone())
        .with_default_model(config.default_model.clone());
        if let Some(org) = config.extra_str("organization") {
            provider = provider.with_organization(org);
        }
        if let Some(project) = config.extra_str("project") {
            provider = provider.with_project(project);
        }
        provider
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_organization(mut self, organization: impl Into<String>) -> Self {
        self.organization = Some(organization.into());
        self
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }
}

impl LLMProvider for OpenAiChatProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn transport(&self) -> &DynHttpTransport {
        &self.transport
    }

    fn build_url(&self, _model: &str, _streaming: bool) -> String {
        format!("{}/chat/completions", versioned_base(&self.base_url))
    }

    fn build_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert(
            "Authorization".to_string(),
            format!("Bearer {}", self.api_key),
        );
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert("Accept".to_string(), "application/json".to_string());
        if let Some(org) = &self.organization {
            headers.insert("OpenAI-Organization".to_string(), org.clone());
        }
        if let Some(project) = &self.project {
            headers.insert("OpenAI-Project".to_string(), project.clone());
        }
        headers
    }

    fn build_payload(&self, model: &str, request: &ProviderRequest) -> Result<Value, LLMError> {
        build_openai_body(request, model)
    }

    fn parse_response(&self, body: &str) -> Result<ProviderReply, LLMError> {
        map_response(body, self.name())
    }

    fn decode_stream(&self, body: HttpBodyStream) -> DeltaStream {
        create_stream(body, self.name())
    }

    fn parse_error(&self, status: u16, body: &str, retry_after: Option<Duration>) -> LLMError {
        parse_openai_error(self.name(), status, body, retry_after)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::http::reqwest::ReqwestTransport;
    use crate::types::AnalysisInput;

    fn transport() -> DynHttpTransport {
        Arc::new(ReqwestTransport::new(reqwest::Client::new()))
    }

    #[test]
    fn endpoint_and_bearer_header() {
        let provider = OpenAiChatProvider::new(transport(), "sk-test");
        assert_eq!(
            provider.build_url("gpt-4o-mini", false),
            "https://api.openai.com/v1/chat/completions"
        );
        let headers = provider.build_headers();
        assert_eq!(headers["Authorization"], "Bearer sk-test");
        assert_eq!(headers["Content-Type"], "application/json");
    }

    #[test]
    fn deepseek_reuses_shape_with_its_own_host() {
        let provider = OpenAiChatProvider::deepseek(transport(), "ds-key");
        assert_eq!(provider.name(), "deepseek");
        assert_eq!(
            provider.build_url("deepseek-chat", true),
            "https://api.deepseek.com/v1/chat/completions"
        );
        assert_eq!(provider.build_headers()["Authorization"], "Bearer ds-key");

        let request = ProviderRequest::new(AnalysisInput::prompt("hi"));
        let openai = OpenAiChatProvider::new(transport(), "k");
        assert_eq!(
            provider.build_payload("m", &request).expect("deepseek body"),
            openai.build_payload("m", &request).expect("openai body")
        );
    }

    #[test]
    fn base_url_with_version_segment_is_not_doubled() {
        let provider =
            OpenAiChatProvider::new(transport(), "k").with_base_url("http://gateway.local/v1/");
        assert_eq!(
            provider.build_url("m", false),
            "http://gateway.local/v1/chat/completions"
        );
    }
}
