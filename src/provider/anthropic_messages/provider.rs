use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;

use crate::config::ProviderConfig;
use crate::error::LLMError;
use crate::http::{DynHttpTransport, HttpBodyStream};
use crate::provider::{
    DeltaStream, LLMProvider, ProviderKind, ProviderReply, ProviderRequest, versioned_base,
};

use super::error::parse_anthropic_error;
use super::request::build_anthropic_body;
use super::response::map_response;
use super::stream::create_stream;

pub(crate) const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_VERSION: &str = "2023-06-01";

/// Anthropic Messages Provider（兼容 Claude 3.x Messages API）
pub struct AnthropicMessagesProvider {
    pub(crate) transport: DynHttpTransport,
    pub(crate) base_url: String,
    pub(crate) api_key: String,
    pub(crate) version: String,
    pub(crate) beta: Option<String>,
    pub(crate) default_model: String,
}

impl AnthropicMessagesProvider {
    /// 使用默认 base_url 与 anthropic-version 创建 Provider
    pub fn new(transport: DynHttpTransport, api_key: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            version: DEFAULT_VERSION.to_string(),
            beta: None,
            default_model: "claude-3-5-sonnet-latest".to_string(),
        }
    }

    pub(crate) fn from_config(
        config: &ProviderConfig,
        api_key: String,
        transport: DynHttpTransport,
    ) -> Self {
        let mut provider = Self::new(transport, api_key)
            .with_base_url(config.base_url.clone())
            .with_default_model(config.default_model.clone());
        if let Some(version) = config.extra_str("version") {
            provider = provider.with_version(version);
        }
        if let Some(beta) = config.extra_str("beta") {
            provider = provider.with_beta(beta);
        }
        provider
    }

    /// 自定义 base_url，便于接入代理或兼容层
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// 自定义 Anthropic API 版本（anthropic-version）
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// 设置 anthropic-beta 头，支持逗号分隔的 beta 列表
    pub fn with_beta(mut self, beta: impl Into<String>) -> Self {
        self.beta = Some(beta.into());
        self
    }

    /// 设置默认模型名称
    pub fn with_default_model(mut self, model: impl Into<String>) -> Self {
        self.default_model = model.into();
        self
    }
}

impl LLMProvider for AnthropicMessagesProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }

    fn default_model(&self) -> &str {
        &self.default_model
    }

    fn transport(&self) -> &DynHttpTransport {
        &self.transport
    }

    fn build_url(&self, _model: &str, _streaming: bool) -> String {
        format!("{}/messages", versioned_base(&self.base_url))
    }

    fn build_headers(&self) -> HashMap<String, String> {
        let mut headers = HashMap::new();
        headers.insert("x-api-key".to_string(), self.api_key.clone());
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        headers.insert("Accept".to_string(), "application/json".to_string());
        headers.insert("anthropic-version".to_string(), self.version.clone());
        if let Some(beta) = &self.beta {
            headers.insert("anthropic-beta".to_string(), beta.clone());
        }
        headers
    }

    fn build_payload(&self, model: &str, request: &ProviderRequest) -> Result<Value, LLMError> {
        build_anthropic_body(request, model)
    }

    fn parse_response(&self, body: &str) -> Result<ProviderReply, LLMError> {
        map_response(body)
    }

    fn decode_stream(&self, body: HttpBodyStream) -> DeltaStream {
        create_stream(body)
    }

    fn parse_error(&self, status: u16, body: &str, retry_after: Option<Duration>) -> LLMError {
        parse_anthropic_error(status, body, retry_after)
    }
}
