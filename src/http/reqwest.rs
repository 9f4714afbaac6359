use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, RequestBuilder, Response};

use crate::error::LLMError;

use super::{HttpBodyStream, HttpRequest, HttpResponse, HttpStreamResponse, HttpTransport};

const USER_AGENT: &str = concat!("llm-bridge/", env!("CARGO_PKG_VERSION"));

/// reqwest 实现的默认 Transport（rustls）
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// 使用调用方自行配置的 `reqwest::Client`
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a client with the crate's user agent.
    ///
    /// # Errors
    ///
    /// Returns [`LLMError::Transport`] when the TLS backend cannot be initialized.
    pub fn default_client() -> Result<Self, LLMError> {
        Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map(Self::new)
            .map_err(|err| LLMError::transport(format!("failed to create reqwest client: {err}")))
    }

    fn prepare(&self, request: HttpRequest) -> Result<(RequestBuilder, Option<Duration>), LLMError> {
        let HttpRequest {
            url,
            headers,
            body,
            timeout,
        } = request;
        let mut header_map = HeaderMap::with_capacity(headers.len());
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| LLMError::validation(format!("invalid header name: {err}")))?;
            // 不回显 value，可能是密钥
            let value = HeaderValue::from_str(&value)
                .map_err(|_| LLMError::validation(format!("invalid header value for {name}")))?;
            header_map.insert(name, value);
        }

        let mut builder = self.client.post(url).headers(header_map);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = body {
            builder = builder.body(body);
        }
        Ok((builder, timeout))
    }

    async fn dispatch(&self, request: HttpRequest) -> Result<(u16, HashMap<String, String>, Response), LLMError> {
        let (builder, timeout) = self.prepare(request)?;
        let response = builder
            .send()
            .await
            .map_err(|err| map_reqwest_error(err, timeout))?;
        let status = response.status().as_u16();
        let headers = lowercase_headers(response.headers());
        Ok((status, headers, response))
    }
}

/// 响应头统一转为小写键，非 ASCII 值丢弃
fn lowercase_headers(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_ascii_lowercase(), value.to_string()))
        })
        .collect()
}

fn map_reqwest_error(err: reqwest::Error, timeout: Option<Duration>) -> LLMError {
    match timeout {
        Some(after) if err.is_timeout() => LLMError::Timeout { after },
        _ => LLMError::transport(err.to_string()),
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, LLMError> {
        let timeout = request.timeout;
        let (status, headers, response) = self.dispatch(request).await?;
        let body = response
            .bytes()
            .await
            .map_err(|err| map_reqwest_error(err, timeout))?
            .to_vec();
        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse, LLMError> {
        let (status, headers, response) = self.dispatch(request).await?;
        let body: HttpBodyStream = Box::pin(response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|err| LLMError::StreamClosed {
                    message: err.to_string(),
                })
        }));
        Ok(HttpStreamResponse {
            status,
            headers,
            body,
        })
    }
}
