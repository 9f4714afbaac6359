//! Transport primitive: one HTTP exchange, optionally with a streaming body.
//!
//! Providers never talk to an HTTP client directly. They build an [`HttpRequest`] and hand
//! it to a [`HttpTransport`]; [`reqwest::ReqwestTransport`] is the stock implementation.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_core::Stream;
use serde::Serialize;
use tracing::debug;

use crate::error::LLMError;
use crate::redact::{sanitize_headers, sanitize_url};

/// Outbound JSON POST shared across providers.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Vec<u8>>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// Builds a POST request with a JSON request body.
    ///
    /// # Examples
    ///
    /// ```
    /// use llm_bridge::http::HttpRequest;
    ///
    /// let request = HttpRequest::post_json("https://example.com", br"{}".to_vec());
    /// assert!(request.timeout.is_none());
    /// assert_eq!(request.headers.get("Content-Type"), Some(&"application/json".to_string()));
    /// ```
    pub fn post_json(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::from([("Content-Type".to_string(), "application/json".to_string())]),
            body: Some(body),
            timeout: None,
        }
    }

    /// Replaces the request headers after construction.
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }

    /// Sets a per-request timeout enforced by the transport.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// The request body as UTF-8, for assertions and debugging.
    pub fn body_text(&self) -> Option<&str> {
        self.body
            .as_deref()
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
    }
}

/// Minimal HTTP response representation.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// HTTP response that carries a streaming body.
pub struct HttpStreamResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: HttpBodyStream,
}

/// Alias for the body stream returned by [`HttpTransport::send_stream`].
pub type HttpBodyStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, LLMError>> + Send>>;

/// Transport abstraction used to decouple providers from the concrete HTTP client.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends a request and resolves when the full response is available.
    ///
    /// # Errors
    ///
    /// Implementations map connection, DNS and TLS failures to [`LLMError::Transport`].
    /// Non-2xx statuses are *not* errors at this layer.
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, LLMError>;

    /// Sends a request and returns the body as a stream of raw chunks.
    async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse, LLMError>;
}

/// Thread-safe handle to a transport implementation.
pub type DynHttpTransport = Arc<dyn HttpTransport>;

impl HttpRequest {
    /// Serializes `body` and assembles a complete request.
    ///
    /// `headers` replace the default `Content-Type` entry wholesale, so callers pass
    /// their own content type.
    ///
    /// # Errors
    ///
    /// Returns [`LLMError::Validation`] when `body` cannot be serialized.
    pub fn json<T: Serialize>(
        url: impl Into<String>,
        headers: HashMap<String, String>,
        body: &T,
        timeout: Option<Duration>,
    ) -> Result<Self, LLMError> {
        let payload = serde_json::to_vec(body)
            .map_err(|err| LLMError::validation(format!("failed to serialize request: {err}")))?;
        Ok(Self::post_json(url, payload)
            .with_headers(headers)
            .with_timeout(timeout))
    }

    fn log(&self, streaming: bool) {
        debug!(
            url = %sanitize_url(&self.url),
            headers = ?sanitize_headers(&self.headers),
            body_bytes = self.body.as_ref().map_or(0, Vec::len),
            streaming,
            "sending request"
        );
    }
}

/// Sends `request` through `transport` after logging it with credentials redacted.
///
/// # Errors
///
/// Forwards whatever [`HttpTransport::send`] reports.
pub async fn post_json(
    transport: &dyn HttpTransport,
    request: HttpRequest,
) -> Result<HttpResponse, LLMError> {
    request.log(false);
    transport.send(request).await
}

/// Streaming counterpart of [`post_json`].
///
/// # Errors
///
/// Forwards whatever [`HttpTransport::send_stream`] reports.
pub async fn post_json_stream(
    transport: &dyn HttpTransport,
    request: HttpRequest,
) -> Result<HttpStreamResponse, LLMError> {
    request.log(true);
    transport.send_stream(request).await
}

pub mod reqwest;
