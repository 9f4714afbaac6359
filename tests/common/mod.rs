//! In-memory transport shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use llm_bridge::LLMError;
use llm_bridge::http::{
    DynHttpTransport, HttpRequest, HttpResponse, HttpStreamResponse, HttpTransport,
};
use parking_lot::Mutex;

pub type Responder = dyn Fn(&HttpRequest) -> Result<(u16, String), LLMError> + Send + Sync;

/// Answers every request through `responder`, recording requests and concurrency.
pub struct MockTransport {
    responder: Box<Responder>,
    latency: Duration,
    requests: Mutex<Vec<HttpRequest>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockTransport {
    pub fn new(
        responder: impl Fn(&HttpRequest) -> Result<(u16, String), LLMError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Self::with_latency(Duration::ZERO, responder)
    }

    pub fn with_latency(
        latency: Duration,
        responder: impl Fn(&HttpRequest) -> Result<(u16, String), LLMError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            responder: Box::new(responder),
            latency,
            requests: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        })
    }

    /// Always answers `status` with `body`.
    pub fn fixed(status: u16, body: impl Into<String>) -> Arc<Self> {
        let body = body.into();
        Self::new(move |_| Ok((status, body.clone())))
    }

    /// Answers from `script` in order, repeating the last entry once exhausted.
    pub fn scripted(script: Vec<(u16, &str)>) -> Arc<Self> {
        let script: Vec<(u16, String)> = script
            .into_iter()
            .map(|(status, body)| (status, body.to_string()))
            .collect();
        let cursor = AtomicUsize::new(0);
        Self::new(move |_| {
            let index = cursor.fetch_add(1, Ordering::SeqCst).min(script.len() - 1);
            Ok(script[index].clone())
        })
    }

    pub fn dyn_transport(self: &Arc<Self>) -> DynHttpTransport {
        Arc::clone(self) as DynHttpTransport
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }

    pub fn request_count(&self) -> usize {
        self.requests.lock().len()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn exchange(&self, request: HttpRequest) -> Result<(u16, String), LLMError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        let outcome = (self.responder)(&request);
        self.requests.lock().push(request);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

#[async_trait]
impl HttpTransport for MockTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, LLMError> {
        let (status, body) = self.exchange(request).await?;
        Ok(HttpResponse {
            status,
            headers: HashMap::new(),
            body: body.into_bytes(),
        })
    }

    /// Delivers the body in small chunks so frames straddle chunk boundaries.
    async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse, LLMError> {
        let (status, body) = self.exchange(request).await?;
        let chunks: Vec<Result<Vec<u8>, LLMError>> = body
            .into_bytes()
            .chunks(7)
            .map(|chunk| Ok(chunk.to_vec()))
            .collect();
        Ok(HttpStreamResponse {
            status,
            headers: HashMap::new(),
            body: Box::pin(stream::iter(chunks)),
        })
    }
}

/// Answers every request with raw byte chunks, calling `on_chunk` as each one is delivered.
pub struct ChunkedTransport {
    status: u16,
    chunks: Vec<Vec<u8>>,
    on_chunk: Arc<dyn Fn(usize) + Send + Sync>,
    calls: AtomicUsize,
}

impl ChunkedTransport {
    pub fn new(status: u16, chunks: Vec<Vec<u8>>) -> Arc<Self> {
        Self::with_hook(status, chunks, |_| {})
    }

    pub fn with_hook(
        status: u16,
        chunks: Vec<Vec<u8>>,
        on_chunk: impl Fn(usize) + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            status,
            chunks,
            on_chunk: Arc::new(on_chunk),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn dyn_transport(self: &Arc<Self>) -> DynHttpTransport {
        Arc::clone(self) as DynHttpTransport
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpTransport for ChunkedTransport {
    async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, LLMError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(HttpResponse {
            status: self.status,
            headers: HashMap::new(),
            body: self.chunks.concat(),
        })
    }

    async fn send_stream(&self, _request: HttpRequest) -> Result<HttpStreamResponse, LLMError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let on_chunk = Arc::clone(&self.on_chunk);
        let body = stream::iter(self.chunks.clone().into_iter().enumerate()).map(
            move |(index, chunk)| {
                on_chunk(index);
                Ok(chunk)
            },
        );
        Ok(HttpStreamResponse {
            status: self.status,
            headers: HashMap::new(),
            body: Box::pin(body),
        })
    }
}

/// Parses the recorded request body as JSON.
pub fn json_body(request: &HttpRequest) -> serde_json::Value {
    serde_json::from_str(request.body_text().expect("utf-8 body")).expect("json body")
}
