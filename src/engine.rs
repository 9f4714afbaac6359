//! Call orchestration: synchronous, asynchronous and bounded batch calls.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures_util::future::join_all;
use tokio::sync::{Semaphore, oneshot};
use tracing::{debug, info};

use crate::cancel::CancellationHandle;
use crate::config::ConfigRegistry;
use crate::error::LLMError;
use crate::http::DynHttpTransport;
use crate::http::reqwest::ReqwestTransport;
use crate::options::RequestOptions;
use crate::policy::RetryPolicy;
use crate::pool::{DEFAULT_WORKER_THREADS, WorkerPool};
use crate::provider::{DynProvider, ProviderKind, ProviderRequest, build_provider};
use crate::types::{AnalysisInput, AnalysisResult};

/// Batch concurrency used when neither the call nor the engine defaults set one.
pub const DEFAULT_MAX_CONCURRENCY: usize = 4;

/// Entry point for analysis calls.
///
/// Every call resolves its provider, retry policy and cancellation handle up front into
/// an owned unit of work, so asynchronous calls keep running after the engine is dropped.
///
/// ```no_run
/// use llm_bridge::{AnalysisEngine, AnalysisInput, RequestOptions};
///
/// # async fn run() -> Result<(), llm_bridge::LLMError> {
/// let engine = AnalysisEngine::builder().build()?;
/// let result = engine
///     .analyze("ollama", AnalysisInput::prompt("Review this diff"), RequestOptions::default())
///     .await;
/// println!("{}", result.content);
/// # Ok(())
/// # }
/// ```
pub struct AnalysisEngine {
    registry: Arc<ConfigRegistry>,
    transport: DynHttpTransport,
    providers: HashMap<ProviderKind, DynProvider>,
    defaults: RequestOptions,
    pool: Arc<WorkerPool>,
}

impl AnalysisEngine {
    pub fn builder() -> AnalysisEngineBuilder {
        AnalysisEngineBuilder::default()
    }

    pub fn registry(&self) -> &Arc<ConfigRegistry> {
        &self.registry
    }

    pub fn defaults(&self) -> &RequestOptions {
        &self.defaults
    }

    pub fn worker_threads(&self) -> usize {
        self.pool.size()
    }

    /// Runs one call on the caller's runtime.
    ///
    /// An empty `provider` name selects the registry's default provider.
    pub async fn analyze(
        &self,
        provider: &str,
        input: AnalysisInput,
        options: RequestOptions,
    ) -> AnalysisResult {
        match self.prepare(provider, input, options) {
            Ok(call) => call.run().await,
            Err(result) => result,
        }
    }

    /// Starts one call on the worker pool and returns immediately.
    pub fn analyze_async(
        &self,
        provider: &str,
        input: AnalysisInput,
        options: RequestOptions,
    ) -> AnalysisHandle {
        let (sender, receiver) = oneshot::channel();
        let caller_cancel = options
            .cancellation
            .clone()
            .or_else(|| self.defaults.cancellation.clone())
            .unwrap_or_default();
        let call = match self.prepare(provider, input, options) {
            Ok(call) => call,
            Err(result) => {
                let _ = sender.send(result);
                return AnalysisHandle::new(receiver, caller_cancel, None);
            }
        };
        let cancel = call.cancel.clone();
        self.pool.spawn(async move {
            // The receiver may already be gone; nobody is left to tell.
            let _ = sender.send(call.run().await);
        });
        AnalysisHandle::new(receiver, cancel, Some(Arc::clone(&self.pool)))
    }

    /// Runs one call on the worker pool and blocks until it finishes.
    ///
    /// # Panics
    ///
    /// Panics when called from within an async runtime; use [`AnalysisEngine::analyze`]
    /// there.
    pub fn analyze_blocking(
        &self,
        provider: &str,
        input: AnalysisInput,
        options: RequestOptions,
    ) -> AnalysisResult {
        self.analyze_async(provider, input, options).wait()
    }

    /// Runs every request with at most `max_concurrency` in flight.
    ///
    /// Results are returned in input order. The limit falls back to the engine defaults'
    /// `max_concurrency`, then [`DEFAULT_MAX_CONCURRENCY`], and is at least 1.
    pub async fn analyze_batch(
        &self,
        requests: Vec<BatchRequest>,
        max_concurrency: Option<usize>,
    ) -> Vec<AnalysisResult> {
        let limit = self.batch_limit(max_concurrency);
        run_batch(self.prepare_batch(requests), limit).await
    }

    /// Blocking form of [`AnalysisEngine::analyze_batch`], executed on the worker pool.
    ///
    /// # Panics
    ///
    /// Panics when called from within an async runtime.
    pub fn analyze_batch_blocking(
        &self,
        requests: Vec<BatchRequest>,
        max_concurrency: Option<usize>,
    ) -> Vec<AnalysisResult> {
        let total = requests.len();
        let limit = self.batch_limit(max_concurrency);
        let calls = self.prepare_batch(requests);
        let (sender, receiver) = oneshot::channel();
        self.pool.spawn(async move {
            let _ = sender.send(run_batch(calls, limit).await);
        });
        receiver.blocking_recv().unwrap_or_else(|_| {
            (0..total).map(|_| worker_dropped()).collect()
        })
    }

    /// Resolves everything a call needs into an owned [`PreparedCall`].
    ///
    /// Failures before dispatch (unknown provider, missing key) come back as a failed
    /// result with zero attempts.
    fn prepare(
        &self,
        provider: &str,
        input: AnalysisInput,
        options: RequestOptions,
    ) -> Result<PreparedCall, AnalysisResult> {
        let options = RequestOptions::merge(&self.defaults, &options);
        let fail = |err: LLMError| {
            debug!(provider, error = %err, "call rejected before dispatch");
            AnalysisResult::from_error(&err).with_provider(provider.trim())
        };
        let kind = ProviderKind::resolve(provider, &self.registry).map_err(fail)?;
        let client = match self.providers.get(&kind) {
            Some(client) => Arc::clone(client),
            None => build_provider(
                kind,
                &self.registry.resolved_provider_config(kind),
                Arc::clone(&self.transport),
            )
            .map_err(|err| fail(err).with_provider(kind.as_str()))?,
        };
        Ok(PreparedCall {
            policy: RetryPolicy::resolve(&options, &self.registry, kind),
            cancel: options.cancellation.clone().unwrap_or_default(),
            request: ProviderRequest::from_options(input, &options),
            provider: client,
        })
    }

    fn prepare_batch(
        &self,
        requests: Vec<BatchRequest>,
    ) -> Vec<Result<PreparedCall, AnalysisResult>> {
        requests
            .into_iter()
            .map(|request| self.prepare(&request.provider, request.input, request.options))
            .collect()
    }

    fn batch_limit(&self, max_concurrency: Option<usize>) -> usize {
        max_concurrency
            .or(self.defaults.max_concurrency)
            .unwrap_or(DEFAULT_MAX_CONCURRENCY)
            .max(1)
    }
}

impl std::fmt::Debug for AnalysisEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut registered: Vec<_> = self.providers.keys().map(|kind| kind.as_str()).collect();
        registered.sort_unstable();
        f.debug_struct("AnalysisEngine")
            .field("registered", &registered)
            .field("defaults", &self.defaults)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

/// Builder for [`AnalysisEngine`].
pub struct AnalysisEngineBuilder {
    registry: Option<Arc<ConfigRegistry>>,
    transport: Option<DynHttpTransport>,
    worker_threads: usize,
    defaults: RequestOptions,
    providers: HashMap<ProviderKind, DynProvider>,
}

impl Default for AnalysisEngineBuilder {
    fn default() -> Self {
        Self {
            registry: None,
            transport: None,
            worker_threads: DEFAULT_WORKER_THREADS,
            defaults: RequestOptions::default(),
            providers: HashMap::new(),
        }
    }
}

impl AnalysisEngineBuilder {
    /// Shares an existing registry; a fresh one with fallback defaults is used otherwise.
    pub fn registry(mut self, registry: Arc<ConfigRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Replaces the reqwest transport, e.g. with an in-memory one for tests.
    pub fn transport(mut self, transport: DynHttpTransport) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn worker_threads(mut self, worker_threads: usize) -> Self {
        self.worker_threads = worker_threads;
        self
    }

    /// Options every call starts from before its own overrides apply.
    pub fn defaults(mut self, defaults: RequestOptions) -> Self {
        self.defaults = defaults;
        self
    }

    /// Uses `provider` for its kind instead of building one from the registry.
    pub fn register_provider(mut self, provider: DynProvider) -> Self {
        self.providers.insert(provider.kind(), provider);
        self
    }

    /// # Errors
    ///
    /// Fails when the default HTTP client or the worker pool cannot be created.
    pub fn build(self) -> Result<AnalysisEngine, LLMError> {
        let transport = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::default_client()?),
        };
        let pool = WorkerPool::new(self.worker_threads)?;
        info!(
            workers = pool.size(),
            registered = self.providers.len(),
            "analysis engine ready"
        );
        Ok(AnalysisEngine {
            registry: self.registry.unwrap_or_default(),
            transport,
            providers: self.providers,
            defaults: self.defaults,
            pool: Arc::new(pool),
        })
    }
}

/// One entry of a batch call.
#[derive(Debug, Clone, Default)]
pub struct BatchRequest {
    /// Empty selects the default provider.
    pub provider: String,
    pub input: AnalysisInput,
    pub options: RequestOptions,
}

impl BatchRequest {
    pub fn new(provider: impl Into<String>, input: AnalysisInput) -> Self {
        Self {
            provider: provider.into(),
            input,
            options: RequestOptions::default(),
        }
    }

    pub fn with_options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }
}

/// A call with its provider, policy and cancellation handle resolved and owned.
struct PreparedCall {
    provider: DynProvider,
    policy: RetryPolicy,
    request: ProviderRequest,
    cancel: CancellationHandle,
}

impl PreparedCall {
    async fn run(self) -> AnalysisResult {
        debug!(
            provider = self.provider.name(),
            attempts = self.policy.max_attempts,
            timeout_ms = self.policy.timeout.as_millis() as u64,
            stream = self.request.stream,
            "dispatching call"
        );
        self.policy
            .execute(self.provider.as_ref(), &self.request, &self.cancel)
            .await
    }
}

async fn run_batch(
    calls: Vec<Result<PreparedCall, AnalysisResult>>,
    limit: usize,
) -> Vec<AnalysisResult> {
    info!(requests = calls.len(), max_concurrency = limit, "running batch");
    let semaphore = Arc::new(Semaphore::new(limit));
    join_all(calls.into_iter().map(|call| {
        let semaphore = Arc::clone(&semaphore);
        async move {
            match call {
                Ok(call) => {
                    let _permit = semaphore.acquire_owned().await.ok();
                    call.run().await
                }
                Err(result) => result,
            }
        }
    }))
    .await
}

fn worker_dropped() -> AnalysisResult {
    AnalysisResult::failure("worker dropped the call before completing", 500)
}

/// Result of [`AnalysisEngine::analyze_async`].
///
/// Await it, or call [`AnalysisHandle::wait`] from synchronous code. The handle shares
/// ownership of the worker pool, so it stays resolvable after the engine is gone.
#[must_use = "dropping the handle discards the result; the call still runs"]
pub struct AnalysisHandle {
    receiver: oneshot::Receiver<AnalysisResult>,
    cancel: CancellationHandle,
    pool: Option<Arc<WorkerPool>>,
}

impl AnalysisHandle {
    fn new(
        receiver: oneshot::Receiver<AnalysisResult>,
        cancel: CancellationHandle,
        pool: Option<Arc<WorkerPool>>,
    ) -> Self {
        Self {
            receiver,
            cancel,
            pool,
        }
    }

    /// Requests cancellation; observed before the next attempt or streaming frame.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn cancellation(&self) -> &CancellationHandle {
        &self.cancel
    }

    /// Blocks the current thread until the call finishes.
    ///
    /// # Panics
    ///
    /// Panics when called from within an async runtime; `.await` the handle there.
    pub fn wait(self) -> AnalysisResult {
        let Self { receiver, pool, .. } = self;
        let result = receiver.blocking_recv().unwrap_or_else(|_| worker_dropped());
        drop(pool);
        result
    }
}

impl Future for AnalysisHandle {
    type Output = AnalysisResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| worker_dropped()))
    }
}

impl std::fmt::Debug for AnalysisHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisHandle")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::http::{HttpRequest, HttpResponse, HttpStreamResponse, HttpTransport};
    use crate::provider::ollama::OllamaProvider;

    struct Unreachable;

    #[async_trait]
    impl HttpTransport for Unreachable {
        async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, LLMError> {
            Err(LLMError::transport("connection refused"))
        }

        async fn send_stream(&self, _request: HttpRequest) -> Result<HttpStreamResponse, LLMError> {
            Err(LLMError::transport("connection refused"))
        }
    }

    fn engine() -> AnalysisEngine {
        AnalysisEngine::builder()
            .transport(Arc::new(Unreachable))
            .worker_threads(1)
            .defaults(RequestOptions::default().with_max_retries(1))
            .build()
            .expect("engine")
    }

    #[tokio::test]
    async fn unknown_provider_fails_without_attempts() {
        let result = engine()
            .analyze("mystery", AnalysisInput::prompt("hi"), RequestOptions::default())
            .await;
        assert!(!result.success);
        assert_eq!(result.status_code, 400);
        assert_eq!(result.attempts, 0);
        assert!(result.error_message.contains("unknown provider"));
    }

    #[test]
    fn rejected_async_call_shares_the_callers_cancellation() {
        let cancel = CancellationHandle::new();
        let handle = engine().analyze_async(
            "mystery",
            AnalysisInput::prompt("hi"),
            RequestOptions::default().with_cancellation(cancel.clone()),
        );
        handle.cancel();
        assert!(cancel.is_cancelled());
        assert_eq!(handle.wait().status_code, 400);
    }

    #[tokio::test]
    async fn missing_api_key_is_a_config_failure() {
        let registry = Arc::new(ConfigRegistry::new());
        let mut config = crate::config::ProviderConfig::builtin(ProviderKind::Anthropic);
        config.api_key_env = Some("LLM_BRIDGE_TEST_NEVER_SET".to_string());
        registry.set_provider_config(config).expect("config");
        let engine = AnalysisEngine::builder()
            .registry(registry)
            .transport(Arc::new(Unreachable))
            .worker_threads(1)
            .build()
            .expect("engine");
        let result = engine
            .analyze("anthropic", AnalysisInput::prompt("hi"), RequestOptions::default())
            .await;
        assert!(!result.success);
        assert_eq!(result.provider, "anthropic");
        assert_eq!(result.status_code, 400);
        assert_eq!(result.attempts, 0);
    }

    #[tokio::test]
    async fn transport_failures_surface_as_results() {
        let result = engine()
            .analyze("", AnalysisInput::prompt("hi"), RequestOptions::default())
            .await;
        assert!(!result.success);
        assert_eq!(result.provider, "ollama");
        assert_eq!(result.status_code, 503);
        assert_eq!(result.attempts, 1);
    }

    #[test]
    fn registered_providers_take_precedence() {
        let transport: DynHttpTransport = Arc::new(Unreachable);
        let custom = OllamaProvider::new(Arc::clone(&transport)).with_default_model("qwen2");
        let engine = AnalysisEngine::builder()
            .transport(transport)
            .worker_threads(1)
            .register_provider(Arc::new(custom))
            .build()
            .expect("engine");
        let call = engine
            .prepare("ollama", AnalysisInput::prompt("hi"), RequestOptions::default())
            .unwrap_or_else(|result| panic!("prepare failed: {}", result.error_message));
        assert_eq!(call.provider.default_model(), "qwen2");
    }

    #[test]
    fn batch_limit_resolution() {
        let engine = engine();
        assert_eq!(engine.batch_limit(Some(0)), 1);
        assert_eq!(engine.batch_limit(Some(3)), 3);
        assert_eq!(engine.batch_limit(None), DEFAULT_MAX_CONCURRENCY);

        let capped = AnalysisEngine::builder()
            .transport(Arc::new(Unreachable))
            .worker_threads(1)
            .defaults(RequestOptions::default().with_max_concurrency(2))
            .build()
            .expect("engine");
        assert_eq!(capped.batch_limit(None), 2);
        assert_eq!(capped.batch_limit(Some(5)), 5);
    }

    #[test]
    fn blocking_calls_resolve_on_the_pool() {
        let engine = engine();
        let result =
            engine.analyze_blocking("ollama", AnalysisInput::prompt("hi"), RequestOptions::default());
        assert_eq!(result.status_code, 503);

        let results = engine.analyze_batch_blocking(
            vec![
                BatchRequest::new("ollama", AnalysisInput::prompt("a")),
                BatchRequest::new("nope", AnalysisInput::prompt("b")),
            ],
            Some(2),
        );
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].status_code, 503);
        assert_eq!(results[1].status_code, 400);
    }
}
