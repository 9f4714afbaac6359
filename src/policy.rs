//! Retry and timeout policy around a single provider call.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::cancel::CancellationHandle;
use crate::config::ConfigRegistry;
use crate::error::LLMError;
use crate::options::RequestOptions;
use crate::output::split_reasoning;
use crate::provider::{LLMProvider, ProviderKind, ProviderReply, ProviderRequest};
use crate::types::AnalysisResult;

/// Upper bound for a provider-suggested `Retry-After` delay.
pub const MAX_RETRY_AFTER: Duration = Duration::from_secs(30);

/// Granularity of cancellation checks while waiting between attempts.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Resolved attempt budget, delay and per-attempt timeout for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: crate::config::DEFAULT_RETRY_ATTEMPTS,
            delay: crate::config::DEFAULT_RETRY_DELAY,
            timeout: crate::config::DEFAULT_TIMEOUT,
        }
    }
}

impl RetryPolicy {
    /// Timeout: call option, then the provider's configured timeout, then the registry's
    /// global timeout. Attempts: call option, then the registry. Attempts are at least 1.
    pub fn resolve(
        options: &RequestOptions,
        registry: &ConfigRegistry,
        provider: ProviderKind,
    ) -> Self {
        let timeout = options
            .timeout
            .or_else(|| registry.provider_timeout(provider.as_str()))
            .unwrap_or_else(|| registry.timeout());
        let max_attempts = options
            .max_retries
            .unwrap_or_else(|| registry.retry_attempts())
            .max(1);
        Self {
            max_attempts,
            delay: registry.retry_delay(),
            timeout,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Runs `request` against `provider` until it succeeds, fails permanently, runs out
    /// of attempts or `cancel` fires.
    ///
    /// Never returns an error: every outcome is folded into an [`AnalysisResult`].
    /// Invalid input, models and payloads fail with zero attempts and no network activity.
    pub async fn execute(
        &self,
        provider: &dyn LLMProvider,
        request: &ProviderRequest,
        cancel: &CancellationHandle,
    ) -> AnalysisResult {
        let name = provider.name();
        if let Err(err) = request
            .input
            .validate()
            .and_then(|_| provider.resolve_model(request))
            .and_then(|model| provider.build_payload(&model, request).map(drop))
        {
            debug!(provider = name, error = %err, "rejecting request before dispatch");
            return AnalysisResult::from_error(&err).with_provider(name);
        }

        let mut request = request.clone();
        request.timeout = Some(self.timeout);
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            if cancel.is_cancelled() {
                info!(provider = name, attempt, "call cancelled");
                return AnalysisResult::from_error(&LLMError::cancelled())
                    .with_provider(name)
                    .with_attempts(attempt);
            }
            attempt += 1;

            let outcome = match tokio::time::timeout(
                self.timeout,
                run_attempt(provider, &request, cancel),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(LLMError::Timeout {
                    after: self.timeout,
                }),
            };

            let err = match outcome {
                Ok(reply) => {
                    debug!(
                        provider = name,
                        attempt,
                        status = reply.status,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "call succeeded"
                    );
                    return into_result(reply).with_provider(name).with_attempts(attempt);
                }
                Err(err) => err,
            };

            let retryable = err.is_retryable();
            if !retryable || attempt >= self.max_attempts {
                warn!(
                    provider = name,
                    attempt,
                    status = err.status_code(),
                    retryable,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %err,
                    "call failed"
                );
                return AnalysisResult::from_error(&err)
                    .with_provider(name)
                    .with_attempts(attempt);
            }

            let delay = err
                .retry_after()
                .map(|suggested| suggested.min(MAX_RETRY_AFTER))
                .unwrap_or(self.delay);
            warn!(
                provider = name,
                attempt,
                status = err.status_code(),
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "attempt failed, retrying"
            );
            wait_unless_cancelled(delay, cancel).await;
        }
    }
}

async fn run_attempt(
    provider: &dyn LLMProvider,
    request: &ProviderRequest,
    cancel: &CancellationHandle,
) -> Result<ProviderReply, LLMError> {
    if request.stream {
        provider.send_streaming(request, cancel).await
    } else {
        provider.send(request).await
    }
}

/// Moves inline `<think>` blocks from the content into the reasoning text.
fn into_result(reply: ProviderReply) -> AnalysisResult {
    let (content, inline_reasoning) = split_reasoning(&reply.content);
    let reasoning = match (reply.reasoning.is_empty(), inline_reasoning.is_empty()) {
        (_, true) => reply.reasoning,
        (true, false) => inline_reasoning,
        (false, false) => format!("{}\n{inline_reasoning}", reply.reasoning),
    };
    AnalysisResult::success(content, reasoning, reply.status)
}

/// Sleeps for `delay` in short slices, returning early once `cancel` fires.
async fn wait_unless_cancelled(delay: Duration, cancel: &CancellationHandle) {
    let deadline = tokio::time::Instant::now() + delay;
    loop {
        if cancel.is_cancelled() {
            return;
        }
        let now = tokio::time::Instant::now();
        if now >= deadline {
            return;
        }
        tokio::time::sleep((deadline - now).min(CANCEL_POLL_INTERVAL)).await;
    }
}
