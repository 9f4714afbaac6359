//! Per-call overrides and sampling settings.

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cancel::CancellationHandle;

/// Sampling and decoding parameters.
///
/// Every field is optional. Unset fields are omitted from provider payloads entirely.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub top_p: Option<f32>,
    pub frequency_penalty: Option<f32>,
    pub presence_penalty: Option<f32>,
    #[serde(default)]
    pub stop: Vec<String>,
    pub seed: Option<i64>,
    pub logit_bias: Option<HashMap<String, f32>>,
    pub logprobs: Option<bool>,
    pub top_logprobs: Option<u32>,
    pub top_k: Option<u32>,
    pub min_p: Option<f32>,
    pub user: Option<String>,
    pub parallel_tool_calls: Option<bool>,
    pub service_tier: Option<String>,
    pub reasoning_effort: Option<String>,
    pub max_completion_tokens: Option<u32>,
    pub response_format: Option<Value>,
    pub tool_choice: Option<Value>,
}

macro_rules! overlay {
    ($target:ident, $over:ident; $($field:ident),+ $(,)?) => {
        $(
            if $over.$field.is_some() {
                $target.$field = $over.$field.clone();
            }
        )+
    };
}

impl GenerationOptions {
    /// Returns `defaults` with every field `overrides` sets replaced.
    ///
    /// `stop` is replaced wholesale when the override list is non-empty.
    pub fn merge(defaults: &Self, overrides: &Self) -> Self {
        let mut merged = defaults.clone();
        overlay!(merged, overrides;
            temperature, max_tokens, top_p, frequency_penalty, presence_penalty, seed,
            logit_bias, logprobs, top_logprobs, top_k, min_p, user, parallel_tool_calls,
            service_tier, reasoning_effort, max_completion_tokens, response_format, tool_choice,
        );
        if !overrides.stop.is_empty() {
            merged.stop = overrides.stop.clone();
        }
        merged
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_top_p(mut self, top_p: f32) -> Self {
        self.top_p = Some(top_p);
        self
    }

    pub fn with_stop(mut self, stop: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.stop = stop.into_iter().map(Into::into).collect();
        self
    }
}

/// Streaming sub-options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamOptions {
    /// Ask OpenAI-compatible backends to append a usage frame to the stream.
    pub include_usage: bool,
}

/// Per-call overrides layered over engine defaults.
#[derive(Debug, Clone, Default)]
pub struct RequestOptions {
    pub timeout: Option<Duration>,
    pub max_retries: Option<u32>,
    /// Extra request headers; overlaid on the provider's own headers.
    pub headers: HashMap<String, String>,
    pub cancellation: Option<CancellationHandle>,
    /// Upper bound of in-flight requests for batch calls.
    pub max_concurrency: Option<usize>,
    /// Overrides the provider's configured default model.
    pub model: Option<String>,
    /// Use the provider's streaming endpoint and aggregate the frames.
    pub stream: Option<bool>,
    pub stream_options: Option<StreamOptions>,
    pub generation: GenerationOptions,
}

impl RequestOptions {
    /// Returns `defaults` with every field `overrides` sets replaced.
    ///
    /// Header maps merge key by key with `overrides` winning.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::time::Duration;
    /// use llm_bridge::RequestOptions;
    ///
    /// let defaults = RequestOptions::default()
    ///     .with_timeout(Duration::from_secs(30))
    ///     .with_header("X-Team", "core");
    /// let overrides = RequestOptions::default().with_max_retries(5);
    ///
    /// let merged = RequestOptions::merge(&defaults, &overrides);
    /// assert_eq!(merged.timeout, Some(Duration::from_secs(30)));
    /// assert_eq!(merged.max_retries, Some(5));
    /// assert_eq!(merged.headers["X-Team"], "core");
    /// ```
    pub fn merge(defaults: &Self, overrides: &Self) -> Self {
        let mut merged = defaults.clone();
        overlay!(merged, overrides;
            timeout, max_retries, cancellation, max_concurrency, model, stream, stream_options,
        );
        for (name, value) in &overrides.headers {
            merged.headers.insert(name.clone(), value.clone());
        }
        merged.generation = GenerationOptions::merge(&defaults.generation, &overrides.generation);
        merged
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_cancellation(mut self, handle: CancellationHandle) -> Self {
        self.cancellation = Some(handle);
        self
    }

    pub fn with_max_concurrency(mut self, limit: usize) -> Self {
        self.max_concurrency = Some(limit);
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_stream(mut self, stream: bool) -> Self {
        self.stream = Some(stream);
        self
    }

    pub fn with_generation(mut self, generation: GenerationOptions) -> Self {
        self.generation = generation;
        self
    }

    pub(crate) fn include_usage(&self) -> bool {
        self.stream_options
            .as_ref()
            .is_some_and(|options| options.include_usage)
    }
}
