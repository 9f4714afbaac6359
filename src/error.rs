use std::time::Duration;

use thiserror::Error;

/// Aggregates every failure mode exposed by the analysis client.
///
/// Engine entry points never surface this type directly; they fold it into a failed
/// [`crate::types::AnalysisResult`] using [`LLMError::status_code`]. Provider-level APIs
/// return it so callers can decide whether to retry or fall back.
#[derive(Debug, Error)]
pub enum LLMError {
    /// Connection, DNS or TLS failure before a response arrived.
    #[error("transport error: {message}")]
    Transport { message: String },
    /// The attempt did not finish within the resolved timeout.
    #[error("request timed out after {}ms", .after.as_millis())]
    Timeout { after: Duration },
    /// Reports invalid or missing credentials.
    #[error("auth failure ({status}): {message}")]
    Auth { status: u16, message: String },
    /// Indicates that the provider throttled the request.
    #[error("rate limited: {message}")]
    RateLimit {
        /// Raw message returned by the upstream provider.
        message: String,
        /// Optional wait duration suggested by the provider before retrying.
        retry_after: Option<Duration>,
    },
    /// Any other non-2xx response.
    #[error("provider {provider} returned status {status}: {message}")]
    Http {
        provider: &'static str,
        status: u16,
        message: String,
    },
    /// Signals validation failures in the request before anything is sent.
    #[error("invalid request: {message}")]
    Validation { message: String },
    /// Raised when building or validating configuration fails.
    #[error("invalid configuration for {field}: {reason}")]
    InvalidConfig {
        /// Name of the configuration field that failed validation.
        field: String,
        /// Additional context explaining why the field is invalid.
        reason: String,
    },
    /// Surfaces cancellations triggered explicitly by the caller.
    #[error("request aborted: {message}")]
    Aborted { message: String },
    /// A streaming channel failed after the exchange started.
    #[error("stream closed unexpectedly: {message}")]
    StreamClosed { message: String },
    /// The response body did not match the provider's schema.
    #[error("provider {provider} error: {message}")]
    Provider {
        provider: &'static str,
        message: String,
    },
    /// Reading a configuration file failed.
    #[error("io error on {path}: {message}")]
    Io { path: String, message: String },
}

impl LLMError {
    /// Creates an [`LLMError::Transport`] from a textual description.
    ///
    /// # Examples
    ///
    /// ```
    /// use llm_bridge::error::LLMError;
    ///
    /// let err = LLMError::transport("dns lookup failed");
    /// assert!(matches!(err, LLMError::Transport { .. }));
    /// assert!(err.is_retryable());
    /// ```
    pub fn transport<T: Into<String>>(message: T) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates an [`LLMError::Provider`] with the given provider name and message.
    pub fn provider<T: Into<String>>(provider: &'static str, message: T) -> Self {
        Self::Provider {
            provider,
            message: message.into(),
        }
    }

    /// Creates an [`LLMError::Validation`].
    pub fn validation<T: Into<String>>(message: T) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates an [`LLMError::InvalidConfig`].
    pub fn invalid_config(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// The cancellation error produced when a [`crate::cancel::CancellationHandle`] fires.
    pub fn cancelled() -> Self {
        Self::Aborted {
            message: "cancelled by caller".to_string(),
        }
    }

    /// HTTP-equivalent status code recorded on a failed result.
    ///
    /// # Examples
    ///
    /// ```
    /// use llm_bridge::error::LLMError;
    ///
    /// assert_eq!(LLMError::validation("empty input").status_code(), 400);
    /// assert_eq!(LLMError::cancelled().status_code(), 499);
    /// ```
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Transport { .. } => 503,
            Self::Timeout { .. } => 408,
            Self::Auth { status, .. } => *status,
            Self::RateLimit { .. } => 429,
            Self::Http { status, .. } => *status,
            Self::Validation { .. } | Self::InvalidConfig { .. } => 400,
            Self::Aborted { .. } => 499,
            Self::StreamClosed { .. } | Self::Provider { .. } => 502,
            Self::Io { .. } => 500,
        }
    }

    /// Whether another attempt may succeed.
    ///
    /// Transport and protocol failures are retryable, client-side mistakes and
    /// cancellation are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport { .. }
            | Self::Timeout { .. }
            | Self::RateLimit { .. }
            | Self::StreamClosed { .. }
            | Self::Provider { .. } => true,
            Self::Http { status, .. } => is_retryable_status(*status),
            Self::Auth { .. }
            | Self::Validation { .. }
            | Self::InvalidConfig { .. }
            | Self::Aborted { .. }
            | Self::Io { .. } => false,
        }
    }

    /// Delay suggested by the upstream provider, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimit { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// Status codes that are worth another attempt.
pub fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 429) || (500..600).contains(&status)
}

/// Maps a non-2xx status plus an already extracted message onto the taxonomy.
pub(crate) fn classify_status(
    provider: &'static str,
    status: u16,
    message: String,
    retry_after: Option<Duration>,
) -> LLMError {
    match status {
        401 | 403 => LLMError::Auth { status, message },
        429 => LLMError::RateLimit {
            message,
            retry_after,
        },
        _ => LLMError::Http {
            provider,
            status,
            message,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_status_maps_auth_and_rate_limit() {
        let auth = classify_status("openai", 401, "bad key".into(), None);
        assert!(matches!(auth, LLMError::Auth { status: 401, .. }));
        assert!(!auth.is_retryable());

        let limited = classify_status("openai", 429, "slow down".into(), Some(Duration::from_secs(2)));
        assert_eq!(limited.retry_after(), Some(Duration::from_secs(2)));
        assert!(limited.is_retryable());
        assert_eq!(limited.status_code(), 429);
    }

    #[test]
    fn only_server_errors_and_throttling_are_retryable() {
        for status in [500, 502, 503, 504, 408, 429] {
            assert!(is_retryable_status(status), "{status} should be retryable");
        }
        for status in [400, 404, 409, 422] {
            let err = classify_status("anthropic", status, "nope".into(), None);
            assert!(!err.is_retryable(), "{status} should not be retryable");
            assert_eq!(err.status_code(), status);
        }
    }

    #[test]
    fn transport_and_timeout_carry_equivalent_status() {
        assert_eq!(LLMError::transport("refused").status_code(), 503);
        let timeout = LLMError::Timeout {
            after: Duration::from_millis(1500),
        };
        assert_eq!(timeout.status_code(), 408);
        assert!(timeout.to_string().contains("1500ms"));
    }
}
