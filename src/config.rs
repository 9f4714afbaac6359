//! Provider metadata and global call settings.
//!
//! The registry is explicitly constructed and shared as `Arc<ConfigRegistry>`. Every
//! accessor is safe before any load and returns the documented fallbacks.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};
use url::Url;

use crate::error::LLMError;
use crate::provider::ProviderKind;

pub const DEFAULT_PROVIDER: &str = "ollama";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_RETRY_ATTEMPTS: u32 = 3;
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(1_000);
pub const DEFAULT_CONFIG_PATH: &str = "config/llm_config.json";

/// 单个 provider 的配置
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub name: String,
    #[serde(default)]
    pub base_url: String,
    #[serde(default)]
    pub default_model: String,
    /// 覆盖全局超时，单位秒
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// 优先于 `api_key_env`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// 附加设置，例如 organization、anthropic beta 或 ollama 的 mode
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extra: HashMap<String, Value>,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("default_model", &self.default_model)
            .field("timeout", &self.timeout)
            .field("api_key", &self.api_key.as_ref().map(|_| crate::redact::REDACTED))
            .field("api_key_env", &self.api_key_env)
            .field("extra", &self.extra)
            .finish()
    }
}

impl ProviderConfig {
    pub fn new(
        name: impl Into<String>,
        base_url: impl Into<String>,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            base_url: base_url.into(),
            default_model: default_model.into(),
            timeout: None,
            api_key: None,
            api_key_env: None,
            extra: HashMap::new(),
        }
    }

    /// Built-in metadata used when a kind has no configured entry.
    pub fn builtin(kind: ProviderKind) -> Self {
        let (base_url, model) = match kind {
            ProviderKind::OpenAi => ("https://api.openai.com", "gpt-4o-mini"),
            ProviderKind::Anthropic => ("https://api.anthropic.com", "claude-3-5-sonnet-latest"),
            ProviderKind::Gemini => ("https://generativelanguage.googleapis.com", "gemini-1.5-flash"),
            ProviderKind::Ollama => ("http://localhost:11434", "llama3"),
            ProviderKind::DeepSeek => ("https://api.deepseek.com", "deepseek-chat"),
        };
        Self::new(kind.as_str(), base_url, model)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout.as_secs());
        self
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub(crate) fn extra_str(&self, key: &str) -> Option<String> {
        self.extra
            .get(key)
            .and_then(Value::as_str)
            .map(str::to_string)
    }

    /// Explicit key, else the configured variable, else the kind's conventional variable.
    pub fn resolve_api_key(&self, kind: ProviderKind) -> Option<String> {
        if let Some(key) = self.api_key.clone().filter(|key| !key.is_empty()) {
            return Some(key);
        }
        self.api_key_env
            .as_deref()
            .or_else(|| kind.api_key_env())
            .and_then(|name| std::env::var(name).ok())
            .filter(|key| !key.is_empty())
    }

    /// Checks the base URL and default model formats.
    ///
    /// # Errors
    ///
    /// Returns [`LLMError::InvalidConfig`] naming the offending field.
    pub fn validate(&self) -> Result<(), LLMError> {
        let url = Url::parse(&self.base_url).map_err(|err| {
            LLMError::invalid_config(format!("{}.base_url", self.name), err.to_string())
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(LLMError::invalid_config(
                format!("{}.base_url", self.name),
                format!("unsupported scheme '{}'", url.scheme()),
            ));
        }
        if self.default_model.chars().any(char::is_whitespace) {
            return Err(LLMError::invalid_config(
                format!("{}.default_model", self.name),
                "model name must not contain whitespace",
            ));
        }
        Ok(())
    }

    /// Fills empty fields from the built-in metadata of `kind`.
    fn with_builtin_defaults(mut self, kind: ProviderKind) -> Self {
        let builtin = Self::builtin(kind);
        if self.base_url.trim().is_empty() {
            self.base_url = builtin.base_url;
        }
        if self.default_model.trim().is_empty() {
            self.default_model = builtin.default_model;
        }
        self
    }
}

/// On-disk schema of the configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub default_provider: Option<String>,
    /// Seconds.
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub retry_attempts: Option<u32>,
    #[serde(default)]
    pub retry_delay_ms: Option<u64>,
    #[serde(default)]
    pub providers: HashMap<String, ProviderConfig>,
}

/// Consistent view of the whole registry.
#[derive(Debug, Clone, PartialEq)]
pub struct RegistryState {
    pub default_provider: String,
    pub timeout: Duration,
    pub retry_attempts: u32,
    pub retry_delay: Duration,
    pub providers: HashMap<String, ProviderConfig>,
}

impl Default for RegistryState {
    fn default() -> Self {
        Self {
            default_provider: DEFAULT_PROVIDER.to_string(),
            timeout: DEFAULT_TIMEOUT,
            retry_attempts: DEFAULT_RETRY_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            providers: HashMap::new(),
        }
    }
}

impl RegistryState {
    fn from_file(file: ConfigFile) -> Result<Self, LLMError> {
        let mut state = Self::default();
        if let Some(name) = file.default_provider.filter(|name| !name.trim().is_empty()) {
            let kind: ProviderKind = name.parse()?;
            state.default_provider = kind.as_str().to_string();
        }
        if let Some(secs) = file.timeout {
            state.timeout = Duration::from_secs(secs);
        }
        if let Some(attempts) = file.retry_attempts {
            state.retry_attempts = attempts.max(1);
        }
        if let Some(ms) = file.retry_delay_ms {
            state.retry_delay = Duration::from_millis(ms);
        }
        for (key, mut config) in file.providers {
            if config.name.trim().is_empty() {
                config.name = key.clone();
            }
            if let Ok(kind) = key.parse::<ProviderKind>() {
                config = config.with_builtin_defaults(kind);
            }
            config.validate()?;
            state.providers.insert(normalize_name(&key), config);
        }
        Ok(state)
    }
}

/// Canonical kind name when `name` is a known provider, else the trimmed lowercase name.
fn normalize_name(name: &str) -> String {
    name.parse::<ProviderKind>()
        .map(|kind| kind.as_str().to_string())
        .unwrap_or_else(|_| name.trim().to_ascii_lowercase())
}

/// Process-wide provider metadata behind a reader/writer lock.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use llm_bridge::ConfigRegistry;
///
/// let registry = ConfigRegistry::new();
/// assert_eq!(registry.default_provider(), "ollama");
/// assert_eq!(registry.timeout(), Duration::from_secs(30));
///
/// registry
///     .load_from_str(r#"{"default_provider":"openai","timeout":10}"#)
///     .expect("valid config");
/// assert_eq!(registry.default_provider(), "openai");
/// assert_eq!(registry.timeout(), Duration::from_secs(10));
/// ```
#[derive(Debug)]
pub struct ConfigRegistry {
    state: RwLock<RegistryState>,
    default_path: PathBuf,
}

impl Default for ConfigRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigRegistry {
    pub fn new() -> Self {
        Self::with_default_path(DEFAULT_CONFIG_PATH)
    }

    pub fn with_default_path(path: impl Into<PathBuf>) -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            default_path: path.into(),
        }
    }

    /// Replaces the whole state with the contents of `path`.
    ///
    /// # Errors
    ///
    /// [`LLMError::Io`] when the file cannot be read; [`LLMError::InvalidConfig`] when it
    /// is not valid JSON or names an unknown default provider or a malformed base URL.
    /// The previous state stays in place on error.
    pub fn load_config(&self, path: impl AsRef<Path>) -> Result<(), LLMError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|err| LLMError::Io {
            path: path.display().to_string(),
            message: err.to_string(),
        })?;
        self.load_from_str(&raw)?;
        info!(path = %path.display(), "loaded provider configuration");
        Ok(())
    }

    /// Loads the configured default path.
    pub fn load_default(&self) -> Result<(), LLMError> {
        self.load_config(&self.default_path)
    }

    pub fn load_from_str(&self, raw: &str) -> Result<(), LLMError> {
        let file: ConfigFile = serde_json::from_str(raw)
            .map_err(|err| LLMError::invalid_config("config", err.to_string()))?;
        let state = RegistryState::from_file(file)?;
        debug!(
            default_provider = %state.default_provider,
            providers = state.providers.len(),
            "replacing configuration state"
        );
        *self.state.write() = state;
        Ok(())
    }

    /// Inserts or replaces the entry for `config.name`.
    pub fn set_provider_config(&self, config: ProviderConfig) -> Result<(), LLMError> {
        config.validate()?;
        let key = normalize_name(&config.name);
        self.state.write().providers.insert(key, config);
        Ok(())
    }

    /// # Errors
    ///
    /// Returns [`LLMError::Validation`] for unknown provider names.
    pub fn set_default_provider(&self, name: &str) -> Result<(), LLMError> {
        let kind: ProviderKind = name.parse()?;
        self.state.write().default_provider = kind.as_str().to_string();
        Ok(())
    }

    pub fn set_timeout(&self, timeout: Duration) {
        self.state.write().timeout = timeout;
    }

    /// Values below 1 are stored as 1.
    pub fn set_retry_attempts(&self, attempts: u32) {
        self.state.write().retry_attempts = attempts.max(1);
    }

    pub fn set_retry_delay(&self, delay: Duration) {
        self.state.write().retry_delay = delay;
    }

    pub fn default_provider(&self) -> String {
        self.state.read().default_provider.clone()
    }

    pub fn timeout(&self) -> Duration {
        self.state.read().timeout
    }

    pub fn retry_attempts(&self) -> u32 {
        self.state.read().retry_attempts
    }

    pub fn retry_delay(&self) -> Duration {
        self.state.read().retry_delay
    }

    /// Provider-specific timeout, if one is configured.
    pub fn provider_timeout(&self, name: &str) -> Option<Duration> {
        self.state
            .read()
            .providers
            .get(&normalize_name(name))
            .and_then(ProviderConfig::timeout)
    }

    /// The configured entry for `name`, if any.
    pub fn provider_config(&self, name: &str) -> Option<ProviderConfig> {
        self.state.read().providers.get(&normalize_name(name)).cloned()
    }

    /// The configured entry for `kind`, else its built-in metadata.
    pub fn resolved_provider_config(&self, kind: ProviderKind) -> ProviderConfig {
        self.provider_config(kind.as_str())
            .unwrap_or_else(|| ProviderConfig::builtin(kind))
    }

    /// Names of configured providers, sorted.
    pub fn providers(&self) -> Vec<String> {
        let mut names: Vec<String> = self.state.read().providers.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn default_path(&self) -> &Path {
        &self.default_path
    }

    pub fn snapshot(&self) -> RegistryState {
        self.state.read().clone()
    }
}
