//! Unified client for analysis calls against several LLM backends.
//!
//! One provider-agnostic [`AnalysisInput`] goes in, one [`AnalysisResult`] comes out,
//! whichever of OpenAI, Anthropic, Gemini, Ollama or DeepSeek serves the call. The
//! [`AnalysisEngine`] adds retries, timeouts, cancellation, a worker pool for
//! asynchronous calls and bounded batches; [`ParsedOutput`] turns the text into
//! sections and findings.

pub mod cancel;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod options;
pub mod output;
pub mod policy;
pub mod pool;
pub mod provider;
pub mod redact;
pub mod stream;
pub mod types;

pub use cancel::CancellationHandle;
pub use config::{ConfigRegistry, ProviderConfig};
pub use engine::{AnalysisEngine, AnalysisHandle, BatchRequest};
pub use error::LLMError;
pub use options::{GenerationOptions, RequestOptions};
pub use output::ParsedOutput;
pub use provider::{LLMProvider, ProviderKind};
pub use types::{AnalysisInput, AnalysisResult};
