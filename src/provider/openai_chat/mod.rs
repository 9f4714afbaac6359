//! OpenAI Chat Completions wire format, shared by the OpenAI and DeepSeek backends.

mod error;
mod provider;
mod request;
mod response;
mod stream;
mod types;

pub use provider::OpenAiChatProvider;
