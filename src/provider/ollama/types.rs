use serde::Deserialize;

/// One NDJSON object from `/api/chat` or `/api/generate`.
///
/// Chat frames carry `message`, generate frames carry `response`; the final frame has
/// `done: true`.
#[derive(Debug, Deserialize)]
pub(crate) struct OllamaFrame {
    #[serde(default)]
    pub(crate) message: Option<OllamaMessage>,
    #[serde(default)]
    pub(crate) response: Option<String>,
    /// Generate-mode reasoning of thinking models.
    #[serde(default)]
    pub(crate) thinking: Option<String>,
    #[serde(default)]
    pub(crate) done: bool,
    #[serde(default)]
    pub(crate) error: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OllamaMessage {
    #[serde(default)]
    pub(crate) content: Option<String>,
    #[serde(default)]
    pub(crate) thinking: Option<String>,
}

impl OllamaFrame {
    /// `(reasoning, content)` regardless of sub-mode.
    pub(crate) fn text(&self) -> (Option<&str>, Option<&str>) {
        match &self.message {
            Some(message) => (message.thinking.as_deref(), message.content.as_deref()),
            None => (self.thinking.as_deref(), self.response.as_deref()),
        }
    }
}
