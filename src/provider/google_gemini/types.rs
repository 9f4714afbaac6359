use serde::Deserialize;

/// Google Gemini `GenerateContentResponse`; streamed frames share the same shape.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiGenerateContentResponse {
    #[serde(default)]
    pub(crate) candidates: Vec<GeminiCandidate>,
    /// 流式帧中可能直接携带错误对象
    #[serde(default)]
    pub(crate) error: Option<GeminiErrorDetail>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct GeminiCandidate {
    #[serde(default)]
    pub(crate) content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GeminiContent {
    #[serde(default)]
    pub(crate) parts: Vec<GeminiPart>,
}

/// 仅关心文本部分；`thought: true` 的文本属于推理过程
#[derive(Debug, Deserialize)]
pub(crate) struct GeminiPart {
    #[serde(default)]
    pub(crate) text: Option<String>,
    #[serde(default)]
    pub(crate) thought: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GeminiErrorDetail {
    #[serde(default)]
    pub(crate) message: Option<String>,
    /// Google RPC status such as `RESOURCE_EXHAUSTED`.
    #[serde(default)]
    pub(crate) status: Option<String>,
}

impl GeminiErrorDetail {
    pub(crate) fn describe(&self) -> String {
        let message = self.message.as_deref().unwrap_or("unknown error");
        match self.status.as_deref().filter(|status| !status.is_empty()) {
            Some(status) => format!("{message} ({status})"),
            None => message.to_string(),
        }
    }
}
