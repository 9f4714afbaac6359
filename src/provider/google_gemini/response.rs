use crate::error::LLMError;
use crate::provider::ProviderReply;
use crate::stream::FrameOutcome;

use super::types::GeminiGenerateContentResponse;

pub(crate) fn map_response(body: &str) -> Result<ProviderReply, LLMError> {
    let parsed: GeminiGenerateContentResponse = serde_json::from_str(body).map_err(|err| {
        LLMError::provider("gemini", format!("failed to parse Gemini response: {err}"))
    })?;
    if parsed.candidates.is_empty() {
        return Err(LLMError::provider("gemini", "response contained no candidates"));
    }
    let mut reply = ProviderReply {
        status: 200,
        ..ProviderReply::default()
    };
    for (reasoning, content) in first_candidate_parts(parsed) {
        if let Some(text) = reasoning {
            reply.reasoning.push_str(&text);
        }
        if let Some(text) = content {
            reply.content.push_str(&text);
        }
    }
    Ok(reply)
}

/// Splits the first candidate's text parts into `(reasoning, content)` pairs.
pub(crate) fn first_candidate_parts(
    response: GeminiGenerateContentResponse,
) -> impl Iterator<Item = (Option<String>, Option<String>)> {
    response
        .candidates
        .into_iter()
        .next()
        .and_then(|candidate| candidate.content)
        .map(|content| content.parts)
        .unwrap_or_default()
        .into_iter()
        .filter_map(|part| {
            let text = part.text?;
            Some(if part.thought.unwrap_or(false) {
                (Some(text), None)
            } else {
                (None, Some(text))
            })
        })
}

pub(crate) fn frame_outcome(response: GeminiGenerateContentResponse) -> FrameOutcome {
    let mut outcome = FrameOutcome::skip();
    for (reasoning, content) in first_candidate_parts(response) {
        outcome
            .deltas
            .extend(FrameOutcome::from_text(reasoning.as_deref(), content.as_deref()).deltas);
    }
    outcome
}
