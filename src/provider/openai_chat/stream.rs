use crate::error::LLMError;
use crate::http::HttpBodyStream;
use crate::provider::DeltaStream;
use crate::stream::{FrameOutcome, SseDecoder, SseEvent, deltas_from_frames, parse_frame};

use super::types::OpenAiStreamChunk;

pub(crate) fn create_stream(body: HttpBodyStream, provider: &'static str) -> DeltaStream {
    deltas_from_frames(SseDecoder::new(body, provider), move |event| {
        map_event(provider, event)
    })
}

fn map_event(provider: &'static str, event: SseEvent) -> Result<FrameOutcome, LLMError> {
    let data = match event {
        SseEvent::Done => return Ok(FrameOutcome::done()),
        SseEvent::Data { data, .. } => data,
    };
    let Some(chunk) = parse_frame::<OpenAiStreamChunk>(provider, &data) else {
        return Ok(FrameOutcome::skip());
    };
    if let Some(error) = chunk.error {
        let message = error
            .get("message")
            .and_then(|value| value.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| error.to_string());
        return Err(LLMError::provider(provider, message));
    }

    let mut outcome = FrameOutcome::skip();
    for delta in chunk.choices.into_iter().filter_map(|choice| choice.delta) {
        let reasoning = delta.reasoning_content.or(delta.reasoning);
        let piece = FrameOutcome::from_text(reasoning.as_deref(), delta.content.as_deref());
        outcome.deltas.extend(piece.deltas);
    }
    Ok(outcome)
}
