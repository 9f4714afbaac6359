use crate::error::LLMError;
use crate::http::HttpBodyStream;
use crate::provider::DeltaStream;
use crate::stream::{FrameOutcome, SseDecoder, SseEvent, deltas_from_frames, parse_frame};

use super::response::frame_outcome;
use super::types::GeminiGenerateContentResponse;

const PROVIDER: &str = "gemini";

/// `alt=sse` frames; the stream ends when the server closes the connection.
pub(crate) fn create_stream(body: HttpBodyStream) -> DeltaStream {
    deltas_from_frames(SseDecoder::new(body, PROVIDER), map_event)
}

fn map_event(event: SseEvent) -> Result<FrameOutcome, LLMError> {
    let data = match event {
        SseEvent::Done => return Ok(FrameOutcome::done()),
        SseEvent::Data { data, .. } => data,
    };
    let Some(mut response) = parse_frame::<GeminiGenerateContentResponse>(PROVIDER, &data) else {
        return Ok(FrameOutcome::skip());
    };
    if let Some(error) = response.error.take() {
        return Err(LLMError::provider(PROVIDER, error.describe()));
    }
    Ok(frame_outcome(response))
}

#[cfg(test)]
mod tests {
    use futures_util::{StreamExt, stream};

    use super::*;
    use crate::provider::StreamDelta;

    #[tokio::test]
    async fn frames_are_concatenated_until_close() {
        let chunks = vec![
            Ok(b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"plan\",\"thought\":true}]}}]}\r\n\r\n".to_vec()),
            Ok(b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"Hello\"}]}}]}\r\n\r\n".to_vec()),
            Ok(b"data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\", world\"}]},\"finishReason\":\"STOP\"}]}\r\n\r\n".to_vec()),
        ];
        let body: HttpBodyStream = Box::pin(stream::iter(chunks));
        let deltas: Vec<StreamDelta> = create_stream(body)
            .map(|delta| delta.expect("delta"))
            .collect()
            .await;
        assert_eq!(
            deltas,
            vec![
                StreamDelta::Reasoning("plan".to_string()),
                StreamDelta::Content("Hello".to_string()),
                StreamDelta::Content(", world".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn error_frames_fail_the_stream() {
        let chunks = vec![Ok(
            b"data: {\"error\":{\"code\":503,\"message\":\"overloaded\",\"status\":\"UNAVAILABLE\"}}\n\n".to_vec(),
        )];
        let body: HttpBodyStream = Box::pin(stream::iter(chunks));
        let err = create_stream(body)
            .next()
            .await
            .expect("item")
            .expect_err("error frame");
        assert!(err.to_string().contains("overloaded (UNAVAILABLE)"));
    }
}
