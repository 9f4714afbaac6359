use crate::error::LLMError;
use crate::http::HttpBodyStream;
use crate::provider::DeltaStream;
use crate::stream::{FrameOutcome, SseDecoder, SseEvent, deltas_from_frames, parse_frame};

use super::error::describe;
use super::types::AnthropicStreamEvent;

const PROVIDER: &str = "anthropic";

pub(crate) fn create_stream(body: HttpBodyStream) -> DeltaStream {
    deltas_from_frames(SseDecoder::new(body, PROVIDER), map_event)
}

fn map_event(event: SseEvent) -> Result<FrameOutcome, LLMError> {
    let data = match event {
        SseEvent::Done => return Ok(FrameOutcome::done()),
        SseEvent::Data { data, .. } => data,
    };
    let Some(event) = parse_frame::<AnthropicStreamEvent>(PROVIDER, &data) else {
        return Ok(FrameOutcome::skip());
    };
    match event.kind.as_str() {
        "content_block_delta" => {
            let Some(delta) = event.delta else {
                return Ok(FrameOutcome::skip());
            };
            Ok(match delta.kind.as_deref() {
                Some("text_delta") => FrameOutcome::from_text(None, delta.text.as_deref()),
                Some("thinking_delta") => FrameOutcome::from_text(delta.thinking.as_deref(), None),
                // signature_delta and input_json_delta carry no text
                _ => FrameOutcome::skip(),
            })
        }
        "message_stop" => Ok(FrameOutcome::done()),
        "error" => {
            let message = event
                .error
                .as_ref()
                .map(describe)
                .unwrap_or_else(|| "stream error".to_string());
            Err(LLMError::provider(PROVIDER, message))
        }
        // message_start, content_block_start/stop, message_delta, ping
        _ => Ok(FrameOutcome::skip()),
    }
}

#[cfg(test)]
mod tests {
    use futures_util::{StreamExt, stream};

    use super::*;
    use crate::provider::StreamDelta;

    fn body(raw: &'static str) -> HttpBodyStream {
        Box::pin(stream::iter(vec![Ok(raw.as_bytes().to_vec())]))
    }

    #[tokio::test]
    async fn text_and_thinking_deltas_until_message_stop() {
        let raw = concat!(
            "event: message_start\ndata: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\"}}\n\n",
            "event: content_block_start\ndata: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"thinking\",\"thinking\":\"\"}}\n\n",
            "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"thinking_delta\",\"thinking\":\"hmm\"}}\n\n",
            "event: ping\ndata: {\"type\":\"ping\"}\n\n",
            "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hi\"}}\n\n",
            "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"text_delta\",\"text\":\" there\"}}\n\n",
            "event: message_stop\ndata: {\"type\":\"message_stop\"}\n\n",
            "event: content_block_delta\ndata: {\"type\":\"content_block_delta\",\"index\":1,\"delta\":{\"type\":\"text_delta\",\"text\":\"late\"}}\n\n",
        );
        let deltas: Vec<StreamDelta> = create_stream(body(raw))
            .map(|delta| delta.expect("delta"))
            .collect()
            .await;
        assert_eq!(
            deltas,
            vec![
                StreamDelta::Reasoning("hmm".to_string()),
                StreamDelta::Content("Hi".to_string()),
                StreamDelta::Content(" there".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn error_events_fail_the_stream() {
        let raw = "event: error\ndata: {\"type\":\"error\",\"error\":{\"type\":\"overloaded_error\",\"message\":\"Overloaded\"}}\n\n";
        let err = create_stream(body(raw))
            .next()
            .await
            .expect("item")
            .expect_err("error event");
        assert!(err.to_string().contains("overloaded_error: Overloaded"));
    }
}
