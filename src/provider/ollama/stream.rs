use crate::error::LLMError;
use crate::http::HttpBodyStream;
use crate::provider::DeltaStream;
use crate::stream::{FrameOutcome, NdjsonDecoder, deltas_from_frames, parse_frame};

use super::types::OllamaFrame;

const PROVIDER: &str = "ollama";

pub(crate) fn create_stream(body: HttpBodyStream) -> DeltaStream {
    deltas_from_frames(NdjsonDecoder::new(body, PROVIDER), map_line)
}

fn map_line(line: String) -> Result<FrameOutcome, LLMError> {
    let Some(frame) = parse_frame::<OllamaFrame>(PROVIDER, &line) else {
        return Ok(FrameOutcome::skip());
    };
    if let Some(error) = frame.error {
        return Err(LLMError::provider(PROVIDER, error));
    }
    let (reasoning, content) = frame.text();
    Ok(FrameOutcome::from_text(reasoning, content).finish(frame.done))
}

#[cfg(test)]
mod tests {
    use futures_util::{StreamExt, stream};

    use super::*;
    use crate::provider::StreamDelta;

    #[tokio::test]
    async fn chat_lines_until_done() {
        let chunks = vec![
            Ok(b"{\"message\":{\"role\":\"assistant\",\"content\":\"Hel\"},\"done\":false}\n{\"message\":{\"role\":\"assistant\",\"con".to_vec()),
            Ok(b"tent\":\"lo\"},\"done\":false}\n{\"message\":{\"role\":\"assistant\",\"content\":\"\"},\"done\":true}\n".to_vec()),
            Ok(b"{\"message\":{\"content\":\"after done\"},\"done\":false}\n".to_vec()),
        ];
        let body: HttpBodyStream = Box::pin(stream::iter(chunks));
        let deltas: Vec<StreamDelta> = create_stream(body)
            .map(|delta| delta.expect("delta"))
            .collect()
            .await;
        assert_eq!(
            deltas,
            vec![
                StreamDelta::Content("Hel".to_string()),
                StreamDelta::Content("lo".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn generate_lines_with_thinking() {
        let chunks = vec![Ok(concat!(
            "{\"thinking\":\"count\",\"response\":\"\",\"done\":false}\n",
            "{\"response\":\"3\",\"done\":true}\n"
        )
        .as_bytes()
        .to_vec())];
        let body: HttpBodyStream = Box::pin(stream::iter(chunks));
        let deltas: Vec<StreamDelta> = create_stream(body)
            .map(|delta| delta.expect("delta"))
            .collect()
            .await;
        assert_eq!(
            deltas,
            vec![
                StreamDelta::Reasoning("count".to_string()),
                StreamDelta::Content("3".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn error_lines_fail_the_stream() {
        let chunks = vec![Ok(b"{\"error\":\"model not loaded\"}\n".to_vec())];
        let body: HttpBodyStream = Box::pin(stream::iter(chunks));
        let item = create_stream(body).next().await.expect("item");
        assert!(item.is_err());
    }
}
