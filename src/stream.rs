//! Frame decoders for streamed response bodies.
//!
//! [`SseDecoder`] splits server-sent events, [`NdjsonDecoder`] splits newline-delimited
//! JSON. [`deltas_from_frames`] turns either into a [`DeltaStream`] using a per-provider
//! frame mapper. Frames that cannot be decoded are skipped with a warning; a bad frame
//! never discards what was decoded before it.

use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use futures_util::{StreamExt, stream};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::LLMError;
use crate::http::HttpBodyStream;
use crate::provider::{DeltaStream, StreamDelta};

/// Standardized SSE event yielded by [`SseDecoder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SseEvent {
    /// Joined `data:` payload plus the optional `event:` name.
    Data { event: Option<String>, data: String },
    /// Terminal marker reported via `[DONE]`.
    Done,
}

fn drain_line(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    buffer.iter().position(|b| *b == b'\n').map(|pos| {
        let mut line: Vec<u8> = buffer.drain(..=pos).collect();
        if line.last() == Some(&b'\n') {
            line.pop();
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        line
    })
}

fn field_value(line: &[u8], prefix: &[u8]) -> Option<Vec<u8>> {
    line.strip_prefix(prefix).map(|rest| {
        let rest = rest.strip_prefix(b" ").unwrap_or(rest);
        rest.to_vec()
    })
}

/// Normalizes provider SSE feeds into [`SseEvent`] values.
pub struct SseDecoder {
    body: HttpBodyStream,
    buffer: Vec<u8>,
    event_name: Option<Vec<u8>>,
    data_lines: Vec<Vec<u8>>,
    pending: VecDeque<SseEvent>,
    provider: &'static str,
    stream_closed: bool,
    done_received: bool,
}

impl SseDecoder {
    pub fn new(body: HttpBodyStream, provider: &'static str) -> Self {
        Self {
            body,
            buffer: Vec::new(),
            event_name: None,
            data_lines: Vec::new(),
            pending: VecDeque::new(),
            provider,
            stream_closed: false,
            done_received: false,
        }
    }

    fn handle_line(&mut self, line: Vec<u8>) {
        if let Some(data) = field_value(&line, b"data:") {
            self.data_lines.push(data);
        } else if let Some(name) = field_value(&line, b"event:") {
            self.event_name = Some(name);
        }
    }

    fn flush_event(&mut self) {
        let event_name = self.event_name.take();
        if self.data_lines.is_empty() {
            return;
        }

        let mut joined = Vec::new();
        for (idx, mut segment) in self.data_lines.drain(..).enumerate() {
            if idx > 0 {
                joined.push(b'\n');
            }
            joined.append(&mut segment);
        }
        if joined.is_empty() {
            return;
        }

        let Ok(data) = String::from_utf8(joined) else {
            warn!(provider = self.provider, "skipping SSE frame with invalid UTF-8");
            return;
        };
        if data.trim() == "[DONE]" {
            if !self.done_received {
                self.done_received = true;
                self.pending.push_back(SseEvent::Done);
            }
            return;
        }
        let event = event_name.and_then(|name| String::from_utf8(name).ok());
        self.pending.push_back(SseEvent::Data { event, data });
    }
}

impl Stream for SseDecoder {
    type Item = Result<SseEvent, LLMError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(event) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(event)));
            }
            if this.done_received || this.stream_closed {
                return Poll::Ready(None);
            }

            match this.body.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    this.buffer.extend_from_slice(&bytes);
                    while let Some(line) = drain_line(&mut this.buffer) {
                        if line.is_empty() {
                            this.flush_event();
                        } else {
                            this.handle_line(line);
                        }
                    }
                }
                Poll::Ready(Some(Err(err))) => return Poll::Ready(Some(Err(err))),
                Poll::Ready(None) => {
                    this.stream_closed = true;
                    if !this.buffer.is_empty() {
                        let line = std::mem::take(&mut this.buffer);
                        this.handle_line(line);
                    }
                    this.flush_event();
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Splits a body into newline-delimited JSON lines.
///
/// Blank lines are dropped; lines with invalid UTF-8 are skipped with a warning.
pub struct NdjsonDecoder {
    body: HttpBodyStream,
    buffer: Vec<u8>,
    pending: VecDeque<String>,
    provider: &'static str,
    stream_closed: bool,
}

impl NdjsonDecoder {
    pub fn new(body: HttpBodyStream, provider: &'static str) -> Self {
        Self {
            body,
            buffer: Vec::new(),
            pending: VecDeque::new(),
            provider,
            stream_closed: false,
        }
    }

    fn push_line(&mut self, line: Vec<u8>) {
        match String::from_utf8(line) {
            Ok(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    self.pending.push_back(trimmed.to_string());
                }
            }
            Err(_) => warn!(provider = self.provider, "skipping NDJSON line with invalid UTF-8"),
        }
    }
}

impl Stream for NdjsonDecoder {
    type Item = Result<String, LLMError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(line) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(line)));
            }
            if this.stream_closed {
                return Poll::Ready(None);
            }

            match this.body.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    this.buffer.extend_from_slice(&bytes);
                    while let Some(line) = drain_line(&mut this.buffer) {
                        this.push_line(line);
                    }
                }
                Poll::Ready(Some(Err(err))) => return Poll::Ready(Some(Err(err))),
                Poll::Ready(None) => {
                    this.stream_closed = true;
                    if !this.buffer.is_empty() {
                        let line = std::mem::take(&mut this.buffer);
                        this.push_line(line);
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// What a provider made of one frame.
#[derive(Debug, Default)]
pub(crate) struct FrameOutcome {
    pub(crate) deltas: Vec<StreamDelta>,
    /// The provider's end-of-stream marker was seen.
    pub(crate) finished: bool,
}

impl FrameOutcome {
    pub(crate) fn skip() -> Self {
        Self::default()
    }

    pub(crate) fn done() -> Self {
        Self {
            deltas: Vec::new(),
            finished: true,
        }
    }

    pub(crate) fn deltas(deltas: Vec<StreamDelta>) -> Self {
        Self {
            deltas,
            finished: false,
        }
    }

    /// Builds an outcome from optional content and reasoning text, dropping empty pieces.
    pub(crate) fn from_text(reasoning: Option<&str>, content: Option<&str>) -> Self {
        let mut deltas = Vec::new();
        if let Some(text) = reasoning.filter(|text| !text.is_empty()) {
            deltas.push(StreamDelta::Reasoning(text.to_string()));
        }
        if let Some(text) = content.filter(|text| !text.is_empty()) {
            deltas.push(StreamDelta::Content(text.to_string()));
        }
        Self::deltas(deltas)
    }

    pub(crate) fn finish(mut self, finished: bool) -> Self {
        self.finished = finished;
        self
    }
}

struct FrameState<T, F> {
    frames: Pin<Box<dyn Stream<Item = Result<T, LLMError>> + Send>>,
    map: F,
    pending: VecDeque<StreamDelta>,
    finished: bool,
}

/// Adapts a frame stream into a [`DeltaStream`].
///
/// `map` returns `Err` only for a provider-reported failure inside the stream; undecodable
/// frames should be reported as [`FrameOutcome::skip`].
pub(crate) fn deltas_from_frames<S, T, F>(frames: S, map: F) -> DeltaStream
where
    S: Stream<Item = Result<T, LLMError>> + Send + 'static,
    T: Send + 'static,
    F: FnMut(T) -> Result<FrameOutcome, LLMError> + Send + 'static,
{
    let state = FrameState {
        frames: Box::pin(frames),
        map,
        pending: VecDeque::new(),
        finished: false,
    };
    Box::pin(stream::unfold(state, |mut state| async move {
        loop {
            if let Some(delta) = state.pending.pop_front() {
                return Some((Ok(delta), state));
            }
            if state.finished {
                return None;
            }
            match state.frames.next().await {
                None => return None,
                Some(Err(err)) => {
                    state.finished = true;
                    return Some((Err(err), state));
                }
                Some(Ok(frame)) => match (state.map)(frame) {
                    Ok(outcome) => {
                        state.pending.extend(outcome.deltas);
                        state.finished = outcome.finished;
                    }
                    Err(err) => {
                        state.finished = true;
                        return Some((Err(err), state));
                    }
                },
            }
        }
    }))
}

/// Parses one frame payload, logging and returning `None` when it is malformed.
pub(crate) fn parse_frame<T: DeserializeOwned>(provider: &'static str, data: &str) -> Option<T> {
    match serde_json::from_str(data) {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(provider, error = %err, "skipping malformed stream frame");
            None
        }
    }
}

/// Collects the entire stream body, used to build error messages for failed streams.
///
/// Invalid UTF-8 is replaced lossily so the upstream status survives.
pub(crate) async fn collect_stream_text(
    mut body: HttpBodyStream,
    provider: &'static str,
) -> String {
    let mut bytes = Vec::new();
    while let Some(chunk) = body.next().await {
        match chunk {
            Ok(chunk) => bytes.extend_from_slice(&chunk),
            Err(err) => {
                debug!(provider, error = %err, "error body truncated");
                break;
            }
        }
    }
    String::from_utf8_lossy(&bytes).into_owned()
}

#[cfg(test)]
mod tests {
    use futures_util::StreamExt;
    use futures_util::stream;

    use super::*;

    fn build_body(chunks: Vec<Result<Vec<u8>, LLMError>>) -> HttpBodyStream {
        Box::pin(stream::iter(chunks))
    }

    #[tokio::test]
    async fn decoder_emits_data_and_done_events() {
        let chunks = vec![
            Ok(b"data: {\"text\":\"hi\"}\n\n".to_vec()),
            Ok(b"data: [DONE]\n\n".to_vec()),
            Ok(b"data: {\"after\":\"done\"}\n\n".to_vec()),
        ];
        let mut decoder = SseDecoder::new(build_body(chunks), "test_provider");

        let first = decoder.next().await.expect("event").expect("ok");
        assert_eq!(
            first,
            SseEvent::Data {
                event: None,
                data: "{\"text\":\"hi\"}".to_string()
            }
        );
        let second = decoder.next().await.expect("event").expect("ok");
        assert_eq!(second, SseEvent::Done);
        assert!(decoder.next().await.is_none());
    }

    #[tokio::test]
    async fn decoder_combines_multiline_payloads_split_across_chunks() {
        let chunks = vec![
            Ok(b"event: message\ndata: line one\n".to_vec()),
            Ok(b"data: line ".to_vec()),
            Ok(b"two\r\n\r\n".to_vec()),
        ];
        let mut decoder = SseDecoder::new(build_body(chunks), "test_provider");
        let event = decoder.next().await.expect("event").expect("ok");
        assert_eq!(
            event,
            SseEvent::Data {
                event: Some("message".to_string()),
                data: "line one\nline two".to_string()
            }
        );
        assert!(decoder.next().await.is_none());
    }

    #[tokio::test]
    async fn decoder_skips_invalid_utf8_frames() {
        let chunks = vec![
            Ok(b"data: \xff\n\n".to_vec()),
            Ok(b"data: ok\n\n".to_vec()),
        ];
        let mut decoder = SseDecoder::new(build_body(chunks), "test_provider");
        let event = decoder.next().await.expect("event").expect("ok");
        assert_eq!(
            event,
            SseEvent::Data {
                event: None,
                data: "ok".to_string()
            }
        );
    }

    #[tokio::test]
    async fn decoder_flushes_trailing_frame_on_close() {
        let chunks = vec![Ok(b"data: tail".to_vec())];
        let events: Vec<_> = SseDecoder::new(build_body(chunks), "test_provider")
            .collect()
            .await;
        assert_eq!(events.len(), 1);
    }

    #[tokio::test]
    async fn ndjson_lines_survive_arbitrary_chunking() {
        let chunks = vec![
            Ok(b"{\"a\":1}\n{\"b\"".to_vec()),
            Ok(b":2}\n\n".to_vec()),
            Ok(b"{\"c\":3}".to_vec()),
        ];
        let lines: Vec<String> = NdjsonDecoder::new(build_body(chunks), "test_provider")
            .map(|line| line.expect("line"))
            .collect()
            .await;
        assert_eq!(lines, vec!["{\"a\":1}", "{\"b\":2}", "{\"c\":3}"]);
    }

    #[tokio::test]
    async fn deltas_keep_content_decoded_before_a_bad_frame() {
        let frames = stream::iter(vec![
            Ok::<_, LLMError>("good one".to_string()),
            Ok("bad".to_string()),
            Ok("good two".to_string()),
            Ok("stop".to_string()),
            Ok("never seen".to_string()),
        ]);
        let deltas: Vec<StreamDelta> = deltas_from_frames(frames, |frame: String| {
            Ok(match frame.as_str() {
                "bad" => FrameOutcome::skip(),
                "stop" => FrameOutcome::done(),
                text => FrameOutcome::from_text(None, Some(text)),
            })
        })
        .map(|delta| delta.expect("delta"))
        .collect()
        .await;

        assert_eq!(
            deltas,
            vec![
                StreamDelta::Content("good one".to_string()),
                StreamDelta::Content("good two".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn transport_errors_end_the_delta_stream() {
        let frames = stream::iter(vec![
            Ok("first".to_string()),
            Err(LLMError::StreamClosed {
                message: "reset".into(),
            }),
        ]);
        let mut deltas = deltas_from_frames(frames, |frame: String| {
            Ok(FrameOutcome::from_text(None, Some(&frame)))
        });
        assert!(deltas.next().await.expect("first").is_ok());
        assert!(deltas.next().await.expect("error").is_err());
        assert!(deltas.next().await.is_none());
    }
}
