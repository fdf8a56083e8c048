use crate::sse::{SseEvent, SseParser};
use crate::Frame;
use async_stream::stream;
use futures::{Stream, StreamExt};
use thiserror::Error;

/// Data sentinel some servers send after the last frame.
const DONE_SENTINEL: &str = "[DONE]";

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("stream is not valid UTF-8")]
    InvalidUtf8,

    #[error("invalid frame `{data}`: {source}")]
    InvalidFrame {
        data: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("transport error: {0}")]
    Transport(String),
}

/// Turns raw `text/event-stream` bytes into frames.
///
/// Chunks may split lines, events and UTF-8 sequences anywhere.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    parser: SseParser,
    utf8_tail: Vec<u8>,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one chunk of bytes.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Result<Frame, DecodeError>> {
        let mut bytes = std::mem::take(&mut self.utf8_tail);
        bytes.extend_from_slice(chunk);

        let mut out = Vec::new();
        let text = match std::str::from_utf8(&bytes) {
            Ok(text) => text,
            Err(err) => {
                let valid = err.valid_up_to();
                if err.error_len().is_some() {
                    // Invalid sequence: keep what decoded, skip the rest of the chunk.
                    out.push(Err(DecodeError::InvalidUtf8));
                } else {
                    self.utf8_tail = bytes[valid..].to_vec();
                }
                // `valid_up_to` always falls on a char boundary.
                std::str::from_utf8(&bytes[..valid]).unwrap_or_default()
            }
        };

        let events = self.parser.feed(text);
        let mut frames: Vec<_> = events.into_iter().filter_map(decode_event).collect();
        frames.append(&mut out);
        frames
    }

    /// Flush the trailing event at end of stream.
    pub fn finish(&mut self) -> Vec<Result<Frame, DecodeError>> {
        let mut out = Vec::new();
        if !self.utf8_tail.is_empty() {
            self.utf8_tail.clear();
            out.push(Err(DecodeError::InvalidUtf8));
        }
        out.extend(self.parser.flush().and_then(decode_event));
        out
    }
}

fn decode_event(event: SseEvent) -> Option<Result<Frame, DecodeError>> {
    let data = event.data.trim();
    if data.is_empty() || data == DONE_SENTINEL {
        return None;
    }
    Some(
        serde_json::from_str(data).map_err(|source| DecodeError::InvalidFrame {
            data: data.to_string(),
            source,
        }),
    )
}

/// Adapt a byte stream (for example `reqwest::Response::bytes_stream`) into
/// a frame stream. A transport error is yielded once and ends the stream.
pub fn decode_frames<S, B, E>(bytes: S) -> impl Stream<Item = Result<Frame, DecodeError>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: std::fmt::Display,
{
    stream! {
        let mut decoder = FrameDecoder::new();
        futures::pin_mut!(bytes);
        while let Some(chunk) = bytes.next().await {
            match chunk {
                Ok(chunk) => {
                    for frame in decoder.push(chunk.as_ref()) {
                        yield frame;
                    }
                }
                Err(e) => {
                    yield Err(DecodeError::Transport(e.to_string()));
                    return;
                }
            }
        }
        for frame in decoder.finish() {
            yield frame;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encode_sse;
    use crate::FinishReason;

    fn wire(frames: &[Frame]) -> Vec<u8> {
        frames
            .iter()
            .flat_map(|frame| encode_sse(frame).unwrap().to_vec())
            .collect()
    }

    #[test]
    fn decodes_frames_split_at_every_byte() {
        let frames = vec![
            Frame::start("m1"),
            Frame::text_delta("héllo ✓"),
            Frame::done(FinishReason::Stop),
        ];
        let bytes = wire(&frames);

        let mut decoder = FrameDecoder::new();
        let mut decoded = Vec::new();
        for byte in &bytes {
            for frame in decoder.push(std::slice::from_ref(byte)) {
                decoded.push(frame.unwrap());
            }
        }
        decoded.extend(decoder.finish().into_iter().map(Result::unwrap));
        assert_eq!(decoded, frames);
    }

    #[test]
    fn invalid_json_is_reported_and_decoding_continues() {
        let mut decoder = FrameDecoder::new();
        let out = decoder.push(b"data: {nope}\n\ndata: {\"type\":\"text-delta\",\"delta\":\"x\"}\n\n");
        assert_eq!(out.len(), 2);
        assert!(matches!(out[0], Err(DecodeError::InvalidFrame { .. })));
        assert_eq!(out[1].as_ref().unwrap(), &Frame::text_delta("x"));
    }

    #[test]
    fn done_sentinel_is_skipped() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: [DONE]\n\n").is_empty());
    }

    #[test]
    fn truncated_utf8_at_end_is_an_error() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(&[0xE2, 0x9C]).is_empty());
        let out = decoder.finish();
        assert!(matches!(out.as_slice(), [Err(DecodeError::InvalidUtf8)]));
    }

    #[tokio::test]
    async fn stream_adapter_ends_on_transport_error() {
        let chunks: Vec<Result<Vec<u8>, String>> = vec![
            Ok(wire(&[Frame::text_delta("a")])),
            Err("connection reset".to_string()),
            Ok(wire(&[Frame::text_delta("never")])),
        ];
        let frames: Vec<_> = decode_frames(futures::stream::iter(chunks)).collect().await;
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].as_ref().unwrap(), &Frame::text_delta("a"));
        assert!(matches!(frames[1], Err(DecodeError::Transport(_))));
    }
}
