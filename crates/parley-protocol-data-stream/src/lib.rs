//! Data stream protocol: the frame vocabulary a parley run is streamed in,
//! the encoder from [`AgentEvent`](parley_contract::AgentEvent)s to frames and
//! the decoder back from `text/event-stream` bytes.
#![allow(missing_docs)]

mod decoder;
mod encoder;
mod frame;
pub mod partial_json;
mod request;
mod sse;

/// Protocol identifier, reported by the server alongside the stream.
pub const PROTOCOL_NAME: &str = "parley-data-stream";

/// Content type of an encoded frame stream.
pub const CONTENT_TYPE: &str = "text/event-stream";

pub use decoder::{decode_frames, DecodeError, FrameDecoder};
pub use encoder::DataStreamEncoder;
pub use frame::{FinishReason, Frame, FrameToolCall};
pub use request::ChatRequest;
pub use sse::{encode_sse, SseEvent, SseParser};
