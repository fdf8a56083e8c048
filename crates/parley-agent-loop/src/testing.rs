//! Scripted model backend for tests of crates built on the step loop.
//!
//! Gated behind the `test-support` cargo feature.

use crate::runtime::loop_runner::{LlmEventStream, LlmExecutor};
use async_trait::async_trait;
use genai::chat::{
    ChatOptions, ChatRequest, ChatStreamEvent, MessageContent, StreamChunk, StreamEnd, ToolChunk,
};
use serde_json::Value;
use std::sync::Mutex;

/// One model response: streamed text, then tool calls.
#[derive(Debug, Clone, Default)]
pub struct ScriptedResponse {
    text_chunks: Vec<String>,
    tool_calls: Vec<(String, String, String)>,
    fail_on_start: Option<String>,
    fail_mid_stream: Option<String>,
}

impl ScriptedResponse {
    /// Text streamed as the given chunks.
    pub fn text<I, S>(chunks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            text_chunks: chunks.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// No text, only tool calls added with [`Self::with_tool_call`].
    pub fn tools() -> Self {
        Self::default()
    }

    /// Fail when the stream is opened.
    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            fail_on_start: Some(message.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing_mid_stream(mut self, message: impl Into<String>) -> Self {
        self.fail_mid_stream = Some(message.into());
        self
    }

    /// Add a tool call whose argument text streams in three pieces.
    #[must_use]
    pub fn with_tool_call(mut self, call_id: &str, name: &str, args: Value) -> Self {
        self.tool_calls
            .push((call_id.to_string(), name.to_string(), args.to_string()));
        self
    }

    fn into_events(self) -> Vec<genai::Result<ChatStreamEvent>> {
        let mut events = vec![Ok(ChatStreamEvent::Start)];
        for chunk in self.text_chunks {
            events.push(Ok(ChatStreamEvent::Chunk(StreamChunk { content: chunk })));
        }
        if let Some(message) = self.fail_mid_stream {
            events.push(Err(genai::Error::Internal(message)));
            return events;
        }

        let mut captured = Vec::new();
        for (call_id, name, args) in self.tool_calls {
            let chars: Vec<char> = args.chars().collect();
            let step = chars.len().div_ceil(3).max(1);
            let mut end = 0;
            while end < chars.len() {
                end = (end + step).min(chars.len());
                let accumulated: String = chars[..end].iter().collect();
                events.push(Ok(ChatStreamEvent::ToolCallChunk(ToolChunk {
                    tool_call: genai::chat::ToolCall {
                        call_id: call_id.clone(),
                        fn_name: name.clone(),
                        fn_arguments: Value::String(accumulated),
                        thought_signatures: None,
                    },
                })));
            }
            captured.push(genai::chat::ToolCall {
                call_id,
                fn_name: name,
                fn_arguments: Value::String(args),
                thought_signatures: None,
            });
        }

        let end = StreamEnd {
            captured_content: if captured.is_empty() {
                None
            } else {
                Some(MessageContent::from_tool_calls(captured))
            },
            ..Default::default()
        };
        events.push(Ok(ChatStreamEvent::End(end)));
        events
    }
}

/// Replays scripted responses in order; answers `"done"` once exhausted.
#[derive(Debug, Default)]
pub struct ScriptedLlmExecutor {
    responses: Mutex<Vec<ScriptedResponse>>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedLlmExecutor {
    pub fn new(responses: Vec<ScriptedResponse>) -> Self {
        Self {
            responses: Mutex::new(responses),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Number of model invocations so far.
    pub fn request_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or_default()
    }

    /// Requests received so far.
    pub fn requests(&self) -> Vec<ChatRequest> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl LlmExecutor for ScriptedLlmExecutor {
    async fn exec_chat_stream_events(
        &self,
        _model: &str,
        chat_req: ChatRequest,
        _options: Option<&ChatOptions>,
    ) -> genai::Result<LlmEventStream> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(chat_req);
        }
        let response = self
            .responses
            .lock()
            .ok()
            .and_then(|mut responses| (!responses.is_empty()).then(|| responses.remove(0)))
            .unwrap_or_else(|| ScriptedResponse::text(["done"]));

        if let Some(message) = response.fail_on_start.clone() {
            return Err(genai::Error::Internal(message));
        }
        Ok(Box::pin(futures::stream::iter(response.into_events())))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}
