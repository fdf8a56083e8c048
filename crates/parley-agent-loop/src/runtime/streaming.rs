//! Collects one model response stream into text, tool calls and usage while
//! producing incremental outputs for the event stream.

use crate::contracts::ToolCall;
use genai::chat::{ChatStreamEvent, Usage};
use serde_json::Value;
use std::collections::hash_map::Entry;
use std::collections::HashMap;

#[derive(Debug, Clone)]
struct PartialToolCall {
    id: String,
    name: String,
    arguments: String,
    /// Argument text already reported through outputs.
    emitted: String,
}

/// Incremental output of [`StreamCollector::process`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutput {
    TextDelta(String),
    ToolCallStart { id: String, name: String },
    ToolCallDelta { id: String, args_delta: String },
    /// Accumulated text no longer extends what was reported; replace it.
    ToolCallArgsReset { id: String, args_text: String },
}

/// Final result of one model response.
#[derive(Debug, Clone, Default)]
pub struct StreamResult {
    pub text: String,
    /// Tool calls in first-seen order.
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
}

impl StreamResult {
    pub fn needs_tools(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct StreamCollector {
    text: String,
    tool_calls: HashMap<String, PartialToolCall>,
    tool_call_order: Vec<String>,
    usage: Option<Usage>,
}

/// genai wraps argument text in `Value::String`; other shapes are already parsed.
fn raw_arguments(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

impl StreamCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn entry(&mut self, call_id: &str) -> &mut PartialToolCall {
        match self.tool_calls.entry(call_id.to_string()) {
            Entry::Occupied(e) => e.into_mut(),
            Entry::Vacant(e) => {
                self.tool_call_order.push(call_id.to_string());
                e.insert(PartialToolCall {
                    id: call_id.to_string(),
                    name: String::new(),
                    arguments: String::new(),
                    emitted: String::new(),
                })
            }
        }
    }

    /// Fold one provider event into the collector.
    pub fn process(&mut self, event: ChatStreamEvent) -> Vec<StreamOutput> {
        match event {
            ChatStreamEvent::Chunk(chunk) => {
                if chunk.content.is_empty() {
                    return Vec::new();
                }
                self.text.push_str(&chunk.content);
                vec![StreamOutput::TextDelta(chunk.content)]
            }
            ChatStreamEvent::ToolCallChunk(tool_chunk) => {
                let call = tool_chunk.tool_call;
                let partial = self.entry(&call.call_id);
                let mut outputs = Vec::new();

                if partial.name.is_empty() && !call.fn_name.is_empty() {
                    partial.name = call.fn_name.clone();
                    outputs.push(StreamOutput::ToolCallStart {
                        id: partial.id.clone(),
                        name: partial.name.clone(),
                    });
                }

                // Chunks carry the accumulated argument text, not a delta.
                let accumulated = raw_arguments(&call.fn_arguments);
                if !accumulated.is_empty() {
                    partial.arguments = accumulated;
                }
                // Text that arrived before the name is reported with the start.
                if !partial.name.is_empty() && partial.arguments != partial.emitted {
                    let output = match partial.arguments.strip_prefix(partial.emitted.as_str()) {
                        Some(rest) => StreamOutput::ToolCallDelta {
                            id: partial.id.clone(),
                            args_delta: rest.to_string(),
                        },
                        None => StreamOutput::ToolCallArgsReset {
                            id: partial.id.clone(),
                            args_text: partial.arguments.clone(),
                        },
                    };
                    partial.emitted = partial.arguments.clone();
                    outputs.push(output);
                }
                outputs
            }
            ChatStreamEvent::End(end) => {
                // Captured calls are authoritative over streamed fragments.
                if let Some(captured) = end.captured_tool_calls() {
                    for tc in captured {
                        let end_args = raw_arguments(&tc.fn_arguments);
                        let partial = self.entry(&tc.call_id);
                        if partial.name.is_empty() {
                            partial.name = tc.fn_name.clone();
                        }
                        if !end_args.is_empty() {
                            partial.arguments = end_args;
                        }
                    }
                }
                self.usage = end.captured_usage;
                Vec::new()
            }
            _ => Vec::new(),
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn finish(self) -> StreamResult {
        let mut remaining = self.tool_calls;
        let mut tool_calls = Vec::with_capacity(self.tool_call_order.len());

        for call_id in self.tool_call_order {
            let Some(p) = remaining.remove(&call_id) else {
                continue;
            };
            if p.name.is_empty() {
                tracing::warn!(call_id = %p.id, "dropping tool call without a name");
                continue;
            }
            let arguments = if p.arguments.trim().is_empty() {
                Value::Object(Default::default())
            } else {
                // Unparseable text is kept as a string so validation reports it.
                serde_json::from_str(&p.arguments).unwrap_or(Value::String(p.arguments))
            };
            tool_calls.push(ToolCall::new(p.id, p.name, arguments));
        }

        StreamResult {
            text: self.text,
            tool_calls,
            usage: self.usage,
        }
    }
}
