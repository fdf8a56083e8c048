use crate::partial_json::parse_partial;
use crate::{FinishReason, Frame, FrameToolCall};
use parley_contract::{AgentEvent, Transcoder};
use serde_json::json;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CallPhase {
    Streaming,
    Ready,
    Done,
}

#[derive(Debug)]
struct CallTrack {
    name: String,
    phase: CallPhase,
    args_text: String,
}

/// Stateful encoder from agent events to data stream frames.
///
/// # Ordering rules
///
/// - per tool call: `tool-call-partial*` → `tool-call` → `tool-result`;
///   an event that would break this order is dropped and logged
/// - `tool-call-partial` carries the cumulative best-effort parse of the
///   argument text, never a fragment
/// - after `done` or `error` nothing more is emitted
#[derive(Debug, Default)]
pub struct DataStreamEncoder {
    calls: HashMap<String, CallTrack>,
    message_id: Option<String>,
    finished: bool,
}

impl DataStreamEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Assistant message id announced in `start`, once seen.
    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    fn out_of_order(id: &str, event: &AgentEvent, phase: Option<CallPhase>) -> Vec<Frame> {
        tracing::warn!(
            tool_call_id = %id,
            event = event.kind(),
            phase = ?phase,
            "dropping out-of-order tool event"
        );
        Vec::new()
    }

    /// Edit a streaming call's argument text and emit the cumulative parse.
    fn stream_args(
        &mut self,
        id: &str,
        ev: &AgentEvent,
        edit: impl FnOnce(&mut String),
    ) -> Vec<Frame> {
        let Some(track) = self.calls.get_mut(id) else {
            return Self::out_of_order(id, ev, None);
        };
        if track.phase != CallPhase::Streaming {
            return Self::out_of_order(id, ev, Some(track.phase));
        }
        edit(&mut track.args_text);
        match parse_partial(&track.args_text) {
            Some(args) => vec![Frame::tool_call_partial(id, track.name.clone(), args)],
            // Nothing new to show until more text arrives.
            None => Vec::new(),
        }
    }

    /// Convert one event to zero or more frames.
    pub fn on_agent_event(&mut self, ev: &AgentEvent) -> Vec<Frame> {
        if self.finished {
            return Vec::new();
        }

        match ev {
            AgentEvent::RunStart { message_id, .. } => {
                self.message_id = Some(message_id.clone());
                vec![Frame::start(message_id.clone())]
            }
            AgentEvent::StepStart { step, .. } => vec![Frame::StepStart { step: *step }],
            AgentEvent::TextDelta { delta } => {
                if delta.is_empty() {
                    return Vec::new();
                }
                vec![Frame::text_delta(delta.clone())]
            }

            AgentEvent::ToolCallStart { id, name } => {
                if let Some(track) = self.calls.get(id) {
                    return Self::out_of_order(id, ev, Some(track.phase));
                }
                self.calls.insert(
                    id.clone(),
                    CallTrack {
                        name: name.clone(),
                        phase: CallPhase::Streaming,
                        args_text: String::new(),
                    },
                );
                vec![Frame::tool_call_partial(id.clone(), name.clone(), json!({}))]
            }
            AgentEvent::ToolCallDelta { id, args_delta } => {
                self.stream_args(id, ev, |text| text.push_str(args_delta))
            }
            AgentEvent::ToolCallArgsReset { id, args_text } => self.stream_args(id, ev, |text| {
                text.clear();
                text.push_str(args_text);
            }),
            AgentEvent::ToolCallReady {
                id,
                name,
                arguments,
            } => {
                match self.calls.get_mut(id) {
                    Some(track) if track.phase == CallPhase::Streaming => {
                        track.phase = CallPhase::Ready;
                    }
                    Some(track) => return Self::out_of_order(id, ev, Some(track.phase)),
                    None => {
                        self.calls.insert(
                            id.clone(),
                            CallTrack {
                                name: name.clone(),
                                phase: CallPhase::Ready,
                                args_text: String::new(),
                            },
                        );
                    }
                }
                vec![Frame::tool_call(id.clone(), name.clone(), arguments.clone())]
            }
            AgentEvent::ToolCallDone { id, result } => {
                let Some(track) = self.calls.get_mut(id) else {
                    return Self::out_of_order(id, ev, None);
                };
                if track.phase != CallPhase::Ready {
                    return Self::out_of_order(id, ev, Some(track.phase));
                }
                track.phase = CallPhase::Done;
                vec![Frame::ToolResult {
                    tool_call_id: id.clone(),
                    tool_name: track.name.clone(),
                    result: result.payload(),
                    is_error: result.is_error(),
                }]
            }

            AgentEvent::StepFinish { step, tool_calls } => {
                let finish_reason = if tool_calls.is_empty() {
                    FinishReason::Stop
                } else {
                    FinishReason::ToolCalls
                };
                vec![Frame::StepFinish {
                    step: *step,
                    tool_calls: tool_calls.iter().map(FrameToolCall::from).collect(),
                    finish_reason,
                }]
            }

            AgentEvent::RunFinish {
                termination,
                result,
                ..
            } => {
                self.finished = true;
                let Some(finish_reason) = FinishReason::from_termination(termination) else {
                    tracing::debug!("run cancelled; no done frame");
                    return Vec::new();
                };
                let stats = result
                    .as_ref()
                    .and_then(|result| result.get("stats"))
                    .cloned()
                    .filter(|stats| !stats.is_null());
                vec![Frame::Done {
                    finish_reason,
                    stats,
                }]
            }
            AgentEvent::Error { message } => {
                self.finished = true;
                vec![Frame::error(message.clone())]
            }
        }
    }
}

impl Transcoder for DataStreamEncoder {
    type Input = AgentEvent;
    type Output = Frame;

    fn transcode(&mut self, item: &AgentEvent) -> Vec<Frame> {
        self.on_agent_event(item)
    }
}
