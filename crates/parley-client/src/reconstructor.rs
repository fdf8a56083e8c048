//! Applies decoded frames to the assistant message of the current turn.

use parley_contract::{Message, Part, ToolInvocationState};
use parley_protocol_data_stream::{FinishReason, Frame};
use serde_json::{json, Value};

/// How a turn ended.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    Done(FinishReason),
    Error(String),
}

/// Per-turn bookkeeping that edits an assistant message owned elsewhere.
///
/// Tool invocation parts are keyed by `toolCallId`: once created they are only
/// ever mutated in place, and their state only moves forward. Frames after the
/// terminal frame are ignored.
#[derive(Debug, Default)]
pub struct TurnProgress {
    outcome: Option<TurnOutcome>,
    steps_observed: Vec<usize>,
    frames_applied: usize,
}

impl TurnProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn outcome(&self) -> Option<&TurnOutcome> {
        self.outcome.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    /// Steps reported by `step-finish`, in arrival order.
    pub fn steps_observed(&self) -> &[usize] {
        &self.steps_observed
    }

    pub fn frames_applied(&self) -> usize {
        self.frames_applied
    }

    /// Apply one frame to `message`. Returns whether it was accepted.
    pub fn apply(&mut self, message: &mut Message, frame: &Frame) -> bool {
        if self.outcome.is_some() {
            tracing::debug!(?frame, "frame after end of turn ignored");
            return false;
        }
        self.frames_applied += 1;

        match frame {
            Frame::Start { message_id } => {
                if message.parts.is_empty() {
                    message.id = message_id.clone();
                }
            }
            Frame::StepStart { .. } => {}
            Frame::TextDelta { delta } => append_text(message, delta),
            Frame::ToolCallPartial {
                tool_call_id,
                tool_name,
                args,
            } => {
                advance_tool(
                    message,
                    tool_call_id,
                    tool_name,
                    ToolInvocationState::PartialCall,
                    Some(args),
                    None,
                );
            }
            Frame::ToolCall {
                tool_call_id,
                tool_name,
                args,
            } => {
                advance_tool(
                    message,
                    tool_call_id,
                    tool_name,
                    ToolInvocationState::Call,
                    Some(args),
                    None,
                );
            }
            Frame::ToolResult {
                tool_call_id,
                tool_name,
                result,
                ..
            } => {
                advance_tool(
                    message,
                    tool_call_id,
                    tool_name,
                    ToolInvocationState::Result,
                    None,
                    Some(result),
                );
            }
            Frame::StepFinish { step, .. } => {
                if let Some(last) = self.steps_observed.last() {
                    if *step <= *last {
                        tracing::debug!(step, last, "step-finish out of sequence");
                    }
                }
                self.steps_observed.push(*step);
            }
            Frame::Error { error_text } => {
                fail_open_invocations(message);
                self.outcome = Some(TurnOutcome::Error(error_text.clone()));
            }
            Frame::Done { finish_reason, .. } => {
                self.outcome = Some(TurnOutcome::Done(*finish_reason));
            }
        }
        true
    }

    /// End the turn without a terminal frame.
    pub fn abort(&mut self, message: &mut Message, reason: impl Into<String>) {
        if self.outcome.is_some() {
            return;
        }
        fail_open_invocations(message);
        self.outcome = Some(TurnOutcome::Error(reason.into()));
    }
}

/// Builds one assistant message from the frames of a turn.
#[derive(Debug)]
pub struct MessageReconstructor {
    message: Message,
    progress: TurnProgress,
}

impl MessageReconstructor {
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message: Message::assistant(message_id),
            progress: TurnProgress::new(),
        }
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn into_message(self) -> Message {
        self.message
    }

    pub fn outcome(&self) -> Option<&TurnOutcome> {
        self.progress.outcome()
    }

    pub fn is_finished(&self) -> bool {
        self.progress.is_finished()
    }

    pub fn steps_observed(&self) -> &[usize] {
        self.progress.steps_observed()
    }

    pub fn frames_applied(&self) -> usize {
        self.progress.frames_applied()
    }

    /// Apply one frame. Returns whether it was accepted.
    pub fn apply(&mut self, frame: &Frame) -> bool {
        self.progress.apply(&mut self.message, frame)
    }

    /// End the turn without a terminal frame.
    pub fn abort(&mut self, reason: impl Into<String>) {
        self.progress.abort(&mut self.message, reason);
    }
}

fn append_text(message: &mut Message, delta: &str) {
    if delta.is_empty() {
        return;
    }
    if let Some(Part::Text { text }) = message.parts.last_mut() {
        text.push_str(delta);
    } else {
        message.parts.push(Part::text(delta));
    }
}

fn advance_tool(
    message: &mut Message,
    id: &str,
    name: &str,
    next: ToolInvocationState,
    new_args: Option<&Value>,
    new_result: Option<&Value>,
) {
    let existing = message
        .parts
        .iter_mut()
        .find(|part| part.tool_call_id() == Some(id));

    let Some(Part::ToolInvocation {
        state,
        args,
        result,
        ..
    }) = existing
    else {
        if next != ToolInvocationState::PartialCall {
            tracing::debug!(tool_call_id = %id, state = ?next, "tool part created implicitly");
        }
        message.parts.push(Part::ToolInvocation {
            tool_call_id: id.to_string(),
            tool_name: name.to_string(),
            state: next,
            args: new_args.cloned().unwrap_or_else(|| json!({})),
            result: new_result.cloned(),
        });
        return;
    };

    if !state.can_advance_to(next) {
        tracing::debug!(tool_call_id = %id, from = ?state, to = ?next, "tool state regression ignored");
        return;
    }
    *state = next;
    if let Some(new_args) = new_args {
        *args = new_args.clone();
    }
    if let Some(new_result) = new_result {
        *result = Some(new_result.clone());
    }
}

fn fail_open_invocations(message: &mut Message) {
    for part in &mut message.parts {
        if let Part::ToolInvocation { state, .. } = part {
            if !state.is_terminal() {
                *state = ToolInvocationState::Error;
            }
        }
    }
}
